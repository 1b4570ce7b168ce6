//! The optimistic-write state machine.
//!
//! [`Mutations::apply_mutation`] drives one attempt through:
//! validation → limits → permission check → optimistic apply → host
//! persistence. Everything up to and including the optimistic apply runs to
//! completion synchronously, so a watcher firing in response to an optimistic
//! update observes a fully consistent model tree.
//!
//! The failure policy is two-tier, and is the central correctness property of
//! the design: as long as nothing was changed locally, failures are ordinary
//! [`MutationError`]s and the caller may retry or branch. Once an optimistic
//! update has been applied, a host persistence failure means the local world
//! view is wrong with no defined reconciliation; that is reported as
//! [`MutationOutcome::Desynced`], never as a recoverable error, and the
//! embedding runtime decides policy (crash, restart the session).

mod optimistic;
mod types;
mod validate;

pub use types::{Mutation, MutationError, NewFieldSpec, RecordCellValues};

use serde_json::json;
use std::rc::Rc;
use tracing::{debug, warn};

use blockbase_core::size::encoded_value_size;
use blockbase_core::tree::ModelChange;

use crate::global_config::GlobalConfig;
use crate::host::{
    ApplyMutationOptions, HostError, HostInterface, PartialGlobalConfigUpdate,
    PermissionCheckResult,
};
use crate::models::{Base, Session};

/// Host-side debouncing hint sent with every persistence request.
const MUTATION_HOLD_FOR_MS: u64 = 100;

/// Default ceiling on the URI-encoded JSON size of one mutation: 1.9 MiB.
pub const DEFAULT_MAX_MUTATION_SIZE_BYTES: usize = 19 * 1024 * 1024 / 10;

/// Default ceiling on batched items per mutation.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;

/// Host-tuning ceilings, configurable per SDK instance. The defaults match
/// the reference host but are not protocol invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationLimits {
    pub max_encoded_size_bytes: usize,
    pub max_batch_size: usize,
}

impl Default for MutationLimits {
    fn default() -> Self {
        MutationLimits {
            max_encoded_size_bytes: DEFAULT_MAX_MUTATION_SIZE_BYTES,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

/// Terminal state of a mutation attempt that reached the host.
#[derive(Debug)]
pub enum MutationOutcome {
    /// Host acknowledged the mutation. The optimistic state, if any was
    /// applied, is the final state; nothing further happens.
    Committed { did_apply_optimistic_updates: bool },
    /// Host persistence failed *after* optimistic local state was applied.
    /// Local and true state have diverged with no reconciliation strategy;
    /// resuming ordinary control flow against the divergent state is worse
    /// than failing loudly.
    Desynced { source: HostError },
}

impl MutationOutcome {
    pub fn is_desynced(&self) -> bool {
        matches!(self, MutationOutcome::Desynced { .. })
    }
}

/// Callback through which optimistic model diffs reach the base/session
/// apply+trigger path. Injected so the pipeline has no notion of batching or
/// of which models consume a batch.
pub type ApplyModelChanges = Box<dyn Fn(&[ModelChange])>;

pub struct Mutations {
    host: Rc<dyn HostInterface>,
    limits: MutationLimits,
    base: Rc<Base>,
    session: Rc<Session>,
    global_config: Rc<GlobalConfig>,
    apply_model_changes: ApplyModelChanges,
}

impl Mutations {
    pub(crate) fn new(
        host: Rc<dyn HostInterface>,
        limits: MutationLimits,
        base: Rc<Base>,
        session: Rc<Session>,
        global_config: Rc<GlobalConfig>,
        apply_model_changes: ApplyModelChanges,
    ) -> Rc<Self> {
        Rc::new(Mutations {
            host,
            limits,
            base,
            session,
            global_config,
            apply_model_changes,
        })
    }

    pub fn limits(&self) -> MutationLimits {
        self.limits
    }

    /// Runs one mutation attempt to its terminal state.
    ///
    /// `Err(..)` always means local state is untouched and the caller may
    /// retry or branch. `Ok(MutationOutcome::Desynced { .. })` means the host
    /// rejected the mutation after the optimistic apply; see the module docs.
    pub fn apply_mutation(&self, mutation: Mutation) -> Result<MutationOutcome, MutationError> {
        validate::assert_mutation_is_valid(&mutation, &self.base, self.host.as_ref())?;

        let encoded = serde_json::to_value(&mutation)
            .map_err(|e| MutationError::Encode(e.to_string()))?;
        if let Some(batch_size) = mutation.batch_size() {
            if batch_size > self.limits.max_batch_size {
                return Err(MutationError::BatchSizeLimitExceeded {
                    mutation_type: mutation.kind(),
                    limit: self.limits.max_batch_size,
                });
            }
        }
        if encoded_value_size(&encoded) > self.limits.max_encoded_size_bytes {
            return Err(MutationError::SizeLimitExceeded {
                mutation_type: mutation.kind(),
                limit: self.limits.max_encoded_size_bytes,
            });
        }

        let check = self
            .host
            .check_permissions_for_mutation(&encoded, &self.session.permission_snapshot());
        if !check.has_permission {
            return Err(MutationError::PermissionDenied {
                mutation_type: mutation.kind(),
                reason: check.reason_display_string.unwrap_or_else(|| {
                    "the current user does not have permission".to_string()
                }),
            });
        }

        let did_apply_optimistic_updates = self.apply_optimistic_updates(&mutation);
        debug!(
            mutation_type = mutation.kind(),
            did_apply_optimistic_updates, "sending mutation to host"
        );

        match self.host.apply_mutation(
            &mutation,
            &ApplyMutationOptions {
                hold_for_ms: Some(MUTATION_HOLD_FOR_MS),
            },
        ) {
            Ok(()) => Ok(MutationOutcome::Committed {
                did_apply_optimistic_updates,
            }),
            Err(source) if !did_apply_optimistic_updates => Err(MutationError::Host {
                mutation_type: mutation.kind(),
                source,
            }),
            Err(source) => {
                warn!(
                    mutation_type = mutation.kind(),
                    error = %source,
                    "host persistence failed after optimistic apply; local state has diverged"
                );
                Ok(MutationOutcome::Desynced { source })
            }
        }
    }

    /// Side-effect-free permission query for a complete mutation.
    pub fn check_permissions_for_mutation(&self, mutation: &Mutation) -> PermissionCheckResult {
        match serde_json::to_value(mutation) {
            Ok(encoded) => self
                .host
                .check_permissions_for_mutation(&encoded, &self.session.permission_snapshot()),
            Err(e) => PermissionCheckResult::denied(format!("mutation could not be encoded: {e}")),
        }
    }

    /// Speculative permission query for config-path writes; update
    /// descriptors may omit path and/or value.
    pub(crate) fn check_permissions_for_set_global_config_paths(
        &self,
        updates: &[PartialGlobalConfigUpdate],
    ) -> PermissionCheckResult {
        let partial_mutation = json!({
            "type": "setMultipleGlobalConfigPaths",
            "updates": updates,
        });
        self.host
            .check_permissions_for_mutation(&partial_mutation, &self.session.permission_snapshot())
    }

    /// Applies the mutation's expected effect to local state. Returns whether
    /// anything was actually applied, which gates the failure policy above.
    fn apply_optimistic_updates(&self, mutation: &Mutation) -> bool {
        if let Mutation::SetMultipleGlobalConfigPaths { updates } = mutation {
            // The config store is always loaded; its apply path fires its own
            // notifications.
            self.global_config.set_multiple_kv_paths(updates);
            return true;
        }
        let changes = optimistic::optimistic_changes_for_mutation(mutation, &self.base);
        if changes.is_empty() {
            return false;
        }
        (self.apply_model_changes)(&changes);
        true
    }
}
