//! The injected host-interface contract.
//!
//! The SDK never implements this surface, only consumes it. The host owns
//! transport, persistence, path validation for the config store, and
//! per-field-type cell-value validation; the SDK treats all of those as
//! opaque collaborators.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use blockbase_core::path::GlobalConfigPath;

use crate::global_config::GlobalConfigUpdate;
use crate::mutations::Mutation;

/// One-time synchronous snapshot handed to the SDK at startup.
#[derive(Debug, Clone)]
pub struct SdkInitData {
    /// Initial contents of the global config store, keyed by top-level key.
    pub initial_kv_values_by_key: Value,
    /// Initial model mirror: schema, collaborators, permission level, and any
    /// preloaded record data.
    pub base_data: Value,
    pub block_installation_id: String,
    pub is_fullscreen: bool,
    pub is_first_run: bool,
    pub intent_data: Option<Value>,
    pub run_context: Value,
}

/// Result of a host permission check. `reason_display_string` is
/// host-supplied, human-readable, and must be surfaced verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCheckResult {
    pub has_permission: bool,
    pub reason_display_string: Option<String>,
}

impl PermissionCheckResult {
    pub fn allowed() -> Self {
        PermissionCheckResult {
            has_permission: true,
            reason_display_string: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        PermissionCheckResult {
            has_permission: false,
            reason_display_string: Some(reason.into()),
        }
    }
}

/// Options accompanying a persistence request. `hold_for_ms` is a hint for
/// host-side debouncing, not a client-side timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyMutationOptions {
    pub hold_for_ms: Option<u64>,
}

/// Failure reported by the host's persistence boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("host rejected mutation: {0}")]
    Rejected(String),
    #[error("host transport failed: {0}")]
    Transport(String),
}

/// Host verdict on a single config path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathValidationResult {
    pub is_valid: bool,
    pub reason: Option<String>,
}

/// Host verdict on a proposed cell value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueValidationResult {
    pub is_valid: bool,
    pub reason: Option<String>,
}

/// Result of the host-owned config merge: the replacement store plus the
/// distinct top-level keys the updates touched.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedGlobalConfigUpdates {
    pub new_kv_store: Value,
    pub changed_top_level_keys: Vec<String>,
}

/// A config update with path and/or value omitted, for speculative
/// "can I write here at all" permission queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialGlobalConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<GlobalConfigPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Externally owned validation and merge logic for the config store.
pub trait GlobalConfigHelpers {
    /// Validates one path against the current store contents.
    fn validate_path(&self, path: &[String], kv_store: &Value) -> PathValidationResult;

    /// Applies `updates` to a copy of `kv_store` and reports which top-level
    /// keys were touched. Apply-only: callers validate beforehand.
    fn validate_and_apply_updates(
        &self,
        updates: &[GlobalConfigUpdate],
        kv_store: &Value,
    ) -> AppliedGlobalConfigUpdates;
}

/// Externally owned, per-field-type cell value validation.
pub trait FieldTypeProvider {
    fn validate_cell_value_for_update(
        &self,
        app_interface: &Value,
        new_cell_value: Option<&Value>,
        current_cell_value: Option<&Value>,
        field_data: &Value,
    ) -> ValueValidationResult;
}

/// The injected host environment.
///
/// `check_permissions_for_mutation` receives the mutation as serialized JSON
/// so the host can also be queried with partial mutations (speculative
/// checks). It must be synchronous and side-effect-free.
pub trait HostInterface {
    fn sdk_init_data(&self) -> SdkInitData;

    fn check_permissions_for_mutation(
        &self,
        mutation: &Value,
        base_permission_data: &Value,
    ) -> PermissionCheckResult;

    /// The only boundary at which a mutation leaves the client. Everything
    /// before this call has already run to completion synchronously.
    fn apply_mutation(
        &self,
        mutation: &Mutation,
        options: &ApplyMutationOptions,
    ) -> Result<(), HostError>;

    fn global_config_helpers(&self) -> &dyn GlobalConfigHelpers;

    fn field_type_provider(&self) -> &dyn FieldTypeProvider;
}
