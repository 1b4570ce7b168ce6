//! The SDK facade.
//!
//! Owns one instance each of the model mirror, session, config store, and
//! mutation pipeline, constructed explicitly from an injected
//! [`HostInterface`], never a global singleton. Host-pushed batches enter through
//! [`Sdk::apply_host_model_changes`] and
//! [`Sdk::apply_host_global_config_updates`], which the embedder wires to the
//! host's push channels and invokes in delivery order.
//!
//! All watcher-visible mutation runs inside a replaceable batching wrapper so
//! dependent notifications fire together; the default wrapper is immediate
//! synchronous execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

use blockbase_core::tree::ModelChange;

use crate::global_config::{GlobalConfig, GlobalConfigUpdate};
use crate::host::{HostInterface, SdkInitData};
use crate::models::{Base, Session};
use crate::mutations::{
    ApplyModelChanges, Mutation, MutationError, MutationLimits, MutationOutcome, Mutations,
};

/// One host-pushed batch of model diffs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUpdateBatch {
    pub changes: Vec<ModelChange>,
}

/// One host-pushed batch of config updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfigUpdateBatch {
    pub updates: Vec<GlobalConfigUpdate>,
}

/// Batching wrapper contract: the function passed in must have completed all
/// of its mutations before the wrapper returns, and panics must propagate.
pub type BatchRunner = Box<dyn Fn(&mut dyn FnMut())>;

pub struct Sdk {
    host: Rc<dyn HostInterface>,
    base: Rc<Base>,
    session: Rc<Session>,
    global_config: Rc<GlobalConfig>,
    mutations: Rc<Mutations>,
    batch_runner: RefCell<BatchRunner>,
    block_installation_id: String,
    is_fullscreen: bool,
    is_first_run: bool,
    intent_data: Option<Value>,
    run_context: Value,
}

impl Sdk {
    pub fn new(host: Rc<dyn HostInterface>) -> Rc<Self> {
        Sdk::with_limits(host, MutationLimits::default())
    }

    pub fn with_limits(host: Rc<dyn HostInterface>, limits: MutationLimits) -> Rc<Self> {
        let SdkInitData {
            initial_kv_values_by_key,
            base_data,
            block_installation_id,
            is_fullscreen,
            is_first_run,
            intent_data,
            run_context,
        } = host.sdk_init_data();

        let base = Base::new(base_data);
        let session = Session::new(base.shared_data());
        let global_config = GlobalConfig::new(initial_kv_values_by_key, Rc::clone(&host));

        // Optimistic diffs go through the identical apply+trigger path as
        // host-pushed changes; both models consume the same dirty summary.
        let apply_model_changes: ApplyModelChanges = {
            let base = Rc::clone(&base);
            let session = Rc::clone(&session);
            Box::new(move |changes: &[ModelChange]| {
                let dirty = base.apply_changes_without_triggering_events(changes);
                base.trigger_on_change_for_changed_paths(&dirty);
                session.trigger_on_change_for_changed_paths(&dirty);
            })
        };
        let mutations = Mutations::new(
            Rc::clone(&host),
            limits,
            Rc::clone(&base),
            Rc::clone(&session),
            Rc::clone(&global_config),
            apply_model_changes,
        );
        global_config.attach_mutations(Rc::downgrade(&mutations));

        Rc::new(Sdk {
            host,
            base,
            session,
            global_config,
            mutations,
            batch_runner: RefCell::new(Box::new(|f| f())),
            block_installation_id,
            is_fullscreen,
            is_first_run,
            intent_data,
            run_context,
        })
    }

    pub fn base(&self) -> &Rc<Base> {
        &self.base
    }

    pub fn session(&self) -> &Rc<Session> {
        &self.session
    }

    pub fn global_config(&self) -> &Rc<GlobalConfig> {
        &self.global_config
    }

    pub fn mutations(&self) -> &Rc<Mutations> {
        &self.mutations
    }

    pub fn host(&self) -> &Rc<dyn HostInterface> {
        &self.host
    }

    pub fn block_installation_id(&self) -> &str {
        &self.block_installation_id
    }

    pub fn is_fullscreen(&self) -> bool {
        self.is_fullscreen
    }

    pub fn is_first_run(&self) -> bool {
        self.is_first_run
    }

    pub fn intent_data(&self) -> Option<&Value> {
        self.intent_data.as_ref()
    }

    pub fn run_context(&self) -> &Value {
        &self.run_context
    }

    /// Runs one mutation attempt inside the batching wrapper.
    pub fn apply_mutation(&self, mutation: Mutation) -> Result<MutationOutcome, MutationError> {
        let mut result = None;
        let mut mutation = Some(mutation);
        self.run_with_update_batching(&mut || {
            if let Some(mutation) = mutation.take() {
                result = Some(self.mutations.apply_mutation(mutation));
            }
        });
        result.expect("batch runner must invoke the wrapped function")
    }

    /// Entry point for host-pushed model diffs, invoked in delivery order.
    pub fn apply_host_model_changes(&self, batch: ModelUpdateBatch) {
        debug!(changes = batch.changes.len(), "applying host-pushed model changes");
        self.run_with_update_batching(&mut || {
            let dirty = self
                .base
                .apply_changes_without_triggering_events(&batch.changes);
            self.base.trigger_on_change_for_changed_paths(&dirty);
            self.session.trigger_on_change_for_changed_paths(&dirty);
        });
    }

    /// Entry point for host-pushed config updates, invoked in delivery order.
    pub fn apply_host_global_config_updates(&self, batch: GlobalConfigUpdateBatch) {
        debug!(updates = batch.updates.len(), "applying host-pushed config updates");
        self.run_with_update_batching(&mut || {
            self.global_config.set_multiple_kv_paths(&batch.updates);
        });
    }

    /// Replaces the batching wrapper. A UI integration may substitute a
    /// framework-level batched-update wrapper; must not be called from inside
    /// a running batch.
    pub fn set_update_batching_wrapper(&self, runner: BatchRunner) {
        *self.batch_runner.borrow_mut() = runner;
    }

    fn run_with_update_batching(&self, f: &mut dyn FnMut()) {
        let runner = self.batch_runner.borrow();
        (**runner)(f);
    }
}
