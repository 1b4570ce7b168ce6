//! Client-side extension SDK core.
//!
//! Runs entirely inside the embedder's sandboxed frame and talks to the host
//! application only through an injected [`host::HostInterface`] that this
//! crate consumes but never implements. Three pieces cooperate:
//!
//! - the watchable model mirror ([`models`]) and config store
//!   ([`global_config`]), mutated only by applying `{path, value}` diff
//!   batches and announcing changes through coarse watch keys,
//! - the optimistic mutation pipeline ([`mutations`]): validate, check
//!   permissions, apply the expected effect locally, then persist through the
//!   host, with a two-tier failure policy that keeps pre-apply failures
//!   recoverable and reports post-apply host failures as
//!   [`mutations::MutationOutcome::Desynced`],
//! - the [`sdk::Sdk`] facade, which owns one instance of each and wires
//!   host-pushed batches into them under a single update-batching boundary.

pub mod global_config;
pub mod host;
pub mod models;
pub mod mutations;
pub mod sdk;

pub use global_config::{GlobalConfig, GlobalConfigError, GlobalConfigUpdate};
pub use models::{Base, Field, ModelError, Record, Session, Table};
pub use mutations::{Mutation, MutationError, MutationLimits, MutationOutcome, Mutations};
pub use sdk::{GlobalConfigUpdateBatch, ModelUpdateBatch, Sdk};

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
