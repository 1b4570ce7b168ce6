//! Core primitives for blockbase.
//!
//! This crate is host-agnostic: it knows nothing about the injected host
//! interface or the SDK facade. It provides the pieces the model layer is
//! built from:
//! - [`watchable`]: string-keyed synchronous pub/sub with listener
//!   ref-count transition hooks,
//! - [`path`]: path types shared by the config store and the model mirror,
//! - [`tree`]: in-place diff application against a JSON tree with a
//!   parallel dirty-path tree,
//! - [`size`]: encoded-size measurement for mutation payload ceilings.

pub mod path;
pub mod size;
pub mod tree;
pub mod watchable;

pub use path::{GlobalConfigPath, PathError, WILDCARD_KEY};
pub use tree::{ChangedPaths, ModelChange};
pub use watchable::{WatchCallback, WatchTransition, Watchable};

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
