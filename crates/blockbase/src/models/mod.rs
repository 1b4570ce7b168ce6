//! Watchable wrappers over the in-memory model mirror.
//!
//! One JSON tree, created once from host-provided initial data, is shared by
//! every model in the SDK ([`Base`], [`Session`], and the per-entity wrappers
//! they hand out). The tree is mutated in place only by applying batches of
//! [`blockbase_core::tree::ModelChange`] diffs; "deletion" of an entity
//! removes its map entry and flags the cached wrapper as deleted, it never
//! recreates the tree.

mod base;
mod field;
mod record;
mod session;
mod table;

pub use base::{Base, BaseWatchKey};
pub use field::{Field, FieldWatchKey};
pub use record::Record;
pub use session::{Session, SessionWatchKey};
pub use table::{Table, TableWatchKey};

use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

/// The shared model mirror.
pub(crate) type SharedData = Rc<RefCell<Value>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Table '{0}' does not exist in this base")]
    TableNotFound(String),
    #[error("Field '{field_id}' does not exist in table '{table_id}'")]
    FieldNotFound { table_id: String, field_id: String },
    #[error("Record '{record_id}' does not exist in table '{table_id}'")]
    RecordNotFound {
        table_id: String,
        record_id: String,
    },
    #[error("Records are not loaded for table '{0}'")]
    RecordsNotLoaded(String),
    #[error("{kind} '{id}' has been deleted")]
    Deleted { kind: &'static str, id: String },
    #[error("base data is malformed at '{0}'")]
    MalformedData(String),
}

/// Immutable navigation by string segments.
pub(crate) fn get_in<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        node = node.as_object()?.get(*segment)?;
    }
    Some(node)
}
