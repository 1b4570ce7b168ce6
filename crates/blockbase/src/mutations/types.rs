//! The closed mutation union and the errors of the mutation pipeline.
//!
//! A mutation never carries derived or optimistic data: the optimistic diff
//! is computed from the mutation plus currently-loaded local state, never
//! transmitted. The union serializes with a `type` tag in the shape the host
//! transport expects, which is also the shape the size ceiling measures.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::global_config::GlobalConfigUpdate;
use crate::host::HostError;
use crate::models::ModelError;

/// Cell values for one record, keyed by field id. Used both when updating
/// existing records and when creating new ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCellValues {
    pub id: String,
    #[serde(default)]
    pub cell_values_by_field_id: IndexMap<String, Value>,
}

/// Schema for one field of a table being created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFieldSpec {
    pub id: String,
    pub name: String,
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

/// The closed set of changes a client may propose. Host-validated; every
/// variant is checked structurally against local state before it leaves the
/// client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Mutation {
    #[serde(rename = "setMultipleRecordsCellValues", rename_all = "camelCase")]
    SetMultipleRecordsCellValues {
        table_id: String,
        records: Vec<RecordCellValues>,
    },
    #[serde(rename = "deleteMultipleRecords", rename_all = "camelCase")]
    DeleteMultipleRecords {
        table_id: String,
        record_ids: Vec<String>,
    },
    #[serde(rename = "createMultipleRecords", rename_all = "camelCase")]
    CreateMultipleRecords {
        table_id: String,
        records: Vec<RecordCellValues>,
    },
    #[serde(rename = "setMultipleGlobalConfigPaths", rename_all = "camelCase")]
    SetMultipleGlobalConfigPaths { updates: Vec<GlobalConfigUpdate> },
    #[serde(rename = "createSingleField", rename_all = "camelCase")]
    CreateSingleField {
        table_id: String,
        id: String,
        name: String,
        field_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<Value>,
    },
    #[serde(rename = "createSingleTable", rename_all = "camelCase")]
    CreateSingleTable {
        id: String,
        name: String,
        fields: Vec<NewFieldSpec>,
    },
}

impl Mutation {
    /// The wire-level `type` tag, used verbatim in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::SetMultipleRecordsCellValues { .. } => "setMultipleRecordsCellValues",
            Mutation::DeleteMultipleRecords { .. } => "deleteMultipleRecords",
            Mutation::CreateMultipleRecords { .. } => "createMultipleRecords",
            Mutation::SetMultipleGlobalConfigPaths { .. } => "setMultipleGlobalConfigPaths",
            Mutation::CreateSingleField { .. } => "createSingleField",
            Mutation::CreateSingleTable { .. } => "createSingleTable",
        }
    }

    /// Number of batched items, for variants subject to the batch ceiling.
    pub fn batch_size(&self) -> Option<usize> {
        match self {
            Mutation::SetMultipleRecordsCellValues { records, .. } => Some(records.len()),
            Mutation::DeleteMultipleRecords { record_ids, .. } => Some(record_ids.len()),
            Mutation::CreateMultipleRecords { records, .. } => Some(records.len()),
            Mutation::SetMultipleGlobalConfigPaths { updates } => Some(updates.len()),
            Mutation::CreateSingleField { .. } | Mutation::CreateSingleTable { .. } => None,
        }
    }
}

/// Recoverable failures of the mutation pipeline. Every variant guarantees
/// local state was untouched when it was raised; desynchronization is not an
/// error but a [`super::MutationOutcome`] variant.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Can't set cell values: field '{field_id}' is computed and cannot be set")]
    ComputedField { field_id: String },
    #[error("Can't set cell values: invalid cell value for field '{field_id}': {reason}")]
    InvalidCellValue { field_id: String, reason: String },
    #[error("Can't create {kind} '{id}': id is already in use")]
    IdAlreadyExists { kind: &'static str, id: String },
    #[error("Can't create {kind} with an empty name")]
    EmptyName { kind: &'static str },
    #[error("Can't create table '{name}': at least one field is required")]
    EmptyFieldList { name: String },
    #[error("Invalid global config path '{path}': {reason}")]
    InvalidGlobalConfigPath { path: String, reason: String },
    #[error("Request for {mutation_type} exceeds maximum batch size limit of {limit} items")]
    BatchSizeLimitExceeded {
        mutation_type: &'static str,
        limit: usize,
    },
    #[error("Request for {mutation_type} exceeds maximum mutation size limit of {limit} bytes")]
    SizeLimitExceeded {
        mutation_type: &'static str,
        limit: usize,
    },
    #[error("Cannot apply {mutation_type} mutation: {reason}")]
    PermissionDenied {
        mutation_type: &'static str,
        reason: String,
    },
    #[error("failed to encode mutation: {0}")]
    Encode(String),
    #[error("host persistence failed for {mutation_type}: {source}")]
    Host {
        mutation_type: &'static str,
        #[source]
        source: HostError,
    },
}
