//! Optimistic diff computation, per mutation type.
//!
//! Diffs are computed against only the locally **loaded** subset of state: if
//! a table's records are not synced into the mirror, record mutations against
//! it produce zero diffs, because there is nothing local to update. Schema is
//! always loaded, so schema mutations always produce diffs.
//!
//! The diffs go through the same two-phase apply/notify path as host-pushed
//! changes, so optimistic and host-pushed updates are indistinguishable to
//! watchers.

use serde_json::{json, Map, Value};

use blockbase_core::tree::ModelChange;

use crate::models::Base;

use super::types::{Mutation, NewFieldSpec};

pub(super) fn optimistic_changes_for_mutation(mutation: &Mutation, base: &Base) -> Vec<ModelChange> {
    match mutation {
        Mutation::SetMultipleRecordsCellValues { table_id, records } => {
            if !records_loaded(base, table_id) {
                return Vec::new();
            }
            let mut changes = Vec::new();
            for record in records {
                for (field_id, value) in &record.cell_values_by_field_id {
                    changes.push(ModelChange::set(
                        record_path(table_id, &record.id, &["cellValuesByFieldId", field_id]),
                        value.clone(),
                    ));
                }
            }
            changes
        }
        Mutation::DeleteMultipleRecords {
            table_id,
            record_ids,
        } => {
            if !records_loaded(base, table_id) {
                return Vec::new();
            }
            record_ids
                .iter()
                .map(|record_id| ModelChange::delete(record_path(table_id, record_id, &[])))
                .collect()
        }
        Mutation::CreateMultipleRecords { table_id, records } => {
            if !records_loaded(base, table_id) {
                return Vec::new();
            }
            records
                .iter()
                .map(|record| {
                    let cell_values: Map<String, Value> = record
                        .cell_values_by_field_id
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    ModelChange::set(
                        record_path(table_id, &record.id, &[]),
                        json!({
                            "id": record.id,
                            "cellValuesByFieldId": cell_values,
                            "commentCount": 0,
                        }),
                    )
                })
                .collect()
        }
        // Config-path mutations bypass diff computation; the pipeline applies
        // them through the config store directly.
        Mutation::SetMultipleGlobalConfigPaths { .. } => Vec::new(),
        Mutation::CreateSingleField {
            table_id,
            id,
            name,
            field_type,
            options,
        } => {
            let mut field_order = base
                .value_at(&["tablesById", table_id, "fieldOrder"])
                .and_then(|v| v.as_array().cloned())
                .unwrap_or_default();
            field_order.push(json!(id));
            vec![
                ModelChange::set(
                    path(&["tablesById", table_id, "fieldsById", id]),
                    field_data(&NewFieldSpec {
                        id: id.clone(),
                        name: name.clone(),
                        field_type: field_type.clone(),
                        options: options.clone(),
                    }),
                ),
                ModelChange::set(
                    path(&["tablesById", table_id, "fieldOrder"]),
                    Value::Array(field_order),
                ),
            ]
        }
        Mutation::CreateSingleTable { id, name, fields } => {
            let mut table_order = base
                .value_at(&["tableOrder"])
                .and_then(|v| v.as_array().cloned())
                .unwrap_or_default();
            table_order.push(json!(id));
            let fields_by_id: Map<String, Value> = fields
                .iter()
                .map(|field| (field.id.clone(), field_data(field)))
                .collect();
            let field_order: Vec<Value> = fields.iter().map(|field| json!(field.id)).collect();
            vec![
                ModelChange::set(
                    path(&["tablesById", id]),
                    json!({
                        "id": id,
                        "name": name,
                        "primaryFieldId": fields.first().map(|f| f.id.clone()),
                        "fieldOrder": field_order,
                        "fieldsById": fields_by_id,
                        "viewOrder": [],
                        "viewsById": {},
                    }),
                ),
                ModelChange::set(path(&["tableOrder"]), Value::Array(table_order)),
            ]
        }
    }
}

fn records_loaded(base: &Base, table_id: &str) -> bool {
    base.table(table_id)
        .map(|table| table.are_records_loaded())
        .unwrap_or(false)
}

fn path(segments: &[&str]) -> Vec<String> {
    segments.iter().map(|s| s.to_string()).collect()
}

fn record_path(table_id: &str, record_id: &str, rest: &[&str]) -> Vec<String> {
    let mut full = vec![
        "tablesById".to_string(),
        table_id.to_string(),
        "recordsById".to_string(),
        record_id.to_string(),
    ];
    full.extend(rest.iter().map(|s| s.to_string()));
    full
}

fn field_data(spec: &NewFieldSpec) -> Value {
    json!({
        "id": spec.id,
        "name": spec.name,
        "type": spec.field_type,
        "typeOptions": spec.options,
        "isComputed": false,
    })
}
