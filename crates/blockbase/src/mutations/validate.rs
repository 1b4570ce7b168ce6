//! Structural validation of proposed mutations.
//!
//! Everything here is checked from locally-cached schema and metadata, before
//! any permission check or host activity: it is far cheaper than a round
//! trip, and the messages are meant to be immediately actionable during
//! development. Record-level checks apply only when record data is loaded
//! locally; there is nothing to check against otherwise.

use blockbase_core::path::{assert_path_is_structurally_valid, format_path};

use crate::host::HostInterface;
use crate::models::{Base, Table};

use super::types::{Mutation, MutationError, RecordCellValues};

pub(super) fn assert_mutation_is_valid(
    mutation: &Mutation,
    base: &Base,
    host: &dyn HostInterface,
) -> Result<(), MutationError> {
    match mutation {
        Mutation::SetMultipleRecordsCellValues { table_id, records } => {
            let table = base.table(table_id)?;
            for record in records {
                if table.are_records_loaded() {
                    table.record(&record.id)?;
                }
                assert_cell_values_are_valid(base, &table, record, host, true)?;
            }
            Ok(())
        }
        Mutation::DeleteMultipleRecords {
            table_id,
            record_ids,
        } => {
            let table = base.table(table_id)?;
            if table.are_records_loaded() {
                for record_id in record_ids {
                    table.record(record_id)?;
                }
            }
            Ok(())
        }
        Mutation::CreateMultipleRecords { table_id, records } => {
            let table = base.table(table_id)?;
            for record in records {
                if table.are_records_loaded() && table.record(&record.id).is_ok() {
                    return Err(MutationError::IdAlreadyExists {
                        kind: "record",
                        id: record.id.clone(),
                    });
                }
                assert_cell_values_are_valid(base, &table, record, host, false)?;
            }
            Ok(())
        }
        Mutation::SetMultipleGlobalConfigPaths { updates } => {
            for update in updates {
                assert_path_is_structurally_valid(&update.path).map_err(|e| {
                    MutationError::InvalidGlobalConfigPath {
                        path: format_path(&update.path),
                        reason: e.to_string(),
                    }
                })?;
            }
            Ok(())
        }
        Mutation::CreateSingleField {
            table_id, id, name, ..
        } => {
            let table = base.table(table_id)?;
            if name.is_empty() {
                return Err(MutationError::EmptyName { kind: "field" });
            }
            if table.field(id).is_ok() {
                return Err(MutationError::IdAlreadyExists {
                    kind: "field",
                    id: id.clone(),
                });
            }
            Ok(())
        }
        Mutation::CreateSingleTable { id, name, fields } => {
            if name.is_empty() {
                return Err(MutationError::EmptyName { kind: "table" });
            }
            if base.table(id).is_ok() {
                return Err(MutationError::IdAlreadyExists {
                    kind: "table",
                    id: id.clone(),
                });
            }
            if fields.is_empty() {
                return Err(MutationError::EmptyFieldList { name: name.clone() });
            }
            let mut seen = Vec::with_capacity(fields.len());
            for field in fields {
                if field.name.is_empty() {
                    return Err(MutationError::EmptyName { kind: "field" });
                }
                if seen.contains(&&field.id) {
                    return Err(MutationError::IdAlreadyExists {
                        kind: "field",
                        id: field.id.clone(),
                    });
                }
                seen.push(&field.id);
            }
            Ok(())
        }
    }
}

/// Per-field checks for one record's proposed cell values: the field must
/// exist and not be computed; when cell data is loaded, the proposed value
/// must pass the host's field-type validation against the current value.
fn assert_cell_values_are_valid(
    base: &Base,
    table: &Table,
    record: &RecordCellValues,
    host: &dyn HostInterface,
    record_exists_locally: bool,
) -> Result<(), MutationError> {
    let app_interface = base.app_interface();
    for (field_id, new_value) in &record.cell_values_by_field_id {
        let field = table.field(field_id)?;
        if field.is_computed()? {
            return Err(MutationError::ComputedField {
                field_id: field_id.clone(),
            });
        }
        if table.are_records_loaded() {
            let current = if record_exists_locally {
                table.record(&record.id)?.cell_value(field_id)
            } else {
                None
            };
            let verdict = host.field_type_provider().validate_cell_value_for_update(
                &app_interface,
                Some(new_value),
                current.as_ref(),
                &field.raw()?,
            );
            if !verdict.is_valid {
                return Err(MutationError::InvalidCellValue {
                    field_id: field_id.clone(),
                    reason: verdict
                        .reason
                        .unwrap_or_else(|| "rejected by field type validation".to_string()),
                });
            }
        }
    }
    Ok(())
}
