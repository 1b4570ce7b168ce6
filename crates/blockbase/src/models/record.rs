//! Record read handle: cell values for one loaded record.
//!
//! Unlike tables and fields, records are cheap read handles rather than
//! cached watchable wrappers; record-level change notification happens at the
//! table's `records` key.

use serde_json::Value;

use super::{get_in, SharedData};

#[derive(Clone)]
pub struct Record {
    table_id: String,
    id: String,
    data: SharedData,
}

impl Record {
    pub(crate) fn new(table_id: String, id: String, data: SharedData) -> Self {
        Record { table_id, id, data }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The current cell value for `field_id`, or `None` when the cell is
    /// empty or the record no longer exists locally.
    pub fn cell_value(&self, field_id: &str) -> Option<Value> {
        let data = self.data.borrow();
        get_in(
            &data,
            &[
                "tablesById",
                &self.table_id,
                "recordsById",
                &self.id,
                "cellValuesByFieldId",
                field_id,
            ],
        )
        .filter(|v| !v.is_null())
        .cloned()
    }

    pub fn comment_count(&self) -> Option<u64> {
        let data = self.data.borrow();
        get_in(
            &data,
            &["tablesById", &self.table_id, "recordsById", &self.id, "commentCount"],
        )
        .and_then(Value::as_u64)
    }
}
