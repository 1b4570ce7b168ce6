//! Field wrapper: schema metadata for one field of one table.

use serde_json::Value;
use std::cell::Cell;

use blockbase_core::tree::ChangedPaths;
use blockbase_core::watchable::{WatchCallback, Watchable};

use super::{get_in, ModelError, SharedData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWatchKey {
    Name,
    Type,
    Options,
    Description,
}

impl FieldWatchKey {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldWatchKey::Name => "name",
            FieldWatchKey::Type => "type",
            FieldWatchKey::Options => "options",
            FieldWatchKey::Description => "description",
        }
    }

    pub fn from_watch_key(key: &str) -> Option<Self> {
        match key {
            "name" => Some(FieldWatchKey::Name),
            "type" => Some(FieldWatchKey::Type),
            "options" => Some(FieldWatchKey::Options),
            "description" => Some(FieldWatchKey::Description),
            _ => None,
        }
    }
}

pub struct Field {
    id: String,
    table_id: String,
    data: SharedData,
    watchable: Watchable,
    is_deleted: Cell<bool>,
}

impl Field {
    pub(crate) fn new(table_id: String, id: String, data: SharedData) -> Self {
        Field {
            id,
            table_id,
            data,
            watchable: Watchable::new(|key| FieldWatchKey::from_watch_key(key).is_some()),
            is_deleted: Cell::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted.get()
    }

    pub fn name(&self) -> Result<String, ModelError> {
        self.string_property("name")
    }

    pub fn field_type(&self) -> Result<String, ModelError> {
        self.string_property("type")
    }

    pub fn description(&self) -> Result<Option<String>, ModelError> {
        let data = self.data.borrow();
        let field = self.field_data(&data)?;
        Ok(field
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    pub fn options(&self) -> Result<Option<Value>, ModelError> {
        let data = self.data.borrow();
        let field = self.field_data(&data)?;
        Ok(field.get("typeOptions").filter(|v| !v.is_null()).cloned())
    }

    /// Computed fields are derived by the host and never user-writable.
    pub fn is_computed(&self) -> Result<bool, ModelError> {
        let data = self.data.borrow();
        let field = self.field_data(&data)?;
        Ok(field
            .get("isComputed")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    pub fn watch<I, K>(&self, keys: I, callback: &WatchCallback) -> Vec<String>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.watchable.watch(keys, callback)
    }

    pub fn unwatch<I, K>(&self, keys: I, callback: &WatchCallback) -> Vec<String>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.watchable.unwatch(keys, callback)
    }

    /// Raw field data blob, as handed to the host's field-type provider.
    pub(crate) fn raw(&self) -> Result<Value, ModelError> {
        let data = self.data.borrow();
        self.field_data(&data).cloned()
    }

    pub(crate) fn mark_deleted(&self) {
        self.is_deleted.set(true);
    }

    /// Fires this field's own keys for its dirty subtree. Returns whether
    /// anything schema-affecting changed (every field property is schema).
    pub(crate) fn trigger_on_change_for_dirty_paths(&self, dirty: &ChangedPaths) -> bool {
        let mut changed = dirty.is_dirty;
        for (child, key) in [
            ("name", FieldWatchKey::Name),
            ("type", FieldWatchKey::Type),
            ("typeOptions", FieldWatchKey::Options),
            ("description", FieldWatchKey::Description),
        ] {
            if dirty.child(child).is_some_and(ChangedPaths::is_dirty_anywhere) {
                self.watchable.on_change(key.as_str(), &[]);
                changed = true;
            }
        }
        changed || dirty.is_dirty_anywhere()
    }

    fn string_property(&self, property: &str) -> Result<String, ModelError> {
        let data = self.data.borrow();
        let field = self.field_data(&data)?;
        field
            .get(property)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ModelError::MalformedData(format!(
                    "tablesById.{}.fieldsById.{}.{property}",
                    self.table_id, self.id
                ))
            })
    }

    fn field_data<'a>(&self, data: &'a Value) -> Result<&'a Value, ModelError> {
        if self.is_deleted.get() {
            return Err(ModelError::Deleted {
                kind: "Field",
                id: self.id.clone(),
            });
        }
        get_in(data, &["tablesById", &self.table_id, "fieldsById", &self.id]).ok_or_else(|| {
            ModelError::FieldNotFound {
                table_id: self.table_id.clone(),
                field_id: self.id.clone(),
            }
        })
    }
}
