//! Table wrapper: schema and (when loaded) record data for one table.

use indexmap::IndexMap;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use blockbase_core::tree::ChangedPaths;
use blockbase_core::watchable::{WatchCallback, Watchable};

use super::{get_in, Field, ModelError, Record, SharedData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableWatchKey {
    Name,
    Description,
    Fields,
    Records,
}

impl TableWatchKey {
    pub fn as_str(self) -> &'static str {
        match self {
            TableWatchKey::Name => "name",
            TableWatchKey::Description => "description",
            TableWatchKey::Fields => "fields",
            TableWatchKey::Records => "records",
        }
    }

    pub fn from_watch_key(key: &str) -> Option<Self> {
        match key {
            "name" => Some(TableWatchKey::Name),
            "description" => Some(TableWatchKey::Description),
            "fields" => Some(TableWatchKey::Fields),
            "records" => Some(TableWatchKey::Records),
            _ => None,
        }
    }
}

pub struct Table {
    id: String,
    data: SharedData,
    watchable: Watchable,
    is_deleted: Cell<bool>,
    fields_by_id: RefCell<IndexMap<String, Rc<Field>>>,
}

impl Table {
    pub(crate) fn new(id: String, data: SharedData) -> Rc<Self> {
        Rc::new(Table {
            id,
            data,
            watchable: Watchable::new(|key| TableWatchKey::from_watch_key(key).is_some()),
            is_deleted: Cell::new(false),
            fields_by_id: RefCell::new(IndexMap::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted.get()
    }

    pub fn name(&self) -> Result<String, ModelError> {
        let data = self.data.borrow();
        let table = self.table_data(&data)?;
        table
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ModelError::MalformedData(format!("tablesById.{}.name", self.id)))
    }

    pub fn description(&self) -> Result<Option<String>, ModelError> {
        let data = self.data.borrow();
        let table = self.table_data(&data)?;
        Ok(table
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Cached wrapper for one field; created lazily, pruned when the backing
    /// data disappears.
    pub fn field(&self, field_id: &str) -> Result<Rc<Field>, ModelError> {
        {
            let data = self.data.borrow();
            let table = self.table_data(&data)?;
            if get_in(table, &["fieldsById", field_id]).is_none() {
                return Err(ModelError::FieldNotFound {
                    table_id: self.id.clone(),
                    field_id: field_id.to_string(),
                });
            }
        }
        let mut fields = self.fields_by_id.borrow_mut();
        if let Some(existing) = fields.get(field_id) {
            return Ok(Rc::clone(existing));
        }
        let field = Rc::new(Field::new(
            self.id.clone(),
            field_id.to_string(),
            Rc::clone(&self.data),
        ));
        fields.insert(field_id.to_string(), Rc::clone(&field));
        Ok(field)
    }

    /// Fields in `fieldOrder` order.
    pub fn fields(&self) -> Result<Vec<Rc<Field>>, ModelError> {
        let order: Vec<String> = {
            let data = self.data.borrow();
            let table = self.table_data(&data)?;
            table
                .get("fieldOrder")
                .and_then(Value::as_array)
                .map(|ids| {
                    ids.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };
        order.iter().map(|id| self.field(id)).collect()
    }

    /// Whether record data for this table is currently synced into the local
    /// mirror. When it is not, record reads fail and record mutations produce
    /// no optimistic diffs.
    pub fn are_records_loaded(&self) -> bool {
        let data = self.data.borrow();
        get_in(&data, &["tablesById", &self.id, "recordsById"]).is_some()
    }

    pub fn record(&self, record_id: &str) -> Result<Record, ModelError> {
        let data = self.data.borrow();
        let table = self.table_data(&data)?;
        let records = table
            .get("recordsById")
            .ok_or_else(|| ModelError::RecordsNotLoaded(self.id.clone()))?;
        if get_in(records, &[record_id]).is_none() {
            return Err(ModelError::RecordNotFound {
                table_id: self.id.clone(),
                record_id: record_id.to_string(),
            });
        }
        Ok(Record::new(
            self.id.clone(),
            record_id.to_string(),
            Rc::clone(&self.data),
        ))
    }

    pub fn records(&self) -> Result<Vec<Record>, ModelError> {
        let ids: Vec<String> = {
            let data = self.data.borrow();
            let table = self.table_data(&data)?;
            let records = table
                .get("recordsById")
                .and_then(Value::as_object)
                .ok_or_else(|| ModelError::RecordsNotLoaded(self.id.clone()))?;
            records.keys().cloned().collect()
        };
        Ok(ids
            .into_iter()
            .map(|id| Record::new(self.id.clone(), id, Rc::clone(&self.data)))
            .collect())
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

    pub(crate) fn mark_deleted(&self) {
        self.is_deleted.set(true);
        for (_, field) in self.fields_by_id.borrow_mut().drain(..) {
            field.mark_deleted();
        }
    }

    /// Fires this table's keys for its dirty subtree, delegating per-field
    /// subtrees to cached field wrappers. Returns whether the table's schema
    /// changed, so the owning base can coalesce into its coarse `schema` key.
    pub(crate) fn trigger_on_change_for_dirty_paths(&self, dirty: &ChangedPaths) -> bool {
        let mut schema_changed = dirty.is_dirty;
        let mut fields_fired = false;

        if dirty.child("name").is_some_and(ChangedPaths::is_dirty_anywhere) {
            self.watchable.on_change(TableWatchKey::Name.as_str(), &[]);
            schema_changed = true;
        }
        if dirty
            .child("description")
            .is_some_and(ChangedPaths::is_dirty_anywhere)
        {
            self.watchable
                .on_change(TableWatchKey::Description.as_str(), &[]);
            schema_changed = true;
        }
        if dirty
            .child("fieldOrder")
            .is_some_and(ChangedPaths::is_dirty_anywhere)
        {
            self.prune_stale_field_wrappers();
            self.watchable.on_change(TableWatchKey::Fields.as_str(), &[]);
            fields_fired = true;
            schema_changed = true;
        }
        if let Some(fields_dirty) = dirty.child("fieldsById") {
            for (field_id, field_subtree) in &fields_dirty.children {
                if !field_subtree.is_dirty_anywhere() {
                    continue;
                }
                schema_changed = true;
                let exists = {
                    let data = self.data.borrow();
                    get_in(&data, &["tablesById", &self.id, "fieldsById", field_id]).is_some()
                };
                if !exists {
                    if let Some(wrapper) = self.fields_by_id.borrow_mut().shift_remove(field_id) {
                        wrapper.mark_deleted();
                    }
                } else if let Some(wrapper) = {
                    let cached = self.fields_by_id.borrow().get(field_id).map(Rc::clone);
                    cached
                } {
                    wrapper.trigger_on_change_for_dirty_paths(field_subtree);
                }
                if !fields_fired {
                    self.watchable.on_change(TableWatchKey::Fields.as_str(), &[]);
                    fields_fired = true;
                }
            }
        }
        if dirty.child("viewOrder").is_some_and(ChangedPaths::is_dirty_anywhere)
            || dirty.child("viewsById").is_some_and(ChangedPaths::is_dirty_anywhere)
        {
            // View data is carried opaquely; a view change is still a schema
            // change for coalescing purposes.
            schema_changed = true;
        }
        if dirty
            .child("recordsById")
            .is_some_and(ChangedPaths::is_dirty_anywhere)
        {
            self.watchable.on_change(TableWatchKey::Records.as_str(), &[]);
        }

        schema_changed
    }

    /// Schema-coalescing decision for a table with no live wrapper: same rule
    /// as `trigger_on_change_for_dirty_paths`, without firing anything.
    pub(crate) fn dirty_paths_affect_schema(dirty: &ChangedPaths) -> bool {
        dirty.is_dirty
            || ["name", "description", "fieldOrder", "fieldsById", "viewOrder", "viewsById"]
                .iter()
                .any(|key| dirty.child(key).is_some_and(ChangedPaths::is_dirty_anywhere))
    }

    fn prune_stale_field_wrappers(&self) {
        let stale: Vec<String> = {
            let data = self.data.borrow();
            self.fields_by_id
                .borrow()
                .keys()
                .filter(|field_id| {
                    get_in(&data, &["tablesById", &self.id, "fieldsById", field_id]).is_none()
                })
                .cloned()
                .collect()
        };
        for field_id in stale {
            if let Some(wrapper) = self.fields_by_id.borrow_mut().shift_remove(&field_id) {
                wrapper.mark_deleted();
            }
        }
    }

    fn table_data<'a>(&self, data: &'a Value) -> Result<&'a Value, ModelError> {
        if self.is_deleted.get() {
            return Err(ModelError::Deleted {
                kind: "Table",
                id: self.id.clone(),
            });
        }
        get_in(data, &["tablesById", &self.id])
            .ok_or_else(|| ModelError::TableNotFound(self.id.clone()))
    }
}
