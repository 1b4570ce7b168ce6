//! Base wrapper: the root of the model mirror.
//!
//! `Base` owns the shared JSON tree and the two-phase change machinery:
//! [`Base::apply_changes_without_triggering_events`] mutates the tree and
//! returns a dirty-path summary without announcing anything, and
//! [`Base::trigger_on_change_for_changed_paths`] walks that summary and fires
//! coarse watch keys. The split lets several models (base, session) consume
//! the same batch before any watcher observes a half-updated world.

use indexmap::IndexMap;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

use blockbase_core::tree::{apply_model_changes, ChangedPaths, ModelChange};
use blockbase_core::watchable::{WatchCallback, Watchable};

use super::{get_in, ModelError, SharedData, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseWatchKey {
    Name,
    Tables,
    Schema,
    Collaborators,
}

impl BaseWatchKey {
    pub fn as_str(self) -> &'static str {
        match self {
            BaseWatchKey::Name => "name",
            BaseWatchKey::Tables => "tables",
            BaseWatchKey::Schema => "schema",
            BaseWatchKey::Collaborators => "collaborators",
        }
    }

    pub fn from_watch_key(key: &str) -> Option<Self> {
        match key {
            "name" => Some(BaseWatchKey::Name),
            "tables" => Some(BaseWatchKey::Tables),
            "schema" => Some(BaseWatchKey::Schema),
            "collaborators" => Some(BaseWatchKey::Collaborators),
            _ => None,
        }
    }
}

pub struct Base {
    data: SharedData,
    watchable: Watchable,
    tables_by_id: RefCell<IndexMap<String, Rc<Table>>>,
}

impl Base {
    /// Creates the base from the host's one-time initial snapshot. The tree
    /// lives for the life of the SDK instance and is never recreated.
    pub fn new(base_data: Value) -> Rc<Self> {
        Rc::new(Base {
            data: Rc::new(RefCell::new(base_data)),
            watchable: Watchable::new(|key| BaseWatchKey::from_watch_key(key).is_some()),
            tables_by_id: RefCell::new(IndexMap::new()),
        })
    }

    /// The shared mirror, for sibling models consuming the same batches.
    pub(crate) fn shared_data(&self) -> SharedData {
        Rc::clone(&self.data)
    }

    pub fn id(&self) -> Option<String> {
        let data = self.data.borrow();
        get_in(&data, &["id"])
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn name(&self) -> Result<String, ModelError> {
        let data = self.data.borrow();
        get_in(&data, &["name"])
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ModelError::MalformedData("name".to_string()))
    }

    /// Table ids in display order.
    pub fn table_order(&self) -> Vec<String> {
        let data = self.data.borrow();
        get_in(&data, &["tableOrder"])
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Cached wrapper for one table; created lazily, pruned when the backing
    /// data disappears.
    pub fn table(&self, table_id: &str) -> Result<Rc<Table>, ModelError> {
        {
            let data = self.data.borrow();
            if get_in(&data, &["tablesById", table_id]).is_none() {
                return Err(ModelError::TableNotFound(table_id.to_string()));
            }
        }
        let mut tables = self.tables_by_id.borrow_mut();
        if let Some(existing) = tables.get(table_id) {
            return Ok(Rc::clone(existing));
        }
        let table = Table::new(table_id.to_string(), Rc::clone(&self.data));
        tables.insert(table_id.to_string(), Rc::clone(&table));
        Ok(table)
    }

    /// Tables in `tableOrder` order.
    pub fn tables(&self) -> Vec<Rc<Table>> {
        self.table_order()
            .iter()
            .filter_map(|id| self.table(id).ok())
            .collect()
    }

    /// Opaque host app-interface blob; forwarded to field-type validation.
    pub(crate) fn app_interface(&self) -> Value {
        let data = self.data.borrow();
        get_in(&data, &["appInterface"]).cloned().unwrap_or(Value::Null)
    }

    /// Clones the value at `segments`, if present.
    pub(crate) fn value_at(&self, segments: &[&str]) -> Option<Value> {
        let data = self.data.borrow();
        get_in(&data, segments).cloned()
    }

    pub fn active_collaborator_ids(&self) -> Vec<String> {
        let data = self.data.borrow();
        get_in(&data, &["activeCollaboratorIds"])
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
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

    /// Phase one: apply a batch of diffs to the live tree, in array order,
    /// with no notification. Pure bookkeeping; returns the dirty-path tree.
    pub fn apply_changes_without_triggering_events(
        &self,
        changes: &[ModelChange],
    ) -> ChangedPaths {
        apply_model_changes(&mut self.data.borrow_mut(), changes)
    }

    /// Phase two: walk a dirty-path tree and fire coarse watch keys.
    ///
    /// Any schema-affecting change anywhere (table order, table schema, base
    /// name, appInterface) fires the coarse `schema` key exactly once per
    /// batch, no matter how many underlying fields changed.
    pub fn trigger_on_change_for_changed_paths(&self, dirty: &ChangedPaths) {
        let mut schema_changed = false;

        if dirty.child("name").is_some_and(ChangedPaths::is_dirty_anywhere) {
            self.watchable.on_change(BaseWatchKey::Name.as_str(), &[]);
            schema_changed = true;
        }
        if dirty
            .child("appInterface")
            .is_some_and(ChangedPaths::is_dirty_anywhere)
        {
            schema_changed = true;
        }
        if dirty
            .child("tableOrder")
            .is_some_and(ChangedPaths::is_dirty_anywhere)
        {
            self.prune_stale_table_wrappers();
            self.watchable.on_change(BaseWatchKey::Tables.as_str(), &[]);
            schema_changed = true;
        }
        if let Some(tables_dirty) = dirty.child("tablesById") {
            for (table_id, table_subtree) in &tables_dirty.children {
                if !table_subtree.is_dirty_anywhere() {
                    continue;
                }
                let exists = {
                    let data = self.data.borrow();
                    get_in(&data, &["tablesById", table_id]).is_some()
                };
                if !exists {
                    if let Some(wrapper) = self.tables_by_id.borrow_mut().shift_remove(table_id) {
                        wrapper.mark_deleted();
                    }
                    schema_changed = true;
                    continue;
                }
                let cached = self.tables_by_id.borrow().get(table_id).map(Rc::clone);
                schema_changed |= match cached {
                    Some(wrapper) => wrapper.trigger_on_change_for_dirty_paths(table_subtree),
                    None => Table::dirty_paths_affect_schema(table_subtree),
                };
            }
        }
        if dirty
            .child("collaboratorsById")
            .is_some_and(ChangedPaths::is_dirty_anywhere)
            || dirty
                .child("activeCollaboratorIds")
                .is_some_and(ChangedPaths::is_dirty_anywhere)
        {
            self.watchable
                .on_change(BaseWatchKey::Collaborators.as_str(), &[]);
        }

        if schema_changed {
            self.watchable.on_change(BaseWatchKey::Schema.as_str(), &[]);
        }
    }

    /// Lazy garbage collection of wrapper objects whose backing data is gone.
    /// The underlying tree was already mutated; this only retires wrappers.
    fn prune_stale_table_wrappers(&self) {
        let stale: Vec<String> = {
            let data = self.data.borrow();
            self.tables_by_id
                .borrow()
                .keys()
                .filter(|table_id| get_in(&data, &["tablesById", table_id]).is_none())
                .cloned()
                .collect()
        };
        for table_id in stale {
            if let Some(wrapper) = self.tables_by_id.borrow_mut().shift_remove(&table_id) {
                wrapper.mark_deleted();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded_base() -> Rc<Base> {
        Base::new(json!({
            "id": "app1",
            "name": "Product tracker",
            "tableOrder": ["tbl1", "tbl2"],
            "tablesById": {
                "tbl1": {
                    "id": "tbl1",
                    "name": "Tasks",
                    "fieldOrder": ["fld1", "fld2"],
                    "fieldsById": {
                        "fld1": {"id": "fld1", "name": "Name", "type": "text", "isComputed": false},
                        "fld2": {"id": "fld2", "name": "Done", "type": "checkbox", "isComputed": false}
                    }
                },
                "tbl2": {
                    "id": "tbl2",
                    "name": "Projects",
                    "fieldOrder": ["fld3"],
                    "fieldsById": {
                        "fld3": {"id": "fld3", "name": "Title", "type": "text", "isComputed": false}
                    }
                }
            },
            "permissionLevel": "create",
            "currentUserId": "usr1",
            "collaboratorsById": {"usr1": {"id": "usr1", "name": "Ada"}}
        }))
    }

    fn change(path: &str, value: Value) -> ModelChange {
        ModelChange::set(path.split('.').map(str::to_string).collect(), value)
    }

    fn apply(base: &Base, changes: &[ModelChange]) {
        let dirty = base.apply_changes_without_triggering_events(changes);
        base.trigger_on_change_for_changed_paths(&dirty);
    }

    #[test]
    fn getters_read_the_mirror() {
        let base = seeded_base();
        assert_eq!(base.name().unwrap(), "Product tracker");
        assert_eq!(base.table_order(), vec!["tbl1", "tbl2"]);
        let table = base.table("tbl1").unwrap();
        assert_eq!(table.name().unwrap(), "Tasks");
        assert_eq!(table.field("fld1").unwrap().name().unwrap(), "Name");
        assert!(base.table("tblX").is_err());
    }

    #[test]
    fn table_wrappers_are_cached() {
        let base = seeded_base();
        let a = base.table("tbl1").unwrap();
        let b = base.table("tbl1").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn schema_key_coalesces_across_tables_and_fields() {
        let base = seeded_base();
        let schema_count = Rc::new(std::cell::Cell::new(0));
        let tables_count = Rc::new(std::cell::Cell::new(0));
        let schema_cb: WatchCallback = {
            let schema_count = Rc::clone(&schema_count);
            Rc::new(move |_, _| schema_count.set(schema_count.get() + 1))
        };
        let tables_cb: WatchCallback = {
            let tables_count = Rc::clone(&tables_count);
            Rc::new(move |_, _| tables_count.set(tables_count.get() + 1))
        };
        base.watch(["schema"], &schema_cb);
        base.watch(["tables"], &tables_cb);

        // Instantiate wrappers so per-field delegation has somewhere to go.
        let fld1 = base.table("tbl1").unwrap().field("fld1").unwrap();
        let fld2 = base.table("tbl1").unwrap().field("fld2").unwrap();
        let fld3 = base.table("tbl2").unwrap().field("fld3").unwrap();
        let field_fires = Rc::new(RefCell::new(Vec::new()));
        let field_cb: WatchCallback = {
            let field_fires = Rc::clone(&field_fires);
            Rc::new(move |key, _| field_fires.borrow_mut().push(key.to_string()))
        };
        fld1.watch(["name"], &field_cb);
        fld2.watch(["name"], &field_cb);
        fld3.watch(["name"], &field_cb);

        apply(
            &base,
            &[
                change("tableOrder", json!(["tbl2", "tbl1"])),
                change("tablesById.tbl1.fieldsById.fld1.name", json!("Label")),
                change("tablesById.tbl1.fieldsById.fld2.name", json!("Finished")),
                change("tablesById.tbl2.fieldsById.fld3.name", json!("Heading")),
            ],
        );

        assert_eq!(schema_count.get(), 1, "schema fires exactly once");
        assert_eq!(tables_count.get(), 1, "tables fires exactly once");
        assert_eq!(field_fires.borrow().len(), 3, "one fire per distinct field");
    }

    #[test]
    fn reapplied_batch_is_silent() {
        let base = seeded_base();
        let fired = Rc::new(std::cell::Cell::new(0));
        let cb: WatchCallback = {
            let fired = Rc::clone(&fired);
            Rc::new(move |_, _| fired.set(fired.get() + 1))
        };
        base.watch(["name", "schema", "tables"], &cb);

        let batch = [change("name", json!("Renamed"))];
        apply(&base, &batch);
        let after_first = fired.get();
        assert!(after_first > 0);

        let dirty = base.apply_changes_without_triggering_events(&batch);
        assert!(dirty.is_empty(), "second application leaves no dirty marks");
        base.trigger_on_change_for_changed_paths(&dirty);
        assert_eq!(fired.get(), after_first);
    }

    #[test]
    fn deleting_a_table_retires_its_wrapper() {
        let base = seeded_base();
        let table = base.table("tbl2").unwrap();
        assert!(!table.is_deleted());

        apply(
            &base,
            &[
                ModelChange::delete(vec!["tablesById".into(), "tbl2".into()]),
                change("tableOrder", json!(["tbl1"])),
            ],
        );

        assert!(table.is_deleted());
        assert!(table.name().is_err());
        assert!(base.table("tbl2").is_err());
    }

    #[test]
    fn record_changes_fire_records_not_schema() {
        let base = seeded_base();
        apply(
            &base,
            &[change(
                "tablesById.tbl1.recordsById",
                json!({"rec1": {"id": "rec1", "cellValuesByFieldId": {"fld1": "old"}}}),
            )],
        );

        let table = base.table("tbl1").unwrap();
        let schema_fired = Rc::new(std::cell::Cell::new(0));
        let records_fired = Rc::new(std::cell::Cell::new(0));
        let schema_cb: WatchCallback = {
            let schema_fired = Rc::clone(&schema_fired);
            Rc::new(move |_, _| schema_fired.set(schema_fired.get() + 1))
        };
        let records_cb: WatchCallback = {
            let records_fired = Rc::clone(&records_fired);
            Rc::new(move |_, _| records_fired.set(records_fired.get() + 1))
        };
        base.watch(["schema"], &schema_cb);
        table.watch(["records"], &records_cb);

        apply(
            &base,
            &[change(
                "tablesById.tbl1.recordsById.rec1.cellValuesByFieldId.fld1",
                json!("new"),
            )],
        );

        assert_eq!(records_fired.get(), 1);
        assert_eq!(schema_fired.get(), 0);
        assert_eq!(
            table.record("rec1").unwrap().cell_value("fld1"),
            Some(json!("new"))
        );
    }
}
