//! The host-synced, path-addressable key/value store.
//!
//! Reads resolve paths against an in-memory mirror. Writes go through the
//! mutation pipeline ([`crate::mutations`]), which applies them optimistically
//! via [`GlobalConfig::set_multiple_kv_paths`] and persists them through the
//! host. Host-pushed updates arrive through the same apply-only entry point,
//! so local and remote writes are indistinguishable to watchers.
//!
//! Notification granularity is deliberately coarse: only the distinct
//! top-level keys touched by a batch fire, plus the `'*'` wildcard once if
//! anything changed. Sub-path changes are not individually announced.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use thiserror::Error;

use blockbase_core::path::{
    assert_path_is_structurally_valid, format_path, GlobalConfigPath, WILDCARD_KEY,
};
use blockbase_core::tree::value_at_path;
use blockbase_core::watchable::{WatchCallback, Watchable};

use crate::host::{
    AppliedGlobalConfigUpdates, GlobalConfigHelpers, HostInterface, PartialGlobalConfigUpdate,
    PathValidationResult, PermissionCheckResult,
};
use crate::mutations::{Mutation, MutationError, MutationOutcome, Mutations};

/// A single update to the config tree. `value: None` deletes the leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfigUpdate {
    pub path: GlobalConfigPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl GlobalConfigUpdate {
    pub fn set(path: GlobalConfigPath, value: Value) -> Self {
        GlobalConfigUpdate {
            path,
            value: Some(value),
        }
    }

    pub fn delete(path: GlobalConfigPath) -> Self {
        GlobalConfigUpdate { path, value: None }
    }
}

#[derive(Debug, Error)]
pub enum GlobalConfigError {
    #[error("Invalid globalConfig path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("globalConfig is detached from the mutation pipeline")]
    Detached,
    #[error(transparent)]
    Mutation(#[from] MutationError),
}

pub struct GlobalConfig {
    kv_store: RefCell<Value>,
    watchable: Watchable,
    host: Rc<dyn HostInterface>,
    // Wired once by Sdk::new; Weak because the mutation pipeline holds the
    // config store for optimistic application of config-path mutations.
    mutations: RefCell<Weak<Mutations>>,
}

impl GlobalConfig {
    pub fn new(initial_kv_values_by_key: Value, host: Rc<dyn HostInterface>) -> Rc<Self> {
        let kv_store = if initial_kv_values_by_key.is_object() {
            initial_kv_values_by_key
        } else {
            Value::Object(Map::new())
        };
        Rc::new(GlobalConfig {
            kv_store: RefCell::new(kv_store),
            // Any non-empty top-level key is watchable, plus the wildcard.
            watchable: Watchable::new(|key| !key.is_empty()),
            host,
            mutations: RefCell::new(Weak::new()),
        })
    }

    pub(crate) fn attach_mutations(&self, mutations: Weak<Mutations>) {
        *self.mutations.borrow_mut() = mutations;
    }

    /// Resolves a path to a value. Absent paths return `Ok(None)`; invalid
    /// paths are an error.
    pub fn get(&self, path: &[&str]) -> Result<Option<Value>, GlobalConfigError> {
        let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        self.assert_path_is_valid(&path)?;
        Ok(value_at_path(&self.kv_store.borrow(), &path).cloned())
    }

    /// Speculative permission query; accepts partial update descriptors and
    /// performs no writes.
    pub fn check_permissions_for_set_paths(
        &self,
        updates: &[PartialGlobalConfigUpdate],
    ) -> PermissionCheckResult {
        match self.mutations.borrow().upgrade() {
            Some(mutations) => mutations.check_permissions_for_set_global_config_paths(updates),
            None => PermissionCheckResult::denied("globalConfig is detached from the mutation pipeline"),
        }
    }

    /// Validates every path, then delegates to the mutation pipeline, which
    /// checks permissions, applies the updates optimistically, and persists
    /// them through the host. Fails before any host persistence activity on
    /// invalid paths or denied permissions.
    pub fn set_paths(
        &self,
        updates: Vec<GlobalConfigUpdate>,
    ) -> Result<MutationOutcome, GlobalConfigError> {
        for update in &updates {
            self.assert_path_is_valid(&update.path)?;
        }
        let mutations = self.mutations.borrow().upgrade().ok_or(GlobalConfigError::Detached)?;
        Ok(mutations.apply_mutation(Mutation::SetMultipleGlobalConfigPaths { updates })?)
    }

    /// Apply-only entry point, no validation. Invoked by the host-update path
    /// and by the mutation pipeline's optimistic-apply step.
    ///
    /// Fires each touched top-level key, then `'*'` once if any key changed.
    pub(crate) fn set_multiple_kv_paths(&self, updates: &[GlobalConfigUpdate]) {
        let AppliedGlobalConfigUpdates {
            new_kv_store,
            changed_top_level_keys,
        } = self
            .host
            .global_config_helpers()
            .validate_and_apply_updates(updates, &self.kv_store.borrow());
        *self.kv_store.borrow_mut() = new_kv_store;

        for key in &changed_top_level_keys {
            self.watchable.on_change(key, &[]);
        }
        if !changed_top_level_keys.is_empty() {
            self.watchable.on_change(WILDCARD_KEY, &[]);
        }
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

    fn assert_path_is_valid(&self, path: &[String]) -> Result<(), GlobalConfigError> {
        assert_path_is_structurally_valid(path).map_err(|e| GlobalConfigError::InvalidPath {
            path: format_path(path),
            reason: e.to_string(),
        })?;
        let verdict = self
            .host
            .global_config_helpers()
            .validate_path(path, &self.kv_store.borrow());
        if !verdict.is_valid {
            return Err(GlobalConfigError::InvalidPath {
                path: format_path(path),
                reason: verdict
                    .reason
                    .unwrap_or_else(|| "rejected by host path validator".to_string()),
            });
        }
        Ok(())
    }
}

/// Reference [`GlobalConfigHelpers`]: permissive path validation plus the
/// locate-or-create merge walk. Hosts may substitute their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardGlobalConfigHelpers;

impl GlobalConfigHelpers for StandardGlobalConfigHelpers {
    fn validate_path(&self, path: &[String], _kv_store: &Value) -> PathValidationResult {
        match assert_path_is_structurally_valid(path) {
            Ok(()) => PathValidationResult {
                is_valid: true,
                reason: None,
            },
            Err(e) => PathValidationResult {
                is_valid: false,
                reason: Some(e.to_string()),
            },
        }
    }

    fn validate_and_apply_updates(
        &self,
        updates: &[GlobalConfigUpdate],
        kv_store: &Value,
    ) -> AppliedGlobalConfigUpdates {
        let mut next = if kv_store.is_object() {
            kv_store.clone()
        } else {
            Value::Object(Map::new())
        };
        let mut changed_top_level_keys = Vec::new();
        for update in updates {
            let Some(top_level_key) = update.path.first() else {
                continue;
            };
            if apply_kv_update(&mut next, update) && !changed_top_level_keys.contains(top_level_key)
            {
                changed_top_level_keys.push(top_level_key.clone());
            }
        }
        AppliedGlobalConfigUpdates {
            new_kv_store: next,
            changed_top_level_keys,
        }
    }
}

/// Locates or creates `update.path` in `store`, deletes the leaf when the
/// value is absent, else sets it. Returns whether the leaf actually changed.
fn apply_kv_update(store: &mut Value, update: &GlobalConfigUpdate) -> bool {
    let Some((leaf_key, parents)) = update.path.split_last() else {
        return false;
    };
    let mut target = store;
    for segment in parents {
        if !target.is_object() {
            *target = Value::Object(Map::new());
        }
        let map = match target {
            Value::Object(map) => map,
            _ => return false,
        };
        target = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let map = match target {
        Value::Object(map) => map,
        _ => return false,
    };
    match &update.value {
        Some(new_value) => {
            if map.get(leaf_key) == Some(new_value) {
                false
            } else {
                map.insert(leaf_key.clone(), new_value.clone());
                true
            }
        }
        None => map.remove(leaf_key).is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn kv_update_creates_intermediates() {
        let mut store = json!({});
        let changed = apply_kv_update(
            &mut store,
            &GlobalConfigUpdate::set(path(&["a", "b", "c"]), json!(1)),
        );
        assert!(changed);
        assert_eq!(store, json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn kv_update_delete_removes_leaf() {
        let mut store = json!({"a": {"b": 1}});
        assert!(apply_kv_update(
            &mut store,
            &GlobalConfigUpdate::delete(path(&["a", "b"])),
        ));
        assert_eq!(store, json!({"a": {}}));
    }

    #[test]
    fn kv_update_equal_value_is_not_a_change() {
        let mut store = json!({"a": {"b": [1, 2]}});
        assert!(!apply_kv_update(
            &mut store,
            &GlobalConfigUpdate::set(path(&["a", "b"]), json!([1, 2])),
        ));
    }

    #[test]
    fn standard_helpers_report_distinct_touched_keys() {
        let helpers = StandardGlobalConfigHelpers;
        let store = json!({});
        let applied = helpers.validate_and_apply_updates(
            &[
                GlobalConfigUpdate::set(path(&["a", "x"]), json!(1)),
                GlobalConfigUpdate::set(path(&["a", "y"]), json!(2)),
                GlobalConfigUpdate::set(path(&["b"]), json!(3)),
            ],
            &store,
        );
        assert_eq!(applied.changed_top_level_keys, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(applied.new_kv_store, json!({"a": {"x": 1, "y": 2}, "b": 3}));
    }
}
