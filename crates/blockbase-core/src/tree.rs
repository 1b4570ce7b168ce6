//! In-place diff application against a JSON tree.
//!
//! A [`ModelChange`] is a single `{path, value}` diff. Batches are applied in
//! array order by walking the live tree, synthesizing missing intermediate
//! objects, and writing (or deleting) the leaf. Writes are gated on deep
//! equality so a no-op diff leaves no trace.
//!
//! Application is pure bookkeeping: no events fire here. Each applied batch
//! produces a parallel [`ChangedPaths`] tree marking exactly which leaves
//! changed, which the model layer walks afterwards to decide what to
//! announce. The two-phase split lets several models consume the same batch
//! and each compute its own dirty summary before any of them notifies.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single diff against the model mirror. `value: None` deletes the leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelChange {
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ModelChange {
    pub fn set(path: Vec<String>, value: Value) -> Self {
        ModelChange {
            path,
            value: Some(value),
        }
    }

    pub fn delete(path: Vec<String>) -> Self {
        ModelChange { path, value: None }
    }
}

/// Structural mirror of the data tree recording which leaves were mutated.
///
/// A node with `is_dirty == true` is a mutated leaf; ancestor nodes exist as
/// plain children maps, which lets a consumer distinguish "this subtree
/// changed somewhere" from "this exact node changed".
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChangedPaths {
    pub is_dirty: bool,
    pub children: IndexMap<String, ChangedPaths>,
}

impl ChangedPaths {
    /// Returns the child node for `key`, if any part of that subtree changed.
    pub fn child(&self, key: &str) -> Option<&ChangedPaths> {
        self.children.get(key)
    }

    /// True when this node or anything below it is dirty.
    pub fn is_dirty_anywhere(&self) -> bool {
        self.is_dirty || self.children.values().any(ChangedPaths::is_dirty_anywhere)
    }

    /// True when the tree records no change at all.
    pub fn is_empty(&self) -> bool {
        !self.is_dirty_anywhere()
    }

    fn node_at_mut(&mut self, path: &[String]) -> &mut ChangedPaths {
        let mut node = self;
        for segment in path {
            node = node.children.entry(segment.clone()).or_default();
        }
        node
    }
}

/// Applies one change to `root`, recording the touched leaf in `dirty`.
///
/// Returns whether the leaf actually changed. Intermediate nodes are created
/// as empty objects when missing; an intermediate that exists but is not an
/// object is replaced by one (and the replacement itself marked dirty).
pub fn apply_model_change(root: &mut Value, change: &ModelChange, dirty: &mut ChangedPaths) -> bool {
    let Some((leaf_key, parents)) = change.path.split_last() else {
        return false;
    };

    let mut target = root;
    let mut walked: Vec<String> = Vec::with_capacity(parents.len());
    for segment in parents {
        walked.push(segment.clone());
        if !target.is_object() {
            *target = Value::Object(Map::new());
            dirty.node_at_mut(&walked[..walked.len() - 1]).is_dirty = true;
        }
        let map = target
            .as_object_mut()
            .unwrap_or_else(|| unreachable!("target coerced to object above"));
        target = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !target.is_object() {
        *target = Value::Object(Map::new());
        dirty.node_at_mut(parents).is_dirty = true;
    }
    let map = target
        .as_object_mut()
        .unwrap_or_else(|| unreachable!("target coerced to object above"));

    let changed = match &change.value {
        Some(new_value) => {
            // Deep-equality short-circuit: a no-op write is not a change.
            if map.get(leaf_key) == Some(new_value) {
                false
            } else {
                map.insert(leaf_key.clone(), new_value.clone());
                true
            }
        }
        None => map.remove(leaf_key).is_some(),
    };

    if changed {
        dirty.node_at_mut(&change.path).is_dirty = true;
    }
    changed
}

/// Applies a batch of changes in array order and returns the dirty-path tree.
///
/// A later diff may depend on an earlier one having already mutated the tree.
pub fn apply_model_changes(root: &mut Value, changes: &[ModelChange]) -> ChangedPaths {
    let mut dirty = ChangedPaths::default();
    for change in changes {
        apply_model_change(root, change, &mut dirty);
    }
    dirty
}

/// Immutable navigation to the value at `path`.
pub fn value_at_path<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut node = root;
    for segment in path {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}
