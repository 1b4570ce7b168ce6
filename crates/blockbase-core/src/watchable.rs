//! String-keyed synchronous pub/sub.
//!
//! Every observable model owns one [`Watchable`]. Callbacks are registered
//! against string watch keys, validated by a per-model predicate supplied at
//! construction. Invalid keys are silently filtered, never an error:
//! `watch`/`unwatch` return only the subset of keys that were actually
//! (un)registered.
//!
//! Identity of a registration is the `Rc` pointer of its callback. The same
//! callback may be registered multiple times for the same key; each
//! registration is independently removable, first match wins.

use indexmap::IndexMap;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Callback invoked when a watched key changes. Receives the key that fired
/// and any event arguments the model chose to attach.
pub type WatchCallback = Rc<dyn Fn(&str, &[Value])>;

/// Listener-count transition for a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchTransition {
    /// The key went from zero listeners to one.
    FirstWatcher,
    /// The key went from one listener to zero.
    LastWatcherGone,
}

type TransitionHook = Box<dyn Fn(&str, WatchTransition)>;

/// Synchronous watch registry with per-key listener lists.
pub struct Watchable {
    is_valid_key: Box<dyn Fn(&str) -> bool>,
    listeners: RefCell<IndexMap<String, Vec<WatchCallback>>>,
    transition_hook: RefCell<Option<TransitionHook>>,
}

impl Watchable {
    /// Creates a registry whose keys are validated by `is_valid_key`.
    pub fn new(is_valid_key: impl Fn(&str) -> bool + 'static) -> Self {
        Watchable {
            is_valid_key: Box::new(is_valid_key),
            listeners: RefCell::new(IndexMap::new()),
            transition_hook: RefCell::new(None),
        }
    }

    /// Installs a hook fired on 0→1 and 1→0 listener-count transitions.
    ///
    /// Models use this to attach a host subscription only while at least one
    /// watcher cares about a key, and to detach it when the last one leaves.
    pub fn set_transition_hook(&self, hook: impl Fn(&str, WatchTransition) + 'static) {
        *self.transition_hook.borrow_mut() = Some(Box::new(hook));
    }

    /// Returns whether `key` passes this registry's validity predicate.
    pub fn is_valid_watch_key(&self, key: &str) -> bool {
        (self.is_valid_key)(key)
    }

    /// Registers `callback` for every valid key in `keys`.
    ///
    /// Duplicate keys in the input are each processed. Returns the keys that
    /// were actually registered (invalid keys are dropped, not errors).
    pub fn watch<I, K>(&self, keys: I, callback: &WatchCallback) -> Vec<String>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut registered = Vec::new();
        for key in keys {
            let key: String = key.into();
            if !(self.is_valid_key)(&key) {
                continue;
            }
            let became_first = {
                let mut listeners = self.listeners.borrow_mut();
                let list = listeners.entry(key.clone()).or_default();
                list.push(Rc::clone(callback));
                list.len() == 1
            };
            if became_first {
                self.fire_transition(&key, WatchTransition::FirstWatcher);
            }
            registered.push(key);
        }
        registered
    }

    /// Removes the first registration of `callback` for every valid key in
    /// `keys`. Keys with no matching registration are excluded from the
    /// returned list.
    pub fn unwatch<I, K>(&self, keys: I, callback: &WatchCallback) -> Vec<String>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut removed = Vec::new();
        for key in keys {
            let key: String = key.into();
            if !(self.is_valid_key)(&key) {
                continue;
            }
            let became_empty = {
                let mut listeners = self.listeners.borrow_mut();
                let Some(list) = listeners.get_mut(&key) else {
                    continue;
                };
                let Some(position) = list.iter().position(|cb| Rc::ptr_eq(cb, callback)) else {
                    continue;
                };
                list.remove(position);
                let empty = list.is_empty();
                if empty {
                    listeners.shift_remove(&key);
                }
                empty
            };
            if became_empty {
                self.fire_transition(&key, WatchTransition::LastWatcherGone);
            }
            removed.push(key);
        }
        removed
    }

    /// Number of live registrations for `key`.
    pub fn listener_count(&self, key: &str) -> usize {
        self.listeners.borrow().get(key).map_or(0, Vec::len)
    }

    /// Invokes every callback registered for `key`, in registration order.
    ///
    /// The listener list is snapshotted before firing, so callbacks may
    /// watch/unwatch during iteration without skipping or double-calling
    /// entries that were present at fire time.
    pub fn on_change(&self, key: &str, args: &[Value]) {
        let snapshot: Vec<WatchCallback> = self
            .listeners
            .borrow()
            .get(key)
            .map(|list| list.iter().map(Rc::clone).collect())
            .unwrap_or_default();
        for callback in snapshot {
            callback(key, args);
        }
    }

    fn fire_transition(&self, key: &str, transition: WatchTransition) {
        if let Some(hook) = self.transition_hook.borrow().as_ref() {
            hook(key, transition);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting_callback(counter: &Rc<Cell<usize>>) -> WatchCallback {
        let counter = Rc::clone(counter);
        Rc::new(move |_key, _args| counter.set(counter.get() + 1))
    }

    fn any_key_registry() -> Watchable {
        Watchable::new(|_| true)
    }

    #[test]
    fn watch_then_unwatch_restores_empty_listener_set() {
        let registry = Watchable::new(|key| key == "name" || key == "schema");
        let fired = Rc::new(Cell::new(0));
        let cb = counting_callback(&fired);

        let watched = registry.watch(["name", "schema"], &cb);
        assert_eq!(watched, vec!["name".to_string(), "schema".to_string()]);

        let unwatched = registry.unwatch(["name", "schema"], &cb);
        assert_eq!(unwatched, vec!["name".to_string(), "schema".to_string()]);

        registry.on_change("name", &[]);
        registry.on_change("schema", &[]);
        assert_eq!(fired.get(), 0);
        assert_eq!(registry.listener_count("name"), 0);
    }

    #[test]
    fn invalid_keys_are_silently_filtered() {
        let registry = Watchable::new(|key| key == "name");
        let cb: WatchCallback = Rc::new(|_, _| {});
        assert_eq!(registry.watch(["name", "bogus"], &cb), vec!["name".to_string()]);
        assert_eq!(registry.unwatch(["bogus"], &cb), Vec::<String>::new());
    }

    #[test]
    fn duplicate_registrations_are_independent() {
        let registry = any_key_registry();
        let fired = Rc::new(Cell::new(0));
        let cb = counting_callback(&fired);

        registry.watch(["a"], &cb);
        registry.watch(["a"], &cb);
        registry.on_change("a", &[]);
        assert_eq!(fired.get(), 2);

        registry.unwatch(["a"], &cb);
        registry.on_change("a", &[]);
        assert_eq!(fired.get(), 3);
    }

    #[test]
    fn unwatch_without_registration_returns_nothing() {
        let registry = any_key_registry();
        let cb: WatchCallback = Rc::new(|_, _| {});
        assert_eq!(registry.unwatch(["a"], &cb), Vec::<String>::new());
    }

    #[test]
    fn callbacks_fire_in_registration_order() {
        let registry = any_key_registry();
        let order = Rc::new(RefCell::new(Vec::new()));
        let first: WatchCallback = {
            let order = Rc::clone(&order);
            Rc::new(move |_, _| order.borrow_mut().push(1))
        };
        let second: WatchCallback = {
            let order = Rc::clone(&order);
            Rc::new(move |_, _| order.borrow_mut().push(2))
        };
        registry.watch(["k"], &first);
        registry.watch(["k"], &second);
        registry.on_change("k", &[]);
        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn callback_may_unwatch_itself_mid_fire() {
        let registry = Rc::new(any_key_registry());
        let fired = Rc::new(Cell::new(0));
        // Self-removing callback: needs its own Rc to hand to unwatch.
        let slot: Rc<RefCell<Option<WatchCallback>>> = Rc::new(RefCell::new(None));
        let cb: WatchCallback = {
            let registry = Rc::clone(&registry);
            let fired = Rc::clone(&fired);
            let slot = Rc::clone(&slot);
            Rc::new(move |_, _| {
                fired.set(fired.get() + 1);
                if let Some(me) = slot.borrow().as_ref() {
                    registry.unwatch(["k"], me);
                }
            })
        };
        *slot.borrow_mut() = Some(Rc::clone(&cb));
        registry.watch(["k"], &cb);

        registry.on_change("k", &[]);
        registry.on_change("k", &[]);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn transition_hook_sees_refcount_edges_only() {
        let registry = any_key_registry();
        let transitions = Rc::new(RefCell::new(Vec::new()));
        {
            let transitions = Rc::clone(&transitions);
            registry.set_transition_hook(move |key, transition| {
                transitions.borrow_mut().push((key.to_string(), transition));
            });
        }
        let a: WatchCallback = Rc::new(|_, _| {});
        let b: WatchCallback = Rc::new(|_, _| {});

        registry.watch(["k"], &a);
        registry.watch(["k"], &b); // 1→2: no hook
        registry.unwatch(["k"], &a); // 2→1: no hook
        registry.unwatch(["k"], &b); // 1→0: hook

        assert_eq!(
            *transitions.borrow(),
            vec![
                ("k".to_string(), WatchTransition::FirstWatcher),
                ("k".to_string(), WatchTransition::LastWatcherGone),
            ]
        );
    }
}
