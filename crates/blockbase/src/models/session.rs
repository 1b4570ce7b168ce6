//! Session wrapper: current-user and permission state.
//!
//! Shares the model mirror with [`super::Base`] and consumes the same
//! dirty-path summaries, so a watcher reacting to a base change and reading
//! session state in the same tick never observes a half-updated world.

use serde_json::{json, Value};
use std::rc::Rc;

use blockbase_core::tree::ChangedPaths;
use blockbase_core::watchable::{WatchCallback, Watchable};

use super::{get_in, SharedData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionWatchKey {
    PermissionLevel,
    CurrentUser,
}

impl SessionWatchKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionWatchKey::PermissionLevel => "permissionLevel",
            SessionWatchKey::CurrentUser => "currentUser",
        }
    }

    pub fn from_watch_key(key: &str) -> Option<Self> {
        match key {
            "permissionLevel" => Some(SessionWatchKey::PermissionLevel),
            "currentUser" => Some(SessionWatchKey::CurrentUser),
            _ => None,
        }
    }
}

pub struct Session {
    data: SharedData,
    watchable: Watchable,
}

impl Session {
    pub(crate) fn new(data: SharedData) -> Rc<Self> {
        Rc::new(Session {
            data,
            watchable: Watchable::new(|key| SessionWatchKey::from_watch_key(key).is_some()),
        })
    }

    pub fn permission_level(&self) -> String {
        let data = self.data.borrow();
        get_in(&data, &["permissionLevel"])
            .and_then(Value::as_str)
            .unwrap_or("none")
            .to_string()
    }

    pub fn current_user_id(&self) -> Option<String> {
        let data = self.data.borrow();
        get_in(&data, &["currentUserId"])
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Collaborator data for the current user, when present in the mirror.
    pub fn current_user(&self) -> Option<Value> {
        let data = self.data.borrow();
        let user_id = get_in(&data, &["currentUserId"]).and_then(Value::as_str)?;
        get_in(&data, &["collaboratorsById", user_id]).cloned()
    }

    /// Snapshot handed to the host alongside permission checks.
    pub(crate) fn permission_snapshot(&self) -> Value {
        json!({
            "permissionLevel": self.permission_level(),
            "currentUserId": self.current_user_id(),
        })
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

    /// Phase-two consumer for the same dirty summaries the base walks.
    pub fn trigger_on_change_for_changed_paths(&self, dirty: &ChangedPaths) {
        if dirty
            .child("permissionLevel")
            .is_some_and(ChangedPaths::is_dirty_anywhere)
        {
            self.watchable
                .on_change(SessionWatchKey::PermissionLevel.as_str(), &[]);
        }

        let current_user_changed = dirty
            .child("currentUserId")
            .is_some_and(ChangedPaths::is_dirty_anywhere)
            || self.current_user_id().is_some_and(|user_id| {
                dirty
                    .child("collaboratorsById")
                    .and_then(|c| c.child(&user_id))
                    .is_some_and(ChangedPaths::is_dirty_anywhere)
            });
        if current_user_changed {
            self.watchable
                .on_change(SessionWatchKey::CurrentUser.as_str(), &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockbase_core::tree::{apply_model_changes, ModelChange};
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    fn seeded_session() -> (SharedData, Rc<Session>) {
        let data: SharedData = Rc::new(RefCell::new(json!({
            "permissionLevel": "read",
            "currentUserId": "usr1",
            "collaboratorsById": {"usr1": {"id": "usr1", "name": "Ada"}}
        })));
        let session = Session::new(Rc::clone(&data));
        (data, session)
    }

    #[test]
    fn permission_level_change_fires_its_key() {
        let (data, session) = seeded_session();
        let fired = Rc::new(Cell::new(0));
        let cb: WatchCallback = {
            let fired = Rc::clone(&fired);
            Rc::new(move |_, _| fired.set(fired.get() + 1))
        };
        session.watch(["permissionLevel"], &cb);

        let dirty = apply_model_changes(
            &mut data.borrow_mut(),
            &[ModelChange::set(
                vec!["permissionLevel".into()],
                json!("create"),
            )],
        );
        session.trigger_on_change_for_changed_paths(&dirty);

        assert_eq!(fired.get(), 1);
        assert_eq!(session.permission_level(), "create");
    }

    #[test]
    fn collaborator_edit_for_current_user_fires_current_user() {
        let (data, session) = seeded_session();
        let fired = Rc::new(Cell::new(0));
        let cb: WatchCallback = {
            let fired = Rc::clone(&fired);
            Rc::new(move |_, _| fired.set(fired.get() + 1))
        };
        session.watch(["currentUser"], &cb);

        let dirty = apply_model_changes(
            &mut data.borrow_mut(),
            &[ModelChange::set(
                vec!["collaboratorsById".into(), "usr1".into(), "name".into()],
                json!("Ada L."),
            )],
        );
        session.trigger_on_change_for_changed_paths(&dirty);
        assert_eq!(fired.get(), 1);

        // Edits to other collaborators stay silent.
        let dirty = apply_model_changes(
            &mut data.borrow_mut(),
            &[ModelChange::set(
                vec!["collaboratorsById".into(), "usr2".into()],
                json!({"id": "usr2"}),
            )],
        );
        session.trigger_on_change_for_changed_paths(&dirty);
        assert_eq!(fired.get(), 1);
    }
}
