//! The channel tabs publish state through.
//!
//! [`Transport`] is what the coordinator needs: an availability check, the
//! initial value, change notifications and a save operation. [`Tab`] is the
//! implementation over any [`Storage`]: it wraps every saved tree in an
//! envelope carrying the tab's id, and drops notifications carrying its own
//! id so a tab never re-applies its own update.

use serde::{Deserialize, Serialize};
use tabsync_core::{StateTree, TabsyncResult};
use tokio::sync::mpsc;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::storage::{Storage, StorageEvent};

/// Key written and removed to probe whether the storage accepts writes.
pub const PROBE_KEY: &str = "vuex-multi-tab-state-test";

pub trait Transport: Send + Sync {
    /// Whether the underlying channel can be used at all.
    fn is_available(&self) -> bool;
    /// The tree currently published under `key`, if any.
    fn fetch_state(&self, key: &str) -> TabsyncResult<Option<StateTree>>;
    /// Trees published under `key` by other participants, as they arrive.
    fn subscribe(&self, key: &str) -> TabsyncResult<mpsc::UnboundedReceiver<StateTree>>;
    /// Publish `state` under `key`.
    fn save_state(&self, key: &str, state: &StateTree) -> TabsyncResult<()>;
}

/// Stored form of a published tree.
#[derive(Debug, Serialize, Deserialize)]
struct SavedState {
    id: String,
    state: StateTree,
}

#[derive(Serialize)]
struct SavedStateRef<'a> {
    id: &'a str,
    state: &'a StateTree,
}

/// One participant (tab) on a shared storage.
pub struct Tab<S> {
    id: String,
    storage: S,
}

impl<S: Storage> Tab<S> {
    pub fn new(storage: S) -> Self {
        Tab {
            id: Uuid::new_v4().to_string(),
            storage,
        }
    }

    /// Random id stamped on everything this tab saves.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

fn parse_saved(key: &str, raw: &str) -> Option<SavedState> {
    match serde_json::from_str(raw) {
        Ok(saved) => Some(saved),
        Err(e) => {
            warn!(key, error = %e, "stored state is invalid, ignoring");
            None
        }
    }
}

impl<S: Storage> Transport for Tab<S> {
    fn is_available(&self) -> bool {
        self.storage
            .set_item(PROBE_KEY, PROBE_KEY)
            .and_then(|()| self.storage.remove_item(PROBE_KEY))
            .is_ok()
    }

    fn fetch_state(&self, key: &str) -> TabsyncResult<Option<StateTree>> {
        Ok(self
            .storage
            .get_item(key)?
            .and_then(|raw| parse_saved(key, &raw))
            .map(|saved| saved.state))
    }

    fn subscribe(&self, key: &str) -> TabsyncResult<mpsc::UnboundedReceiver<StateTree>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let key = key.to_string();
        let own_id = self.id.clone();

        self.storage.add_listener(Box::new(move |event: &StorageEvent| {
            if event.key != key {
                return;
            }
            let Some(raw) = event.new_value.as_deref() else {
                return;
            };
            let Some(saved) = parse_saved(&key, raw) else {
                return;
            };
            if saved.id == own_id {
                trace!(key = %key, "ignoring own update");
                return;
            }
            // A closed receiver means the subscriber went away
            let _ = tx.send(saved.state);
        }))?;

        Ok(rx)
    }

    fn save_state(&self, key: &str, state: &StateTree) -> TabsyncResult<()> {
        let json = serde_json::to_string(&SavedStateRef { id: &self.id, state })?;
        self.storage.set_item(key, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    #[test]
    fn test_available_on_writable_storage() {
        let tab = Tab::new(MemoryStorage::new());
        assert!(tab.is_available());
        assert_eq!(tab.storage().get_item(PROBE_KEY).unwrap(), None);
    }

    #[test]
    fn test_unavailable_on_read_only_storage() {
        assert!(!Tab::new(MemoryStorage::read_only()).is_available());
    }

    #[test]
    fn test_save_writes_envelope() {
        let tab = Tab::new(MemoryStorage::new());
        tab.save_state("k", &json!({"a": 1})).unwrap();

        let raw = tab.storage().get_item("k").unwrap().unwrap();
        let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, json!({"id": tab.id(), "state": {"a": 1}}));
    }

    #[test]
    fn test_fetch_roundtrip_across_tabs() {
        let storage = MemoryStorage::new();
        let writer = Tab::new(storage.clone());
        let reader = Tab::new(storage);

        assert_eq!(reader.fetch_state("k").unwrap(), None);
        writer.save_state("k", &json!({"x": [1, 2]})).unwrap();
        assert_eq!(reader.fetch_state("k").unwrap(), Some(json!({"x": [1, 2]})));
    }

    #[test]
    fn test_fetch_invalid_payload_is_absent() {
        let storage = MemoryStorage::new();
        storage.set_item("k", "not json").unwrap();
        assert_eq!(Tab::new(storage).fetch_state("k").unwrap(), None);
    }

    #[test]
    fn test_subscribe_skips_own_updates() {
        let storage = MemoryStorage::new();
        let tab = Tab::new(storage.clone());
        let other = Tab::new(storage);
        let mut rx = tab.subscribe("k").unwrap();

        tab.save_state("k", &json!({"mine": true})).unwrap();
        assert!(rx.try_recv().is_err());

        other.save_state("k", &json!({"theirs": true})).unwrap();
        assert_eq!(rx.try_recv().unwrap(), json!({"theirs": true}));
    }

    #[test]
    fn test_subscribe_filters_key_removal_and_garbage() {
        let storage = MemoryStorage::new();
        let tab = Tab::new(storage.clone());
        let other = Tab::new(storage.clone());
        let mut rx = tab.subscribe("k").unwrap();

        other.save_state("unrelated", &json!(1)).unwrap();
        storage.set_item("k", "{broken").unwrap();
        storage.remove_item("k").unwrap();
        assert!(rx.try_recv().is_err());
    }
}
