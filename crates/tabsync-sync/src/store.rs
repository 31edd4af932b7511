//! The host state store a coordinator keeps in sync.

use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use tabsync_core::{Mutation, MutationEvent, StateTree};
use tokio::sync::mpsc;

/// The application store whose state is shared across tabs.
pub trait HostStore {
    /// Snapshot of the current state.
    fn state(&self) -> StateTree;
    /// Install a new state wholesale. Not reported as a mutation.
    fn replace_state(&self, state: StateTree);
    /// Receive every local mutation together with the state after it.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<MutationEvent>;
}

struct StoreInner {
    state: StateTree,
    subscribers: Vec<mpsc::UnboundedSender<MutationEvent>>,
}

/// In-process store: state plus mutation subscribers behind one lock.
///
/// Clones are handles to the same store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl MemoryStore {
    pub fn new(state: StateTree) -> Self {
        MemoryStore {
            inner: Arc::new(Mutex::new(StoreInner {
                state,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Apply a named mutation and notify subscribers.
    pub fn commit<F>(&self, kind: &str, payload: Value, apply: F)
    where
        F: FnOnce(&mut StateTree),
    {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        apply(&mut inner.state);

        let event = MutationEvent {
            mutation: Mutation {
                kind: kind.to_string(),
                payload,
            },
            state: inner.state.clone(),
        };
        // Dropped receivers unsubscribe themselves
        inner
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl HostStore for MemoryStore {
    fn state(&self) -> StateTree {
        self.inner.lock().expect("store lock poisoned").state.clone()
    }

    fn replace_state(&self, state: StateTree) {
        self.inner.lock().expect("store lock poisoned").state = state;
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<MutationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .expect("store lock poisoned")
            .subscribers
            .push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_state_is_empty_object() {
        assert_eq!(MemoryStore::default().state(), json!({}));
    }

    #[test]
    fn test_commit_notifies_with_post_mutation_state() {
        let store = MemoryStore::new(json!({"count": 0}));
        let mut rx = store.subscribe();

        store.commit("increment", json!(2), |state| {
            state["count"] = json!(2);
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.mutation.kind, "increment");
        assert_eq!(event.mutation.payload, json!(2));
        assert_eq!(event.state, json!({"count": 2}));
        assert_eq!(store.state(), json!({"count": 2}));
    }

    #[test]
    fn test_replace_is_not_a_mutation() {
        let store = MemoryStore::default();
        let mut rx = store.subscribe();
        store.replace_state(json!({"x": 1}));
        assert_eq!(store.state(), json!({"x": 1}));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let store = MemoryStore::default();
        let handle = store.clone();
        handle.commit("set", Value::Null, |s| s["k"] = json!("v"));
        assert_eq!(store.state(), json!({"k": "v"}));
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let store = MemoryStore::default();
        drop(store.subscribe());
        let mut live = store.subscribe();
        store.commit("noop", Value::Null, |_| {});
        store.commit("noop", Value::Null, |_| {});
        assert!(live.try_recv().is_ok());
        assert!(live.try_recv().is_ok());
        assert_eq!(store.inner.lock().unwrap().subscribers.len(), 1);
    }
}
