//! Sync coordinator: wires reconciliation and projection to a transport and
//! a host store.
//!
//! Two independent triggers:
//!   - **inbound**: a tree published by another tab (and the initial stored
//!     tree) → `on_before_replace` → `reconcile` → `HostStore::replace_state`
//!   - **outbound**: a local mutation → `project`/`exclude` →
//!     `on_before_save` → `Transport::save_state`
//!
//! Each trigger is handled to completion before the next one is looked at.
//! Inbound merging only ever uses `states_paths`; `states_remove` shapes
//! what is published and nothing else.

use std::fmt;
use std::sync::Arc;

use tabsync_core::config::SyncOptions;
use tabsync_core::{StateTree, TabsyncError, TabsyncResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::projection::{exclude, project};
use crate::reconcile::reconcile;
use crate::store::HostStore;
use crate::transport::Transport;

/// Adjusts a tree on its way in or out; `None` drops it.
pub type StateHook = Arc<dyn Fn(StateTree) -> Option<StateTree> + Send + Sync>;

fn identity(state: StateTree) -> Option<StateTree> {
    Some(state)
}

/// Sync options plus the inbound and outbound hooks. Both hooks default to
/// the identity.
#[derive(Clone)]
pub struct SyncConfig {
    options: SyncOptions,
    on_before_replace: StateHook,
    on_before_save: StateHook,
}

impl SyncConfig {
    pub fn new(options: SyncOptions) -> Self {
        SyncConfig {
            options,
            on_before_replace: Arc::new(identity),
            on_before_save: Arc::new(identity),
        }
    }

    /// Hook run on every incoming tree before it is merged.
    pub fn on_before_replace<F>(mut self, hook: F) -> Self
    where
        F: Fn(StateTree) -> Option<StateTree> + Send + Sync + 'static,
    {
        self.on_before_replace = Arc::new(hook);
        self
    }

    /// Hook run on every outgoing tree before it is saved.
    pub fn on_before_save<F>(mut self, hook: F) -> Self
    where
        F: Fn(StateTree) -> Option<StateTree> + Send + Sync + 'static,
    {
        self.on_before_save = Arc::new(hook);
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(SyncOptions::default())
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Keeps one host store in sync with the other tabs on a transport.
///
/// Built with [`SyncCoordinator::new`], which fails if the transport is
/// unusable. Drive it with [`SyncCoordinator::run`], or call the inbound and
/// outbound handlers directly.
pub struct SyncCoordinator<T> {
    config: SyncConfig,
    transport: T,
}

impl<T: Transport> SyncCoordinator<T> {
    /// Fails with [`TabsyncError::StorageUnavailable`] when the transport
    /// cannot be used.
    pub fn new(config: SyncConfig, transport: T) -> TabsyncResult<Self> {
        if !transport.is_available() {
            return Err(TabsyncError::StorageUnavailable);
        }
        info!(
            key = %config.options.key,
            states_paths = config.options.states_paths.len(),
            states_remove = config.options.states_remove.len(),
            "sync coordinator ready"
        );
        Ok(SyncCoordinator { config, transport })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn key(&self) -> &str {
        &self.config.options.key
    }

    /// Merge a tree received from another tab into `store`.
    ///
    /// Returns `false` when `on_before_replace` dropped the tree.
    pub fn replace_state<S: HostStore + ?Sized>(&self, store: &S, incoming: StateTree) -> bool {
        let Some(adjusted) = (self.config.on_before_replace)(incoming) else {
            debug!(key = self.key(), "incoming state dropped by on_before_replace");
            return false;
        };

        let next = reconcile(&store.state(), &adjusted, &self.config.options.states_paths);
        store.replace_state(next);
        debug!(key = self.key(), "state replaced from remote");
        true
    }

    /// The tree a local state would be published as, or `None` if
    /// `on_before_save` drops it.
    pub fn state_to_save(&self, state: &StateTree) -> Option<StateTree> {
        let options = &self.config.options;
        let to_save = if !options.states_paths.is_empty() {
            project(state, &options.states_paths)
        } else if !options.states_remove.is_empty() {
            exclude(state, &options.states_remove)
        } else {
            state.clone()
        };
        (self.config.on_before_save)(to_save)
    }

    /// Publish the state after a local mutation. Returns whether anything was
    /// saved.
    pub fn save_state(&self, state: &StateTree) -> TabsyncResult<bool> {
        let Some(to_save) = self.state_to_save(state) else {
            debug!(key = self.key(), "outgoing state dropped by on_before_save");
            return Ok(false);
        };
        self.transport.save_state(self.key(), &to_save)?;
        debug!(key = self.key(), "state saved");
        Ok(true)
    }

    /// Merge whatever is already stored under the key into `store`.
    pub fn load_initial<S: HostStore + ?Sized>(&self, store: &S) -> TabsyncResult<bool> {
        match self.transport.fetch_state(self.key())? {
            Some(state) => Ok(self.replace_state(store, state)),
            None => Ok(false),
        }
    }

    /// Keep `store` in sync until `cancel` fires or both event sources close.
    ///
    /// Loads the stored state first, then handles remote updates and local
    /// mutations one at a time. A failed save is logged and the loop goes on.
    pub async fn run<S: HostStore + ?Sized>(
        &self,
        store: &S,
        cancel: CancellationToken,
    ) -> TabsyncResult<()> {
        // Subscribe before loading so nothing published in between is missed
        let mut updates = self.transport.subscribe(self.key())?;
        let mut mutations = store.subscribe();
        self.load_initial(store)?;

        info!(key = self.key(), "sync loop started");
        let mut updates_open = true;
        let mut mutations_open = true;

        while updates_open || mutations_open {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(key = self.key(), "sync loop cancelled");
                    break;
                }
                update = updates.recv(), if updates_open => match update {
                    Some(state) => {
                        self.replace_state(store, state);
                    }
                    None => updates_open = false,
                },
                event = mutations.recv(), if mutations_open => match event {
                    Some(event) => {
                        debug!(key = self.key(), mutation = %event.mutation.kind, "local mutation");
                        if let Err(e) = self.save_state(&event.state) {
                            warn!(key = self.key(), error = %e, "saving state failed");
                        }
                    }
                    None => mutations_open = false,
                },
            }
        }

        Ok(())
    }
}
