//! tabsync-sync: state-tree reconciliation and cross-tab synchronization
//!
//! The pure core (`clone`, `path`, `projection`, `reconcile`) decides what a
//! tab publishes and how it folds in what other tabs published. The
//! `coordinator` wires that core to a [`transport::Transport`] and a
//! [`store::HostStore`].

pub mod clone;
pub mod coordinator;
pub mod path;
pub mod projection;
pub mod reconcile;
pub mod storage;
pub mod store;
pub mod transport;

pub use coordinator::{StateHook, SyncConfig, SyncCoordinator};
pub use reconcile::reconcile;
pub use storage::{DirStorage, MemoryStorage, Storage, StorageEvent};
pub use store::{HostStore, MemoryStore};
pub use transport::{Tab, Transport};
