//! tabsync-core: shared state-tree types, config schema, and error types

pub mod config;
pub mod error;
pub mod types;

pub use error::{TabsyncError, TabsyncResult};
pub use types::{Mutation, MutationEvent, StateTree, TreePath};
