//! Publish-side projections of a state tree.
//!
//! `project` keeps only the listed paths; `exclude` keeps everything except
//! them. Both return fresh trees and never touch their input.

use serde_json::{Map, Value};
use tabsync_core::{StateTree, TreePath};

use crate::clone::clone_tree;
use crate::path;

/// Build a tree holding only the nodes at `paths`.
///
/// Paths are applied in order, so where they overlap a later path overwrites
/// what an earlier one wrote. Absent paths produce no entry.
pub fn project(tree: &StateTree, paths: &[TreePath]) -> StateTree {
    let mut result = Value::Object(Map::new());
    for p in paths {
        if let Some(value) = path::get(tree, p) {
            path::set(&mut result, p, clone_tree(value));
        }
    }
    result
}

/// Build a deep copy of `tree` with the nodes at `paths` removed.
pub fn exclude(tree: &StateTree, paths: &[TreePath]) -> StateTree {
    let mut result = clone_tree(tree);
    for p in paths {
        path::remove(&mut result, p);
    }
    result
}
