//! Deep copies of state trees.

use serde_json::{Map, Value};
use tabsync_core::StateTree;

/// Copy `node` recursively: arrays element by element, mappings key by key.
/// Scalars and `null` are returned as they are.
///
/// Nothing in the result is shared with the input. Trees are acyclic by
/// construction, so the recursion always terminates.
pub fn clone_tree(node: &StateTree) -> StateTree {
    match node {
        Value::Array(items) => Value::Array(items.iter().map(clone_tree).collect()),
        Value::Object(map) => {
            let mut copy = Map::with_capacity(map.len());
            for (key, value) in map {
                copy.insert(key.clone(), clone_tree(value));
            }
            Value::Object(copy)
        }
        scalar => scalar.clone(),
    }
}
