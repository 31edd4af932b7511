//! Dot-path access into state trees.
//!
//! A segment addresses a key when it meets a mapping and an index when it
//! meets an array. Lookups never fail: a missing step simply means the node
//! is absent.

use serde_json::{Map, Value};
use tabsync_core::{StateTree, TreePath};
use tracing::warn;

/// Most `null`s a single write past the end of an array may pad with.
const MAX_ARRAY_GAP: usize = 64;

/// Read the node at `path`, or `None` when any step is missing.
///
/// A present `null` is returned as `Some(&Value::Null)`; only missing nodes
/// are absent.
pub fn get<'a>(tree: &'a StateTree, path: &TreePath) -> Option<&'a StateTree> {
    path.segments()
        .iter()
        .try_fold(tree, |node, segment| child(node, segment))
}

/// Write `value` at `path`, creating intermediate mappings as needed.
///
/// Intermediate nodes that are neither a mapping nor an array are replaced by
/// an empty mapping. An array only accepts index segments; writing past its
/// end pads it with `null`. An array met with a non-index segment is replaced
/// by a mapping. An index more than `MAX_ARRAY_GAP` past the end turns the
/// array into a mapping keyed by index strings, keeping its elements.
pub fn set(tree: &mut StateTree, path: &TreePath, value: StateTree) {
    let Some((last, parents)) = path.segments().split_last() else {
        return;
    };

    let mut node = tree;
    for segment in parents {
        node = child_or_insert(node, segment);
    }

    if let Some(index) = reachable_index(node, last) {
        if let Value::Array(items) = node {
            pad(items, index);
            items[index] = value;
            return;
        }
    }
    as_object(node).insert(last.clone(), value);
}

/// Remove the node at `path`, returning it if it was present.
///
/// Array elements are cleared to `null` rather than spliced out, so the
/// indices of later elements keep addressing the same nodes.
pub fn remove(tree: &mut StateTree, path: &TreePath) -> Option<StateTree> {
    let (last, parents) = path.segments().split_last()?;

    let mut node = tree;
    for segment in parents {
        node = child_mut(node, segment)?;
    }

    match node {
        Value::Object(map) => map.remove(last.as_str()),
        Value::Array(items) => {
            let slot = items.get_mut(parse_index(last)?)?;
            Some(std::mem::take(slot))
        }
        _ => None,
    }
}

/// Canonical decimal indices only: `"+1"` and `"01"` are keys.
fn parse_index(segment: &str) -> Option<usize> {
    let canonical = !segment.is_empty()
        && segment.bytes().all(|b| b.is_ascii_digit())
        && (segment == "0" || !segment.starts_with('0'));
    if canonical {
        segment.parse().ok()
    } else {
        None
    }
}

/// The index `segment` addresses in the array at `node`, if any.
///
/// An index too far past the end converts the array to a mapping keyed by
/// index strings and yields `None`.
fn reachable_index(node: &mut Value, segment: &str) -> Option<usize> {
    let Value::Array(items) = &mut *node else {
        return None;
    };
    let index = parse_index(segment)?;
    if index <= items.len().saturating_add(MAX_ARRAY_GAP) {
        return Some(index);
    }

    warn!(
        index,
        len = items.len(),
        "index far past the end of an array, converting it to a mapping"
    );
    let map = std::mem::take(items)
        .into_iter()
        .enumerate()
        .map(|(i, item)| (i.to_string(), item))
        .collect();
    *node = Value::Object(map);
    None
}

fn child<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => items.get(parse_index(segment)?),
        _ => None,
    }
}

fn child_mut<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match node {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => items.get_mut(parse_index(segment)?),
        _ => None,
    }
}

fn child_or_insert<'a>(node: &'a mut Value, segment: &str) -> &'a mut Value {
    let index = reachable_index(node, segment);

    let slot = match (node, index) {
        (Value::Array(items), Some(index)) => {
            pad(items, index);
            &mut items[index]
        }
        (node, _) => as_object(node)
            .entry(segment.to_string())
            .or_insert(Value::Null),
    };

    if !slot.is_object() && !slot.is_array() {
        *slot = Value::Object(Map::new());
    }
    slot
}

fn as_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced by a mapping"),
    }
}

fn pad(items: &mut Vec<Value>, index: usize) {
    if items.len() <= index {
        items.resize(index + 1, Value::Null);
    }
}
