//! Folding an incoming tree from another tab into the local tree.

use tabsync_core::{StateTree, TreePath};

use crate::clone::clone_tree;
use crate::path;

/// Combine the local tree `old` with `incoming` along `include_paths`.
///
/// With no paths the incoming tree replaces the local one outright. Otherwise
/// the result starts as a deep copy of `old` and, for each path in order, the
/// node at that path is replaced wholesale by the incoming node, or removed
/// when the incoming tree does not have it. Nodes of `old` not reachable
/// through any path are carried over unchanged.
pub fn reconcile(old: &StateTree, incoming: &StateTree, include_paths: &[TreePath]) -> StateTree {
    if include_paths.is_empty() {
        return incoming.clone();
    }

    let mut merged = clone_tree(old);
    for p in include_paths {
        match path::get(incoming, p) {
            Some(value) => path::set(&mut merged, p, clone_tree(value)),
            None => {
                path::remove(&mut merged, p);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(raw: &[&str]) -> Vec<TreePath> {
        TreePath::parse_all(raw).unwrap()
    }

    #[test]
    fn test_no_paths_replaces_whole_tree() {
        let old = json!({"a": 1, "keep": "me"});
        let incoming = json!({"b": 2});
        assert_eq!(reconcile(&old, &incoming, &[]), json!({"b": 2}));
    }

    #[test]
    fn test_replaces_only_listed_leaf() {
        let old = json!({"a": 1, "b": {"c": 2, "d": 3}});
        let incoming = json!({"b": {"c": 99}});
        assert_eq!(
            reconcile(&old, &incoming, &paths(&["b.c"])),
            json!({"a": 1, "b": {"c": 99, "d": 3}})
        );
    }

    #[test]
    fn test_absent_incoming_path_deletes_local_node() {
        let old = json!({"a": 1, "b": 2});
        assert_eq!(reconcile(&old, &json!({}), &paths(&["a"])), json!({"b": 2}));
    }

    #[test]
    fn test_nested_delete_keeps_siblings() {
        let old = json!({"a": {"b": 1, "c": 2}, "z": [1, 2]});
        let incoming = json!({"a": {"c": 100}});
        assert_eq!(
            reconcile(&old, &incoming, &paths(&["a.b"])),
            json!({"a": {"c": 2}, "z": [1, 2]})
        );
    }

    #[test]
    fn test_subtree_replaced_not_merged() {
        let old = json!({"cart": {"items": [1, 2, 3], "coupon": "X"}});
        let incoming = json!({"cart": {"items": [4]}});
        assert_eq!(
            reconcile(&old, &incoming, &paths(&["cart"])),
            json!({"cart": {"items": [4]}})
        );
    }

    #[test]
    fn test_incoming_null_is_written() {
        let old = json!({"a": 1});
        let incoming = json!({"a": null});
        assert_eq!(reconcile(&old, &incoming, &paths(&["a"])), json!({"a": null}));
    }

    #[test]
    fn test_creates_missing_local_structure() {
        let old = json!({"other": true});
        let incoming = json!({"user": {"profile": {"name": "ana"}}});
        assert_eq!(
            reconcile(&old, &incoming, &paths(&["user.profile.name"])),
            json!({"other": true, "user": {"profile": {"name": "ana"}}})
        );
    }

    #[test]
    fn test_old_tree_untouched() {
        let old = json!({"a": {"b": 1}});
        let _ = reconcile(&old, &json!({"a": {"b": 2}}), &paths(&["a.b"]));
        assert_eq!(old, json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_huge_remote_index_on_local_array() {
        let old = json!({"list": [1, 2]});
        let incoming = json!({"list": {"4000000000000000": 9}});
        let include = paths(&["list.4000000000000000"]);

        let merged = reconcile(&old, &incoming, &include);
        assert_eq!(
            merged,
            json!({"list": {"0": 1, "1": 2, "4000000000000000": 9}})
        );
        assert_eq!(reconcile(&merged, &incoming, &include), merged);
    }
}
