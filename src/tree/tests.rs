//! Tests for the nested-set interval tree store

use super::*;
use crate::error::StoreError;
use crate::graph::HierarchyIndex;
use crate::storage::{Delta, MemoryStore, RowStore, SledStore};

type MemTree = IntervalTreeStore<String, MemoryStore<IntervalTreeNode<String>>>;

fn new_tree() -> MemTree {
    IntervalTreeStore::new(MemoryStore::new(), "organization")
}

fn k(s: &str) -> String {
    s.to_string()
}

fn keys(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// org1 -> {org2 -> {user1, user2}, org3 -> {user3, user4}, org4 -> {user5, user6}}
fn add_orgs<S: RowStore<IntervalTreeNode<String>>>(tree: &IntervalTreeStore<String, S>) {
    for (parent, child) in [
        ("org1", "org2"),
        ("org1", "org3"),
        ("org1", "org4"),
        ("org2", "user1"),
        ("org2", "user2"),
        ("org3", "user3"),
        ("org3", "user4"),
        ("org4", "user5"),
        ("org4", "user6"),
    ] {
        tree.add_child(&k(parent), &k(child)).unwrap();
    }
}

fn interval<S: RowStore<IntervalTreeNode<String>>>(tree: &IntervalTreeStore<String, S>, key: &str) -> (i64, i64) {
    let node = tree.get_node(&k(key)).unwrap().unwrap();
    (node.low, node.high)
}

// ============================================================================
// Add / remove
// ============================================================================

mod add_remove_tests {
    use super::*;

    #[test]
    fn test_add_remove_child() {
        let tree = new_tree();
        add_orgs(&tree);

        assert_eq!(
            tree.get_sub_tree(&k("org1")).unwrap(),
            keys(&["org2", "user1", "user2", "org3", "user3", "user4", "org4", "user5", "user6"])
        );
        assert_eq!(tree.get_sub_tree(&k("org2")).unwrap(), keys(&["user1", "user2"]));
        assert!(tree.get_sub_tree(&k("user1")).unwrap().is_empty());

        tree.remove_child(&k("org2"), &k("user1"), true).unwrap();
        assert_eq!(tree.get_sub_tree(&k("org2")).unwrap(), keys(&["user2"]));
        assert!(tree.get_node(&k("user1")).unwrap().is_none());

        tree.remove_child(&k("org1"), &k("org3"), true).unwrap();
        assert_eq!(
            tree.get_sub_tree(&k("org1")).unwrap(),
            keys(&["org2", "user2", "org4", "user5", "user6"])
        );
        assert_eq!(tree.get_sub_tree(&k("org3")).unwrap(), keys(&["user3", "user4"]));

        tree.remove_child(&k("org1"), &k("org2"), true).unwrap();
        tree.remove_child(&k("org2"), &k("user2"), true).unwrap();
        assert!(tree.get_sub_tree(&k("org2")).unwrap().is_empty());
        assert_eq!(tree.get_sub_tree(&k("org1")).unwrap(), keys(&["org4", "user5", "user6"]));

        // org2 emptied out as a root and went away with user2
        assert!(tree.get_node(&k("org2")).unwrap().is_none());

        tree.verify_tree(&k("org1")).unwrap();
        tree.verify_tree(&k("org3")).unwrap();
    }

    #[test]
    fn test_intervals_after_build() {
        let tree = new_tree();
        add_orgs(&tree);

        let expected = [
            ("org1", (1, 20)),
            ("org2", (2, 7)),
            ("user1", (3, 4)),
            ("user2", (5, 6)),
            ("org3", (8, 13)),
            ("user3", (9, 10)),
            ("user4", (11, 12)),
            ("org4", (14, 19)),
            ("user5", (15, 16)),
            ("user6", (17, 18)),
        ];
        for (key, bounds) in expected {
            assert_eq!(interval(&tree, key), bounds, "interval of {}", key);
            assert_eq!(tree.get_node(&k(key)).unwrap().unwrap().tree_id, "org1");
        }
        tree.verify_tree(&k("org1")).unwrap();
    }

    #[test]
    fn test_detached_subtree_is_renumbered_from_one() {
        let tree = new_tree();
        add_orgs(&tree);

        tree.remove_child(&k("org1"), &k("org3"), false).unwrap();
        assert_eq!(interval(&tree, "org3"), (1, 6));
        assert_eq!(interval(&tree, "user3"), (2, 3));
        assert_eq!(interval(&tree, "user4"), (4, 5));
        assert_eq!(tree.get_node(&k("user4")).unwrap().unwrap().tree_id, "org3");
        // Following siblings closed the gap
        assert_eq!(interval(&tree, "org4"), (8, 13));
        assert_eq!(interval(&tree, "org1"), (1, 14));
    }

    #[test]
    fn test_add_then_remove_restores_intervals() {
        let tree = new_tree();
        add_orgs(&tree);
        tree.add_child(&k("extra"), &k("leaf")).unwrap();
        tree.remove_child(&k("extra"), &k("leaf"), false).unwrap();

        let names = ["org1", "org2", "user1", "user2", "org3", "user3", "user4", "org4", "user5", "user6"];
        let before: Vec<(i64, i64)> = names.iter().map(|n| interval(&tree, n)).collect();

        tree.add_child(&k("org3"), &k("leaf")).unwrap();
        assert_eq!(interval(&tree, "leaf"), (13, 14));
        assert_eq!(interval(&tree, "org3"), (8, 15));

        tree.remove_child(&k("org3"), &k("leaf"), true).unwrap();
        let after: Vec<(i64, i64)> = names.iter().map(|n| interval(&tree, n)).collect();
        assert_eq!(after, before);
        assert!(tree.get_node(&k("leaf")).unwrap().is_none());
    }

    #[test]
    fn test_removing_only_child_drops_parent_root() {
        let tree = new_tree();
        tree.add_child(&k("p"), &k("c")).unwrap();
        tree.remove_child(&k("p"), &k("c"), true).unwrap();

        assert!(tree.get_node(&k("p")).unwrap().is_none());
        assert!(tree.get_node(&k("c")).unwrap().is_none());
        assert!(tree.backend().is_empty().unwrap());
    }

    #[test]
    fn test_add_children_in_order() {
        let tree = new_tree();
        tree.add_children(&k("root"), &keys(&["a", "b", "c"])).unwrap();
        assert_eq!(tree.get_children(&k("root")).unwrap(), keys(&["a", "b", "c"]));
        tree.verify_tree(&k("root")).unwrap();
    }

    #[test]
    fn test_attach_existing_subtree() {
        let tree = new_tree();
        tree.add_child(&k("a"), &k("b")).unwrap();
        tree.add_child(&k("x"), &k("y")).unwrap();
        tree.add_child(&k("x"), &k("z")).unwrap();

        // x's whole tree moves under a
        tree.add_child(&k("a"), &k("x")).unwrap();
        assert_eq!(tree.get_sub_tree(&k("a")).unwrap(), keys(&["b", "x", "y", "z"]));
        assert_eq!(tree.get_roots().unwrap(), keys(&["a"]));
        tree.verify_tree(&k("a")).unwrap();
    }
}

// ============================================================================
// Rejections
// ============================================================================

mod rejection_tests {
    use super::*;

    fn snapshot(tree: &MemTree) -> Vec<IntervalTreeNode<String>> {
        tree.backend().rows().unwrap()
    }

    #[test]
    fn test_cycles_rejected_without_writes() {
        let tree = new_tree();
        add_orgs(&tree);
        let before = snapshot(&tree);

        let err = tree.add_child(&k("org1"), &k("org1")).unwrap_err();
        assert!(matches!(err, StoreError::CycleDetected { .. }));

        let err = tree.add_child(&k("user1"), &k("org1")).unwrap_err();
        assert!(matches!(err, StoreError::CycleDetected { .. }));

        let err = tree.move_node(&k("user3"), &k("org3")).unwrap_err();
        assert!(matches!(err, StoreError::CycleDetected { .. }));

        assert_eq!(snapshot(&tree), before);
    }

    #[test]
    fn test_second_parent_rejected() {
        let tree = new_tree();
        add_orgs(&tree);
        let before = snapshot(&tree);

        match tree.add_child(&k("org3"), &k("user1")).unwrap_err() {
            StoreError::AlreadyExists { start, end } => {
                assert_eq!(start, "org2");
                assert_eq!(end, "user1");
            }
            other => panic!("expected AlreadyExists, got {:?}", other),
        }
        assert_eq!(snapshot(&tree), before);
    }

    #[test]
    fn test_remove_child_requires_direct_parent() {
        let tree = new_tree();
        add_orgs(&tree);

        assert!(matches!(
            tree.remove_child(&k("org1"), &k("user1"), true),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            tree.remove_child(&k("org3"), &k("user1"), true),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            tree.remove_child(&k("org1"), &k("ghost"), true),
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(tree.get_sub_tree(&k("org2")).unwrap(), keys(&["user1", "user2"]));
    }

    #[test]
    fn test_invalid_key_rejected() {
        let tree = new_tree();
        assert!(matches!(tree.add_child(&k(""), &k("a")), Err(StoreError::InvalidArgument(_))));
        assert!(matches!(tree.delete(&k(" ")), Err(StoreError::InvalidArgument(_))));
        assert!(tree.backend().is_empty().unwrap());
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let tree = new_tree();
        tree.add_child(&k("a"), &k("b")).unwrap();
        let before = snapshot(&tree);

        // c is fine, a under b is a cycle
        let err = tree.add_children(&k("b"), &keys(&["c", "a"])).unwrap_err();
        assert!(matches!(err, StoreError::CycleDetected { .. }));
        assert_eq!(snapshot(&tree), before);
    }
}

// ============================================================================
// Move
// ============================================================================

mod move_tests {
    use super::*;

    #[test]
    fn test_move_node() {
        let tree = new_tree();
        add_orgs(&tree);

        tree.move_node(&k("org2"), &k("org3")).unwrap();
        assert_eq!(
            tree.get_sub_tree(&k("org2")).unwrap(),
            keys(&["user1", "user2", "org3", "user3", "user4"])
        );

        tree.move_node(&k("org4"), &k("org2")).unwrap();
        assert_eq!(
            tree.get_sub_tree(&k("org1")).unwrap(),
            keys(&["org4", "user5", "user6", "org2", "user1", "user2", "org3", "user3", "user4"])
        );

        tree.move_node(&k("org2"), &k("user3")).unwrap();
        assert_eq!(
            tree.get_sub_tree(&k("org2")).unwrap(),
            keys(&["user1", "user2", "org3", "user4", "user3"])
        );

        tree.verify_tree(&k("org1")).unwrap();
    }

    #[test]
    fn test_move_keeps_subtree_contiguous() {
        let tree = new_tree();
        add_orgs(&tree);

        tree.move_node(&k("org2"), &k("org3")).unwrap();
        let org3 = tree.get_node(&k("org3")).unwrap().unwrap();
        for key in ["user3", "user4"] {
            let node = tree.get_node(&k(key)).unwrap().unwrap();
            assert!(org3.contains(&node), "{} escaped org3", key);
        }
        assert_eq!(tree.get_parent(&k("org3")).unwrap(), Some(k("org2")));
        assert_eq!(tree.get_children(&k("org1")).unwrap(), keys(&["org2", "org4"]));
    }

    #[test]
    fn test_move_to_absent_parent() {
        let tree = new_tree();
        add_orgs(&tree);

        tree.move_node(&k("org9"), &k("user1")).unwrap();
        assert_eq!(tree.get_sub_tree(&k("org9")).unwrap(), keys(&["user1"]));
        assert_eq!(tree.get_sub_tree(&k("org2")).unwrap(), keys(&["user2"]));
        assert_eq!(tree.get_roots().unwrap(), keys(&["org1", "org9"]));
        tree.verify_tree(&k("org1")).unwrap();
        tree.verify_tree(&k("org9")).unwrap();
    }

    #[test]
    fn test_move_root_under_other_tree() {
        let tree = new_tree();
        tree.add_child(&k("a"), &k("b")).unwrap();
        tree.add_child(&k("x"), &k("y")).unwrap();

        tree.move_node(&k("b"), &k("x")).unwrap();
        assert_eq!(tree.get_ancestors(&k("y")).unwrap(), keys(&["x", "b", "a"]));
    }
}

// ============================================================================
// Delete
// ============================================================================

mod delete_tests {
    use super::*;

    #[test]
    fn test_delete_node() {
        let tree = new_tree();
        add_orgs(&tree);

        tree.delete(&k("org2")).unwrap();
        assert!(tree.get_sub_tree(&k("org2")).unwrap().is_empty());
        assert_eq!(
            tree.get_sub_tree(&k("org1")).unwrap(),
            keys(&["org3", "user3", "user4", "org4", "user5", "user6"])
        );

        tree.delete(&k("user3")).unwrap();
        assert_eq!(tree.get_sub_tree(&k("org3")).unwrap(), keys(&["user4"]));

        tree.delete(&k("org1")).unwrap();
        assert_eq!(tree.get_sub_tree(&k("org4")).unwrap(), keys(&["user5", "user6"]));
        assert!(tree.get_sub_tree(&k("org1")).unwrap().is_empty());
        assert!(tree.get_node(&k("org1")).unwrap().is_none());
    }

    #[test]
    fn test_delete_promotes_inner_children() {
        let tree = new_tree();
        add_orgs(&tree);
        tree.add_child(&k("org1"), &k("leaf")).unwrap();

        tree.delete(&k("org1")).unwrap();

        for org in ["org2", "org3", "org4"] {
            assert_eq!(tree.get_parent(&k(org)).unwrap(), None);
            tree.verify_tree(&k(org)).unwrap();
        }
        assert!(tree.get_node(&k("leaf")).unwrap().is_none());
        assert_eq!(tree.get_roots().unwrap(), keys(&["org2", "org3", "org4"]));
        assert_eq!(tree.get_sub_tree(&k("org3")).unwrap(), keys(&["user3", "user4"]));
    }

    #[test]
    fn test_delete_absent_and_lone_root() {
        let tree = new_tree();
        tree.delete(&k("ghost")).unwrap();

        tree.add_child(&k("a"), &k("b")).unwrap();
        tree.remove_child(&k("a"), &k("b"), false).unwrap();
        // b survives detached as a single-node tree
        assert_eq!(interval(&tree, "b"), (1, 2));

        tree.delete(&k("b")).unwrap();
        assert!(tree.backend().is_empty().unwrap());
    }
}

// ============================================================================
// Queries, diagnostics, backends
// ============================================================================

mod query_tests {
    use super::*;

    #[test]
    fn test_children_parent_ancestors() {
        let tree = new_tree();
        add_orgs(&tree);

        assert_eq!(tree.get_children(&k("org1")).unwrap(), keys(&["org2", "org3", "org4"]));
        assert_eq!(tree.get_children(&k("org4")).unwrap(), keys(&["user5", "user6"]));
        assert!(tree.get_children(&k("user5")).unwrap().is_empty());

        assert_eq!(tree.get_parent(&k("user3")).unwrap(), Some(k("org3")));
        assert_eq!(tree.get_parent(&k("org1")).unwrap(), None);
        assert_eq!(tree.get_parent(&k("ghost")).unwrap(), None);

        assert_eq!(tree.get_ancestors(&k("user3")).unwrap(), keys(&["org3", "org1"]));
        assert!(tree.get_ancestors(&k("org1")).unwrap().is_empty());
    }

    #[test]
    fn test_tree_types_are_isolated() {
        use std::sync::Arc;

        let backend = Arc::new(MemoryStore::<IntervalTreeNode<String>>::new());
        let orgs = IntervalTreeStore::new(Arc::clone(&backend), "organization");
        let sites = IntervalTreeStore::new(Arc::clone(&backend), "site");

        orgs.add_child(&k("a"), &k("b")).unwrap();
        sites.add_child(&k("b"), &k("a")).unwrap();

        assert_eq!(orgs.get_sub_tree(&k("a")).unwrap(), keys(&["b"]));
        assert_eq!(sites.get_sub_tree(&k("b")).unwrap(), keys(&["a"]));
        assert_eq!(backend.len().unwrap(), 4);
    }

    #[test]
    fn test_numeric_node_keys() {
        let tree: IntervalTreeStore<u64, _> = IntervalTreeStore::new(MemoryStore::new(), "ids");
        tree.add_children(&1, &[2, 3]).unwrap();
        tree.add_child(&2, &4).unwrap();
        assert_eq!(tree.get_sub_tree(&1).unwrap(), vec![2, 4, 3]);
        assert_eq!(tree.get_parent(&4).unwrap(), Some(2));
    }

    #[test]
    fn test_verify_detects_overlap() {
        let tree = new_tree();
        add_orgs(&tree);

        let mut user1 = tree.get_node(&k("user1")).unwrap().unwrap();
        user1.high = 9;
        tree.backend().apply(&[Delta::Put(user1)]).unwrap();

        let err = tree.verify_tree(&k("org1")).unwrap_err();
        assert!(matches!(err, StoreError::ConsistencyViolation(_)));
    }

    #[test]
    fn test_hierarchy_index_seam() {
        let tree = new_tree();
        tree.link(&k("root"), &k("mid")).unwrap();
        tree.link(&k("mid"), &k("leaf")).unwrap();

        assert_eq!(tree.descendants(&k("root")).unwrap(), keys(&["mid", "leaf"]));
        assert_eq!(tree.ancestors(&k("leaf")).unwrap(), keys(&["mid", "root"]));

        // leaf is dropped rather than left behind as a lone root
        tree.unlink(&k("mid"), &k("leaf")).unwrap();
        assert!(tree.get_node(&k("leaf")).unwrap().is_none());
        assert_eq!(tree.get_roots().unwrap(), keys(&["root"]));
        assert_eq!(tree.descendants(&k("root")).unwrap(), keys(&["mid"]));

        tree.link(&k("mid"), &k("leaf")).unwrap();
        tree.unlink(&k("root"), &k("mid")).unwrap();
        assert_eq!(tree.get_roots().unwrap(), keys(&["mid"]));
        assert!(tree.get_node(&k("root")).unwrap().is_none());

        tree.remove_vertex(&k("mid")).unwrap();
        assert!(tree.backend().is_empty().unwrap());
    }

    #[test]
    fn test_sled_backed_scenario_persists() {
        use tempfile::tempdir;

        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("tree");

        {
            let db = sled::open(&path).unwrap();
            let tree = IntervalTreeStore::new(SledStore::<IntervalTreeNode<String>>::open(&db).unwrap(), "organization");
            add_orgs(&tree);
            tree.move_node(&k("org2"), &k("org3")).unwrap();
            db.flush().unwrap();
        }

        {
            let db = sled::open(&path).unwrap();
            let tree = IntervalTreeStore::new(SledStore::<IntervalTreeNode<String>>::open(&db).unwrap(), "organization");
            assert_eq!(
                tree.get_sub_tree(&k("org1")).unwrap(),
                keys(&["org2", "user1", "user2", "org3", "user3", "user4", "org4", "user5", "user6"])
            );
            assert_eq!(tree.get_parent(&k("org3")).unwrap(), Some(k("org2")));
            tree.verify_tree(&k("org1")).unwrap();

            tree.delete(&k("org1")).unwrap();
            assert_eq!(tree.get_roots().unwrap(), keys(&["org2", "org4"]));
        }
    }
}
