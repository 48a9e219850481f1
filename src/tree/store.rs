//! IntervalTreeStore: nested-set renumbering on attach, detach, move and delete

use std::marker::PhantomData;
use std::sync::Mutex;

use super::{field, IntervalTreeNode};
use crate::error::{Result, StoreError};
use crate::graph::HierarchyIndex;
use crate::storage::{Query, RowId, RowStore, Transaction, VertexKey};

type Tx<'a, K, S> = Transaction<'a, IntervalTreeNode<K>, S>;
type Node<K> = IntervalTreeNode<K>;

/// Interval tree forest for one `tree_type`
///
/// Every public mutation is one [`Transaction`]; rejections are raised before
/// anything is staged. Writers through the same store are serialized.
pub struct IntervalTreeStore<K, S> {
    store: S,
    tree_type: String,
    write_lock: Mutex<()>,
    _marker: PhantomData<fn() -> K>,
}

fn check_key<K: VertexKey>(key: &K, name: &str) -> Result<()> {
    if !key.is_valid() {
        return Err(StoreError::InvalidArgument(format!(
            "Argument [{}] is not a valid node: {:?}",
            name, key
        )));
    }
    Ok(())
}

fn not_found<K: VertexKey>(key: &K) -> StoreError {
    StoreError::NotFound(format!("tree node {}", key))
}

fn row_ids<K>(nodes: &[Node<K>]) -> Vec<RowId> {
    nodes.iter().map(|n| n.id).collect()
}

impl<K: VertexKey, S: RowStore<IntervalTreeNode<K>>> IntervalTreeStore<K, S> {
    pub fn new(store: S, tree_type: impl Into<String>) -> Self {
        Self {
            store,
            tree_type: tree_type.into(),
            write_lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn tree_type(&self) -> &str {
        &self.tree_type
    }

    pub fn backend(&self) -> &S {
        &self.store
    }

    fn forest(&self) -> Query {
        Query::new().eq(field::TREE_TYPE, self.tree_type.as_str())
    }

    fn tree(&self, tree_id: &K) -> Query {
        self.forest().eq(field::TREE_ID, tree_id.to_value())
    }

    fn write<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Tx<'_, K, S>) -> Result<T>,
    {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned("tree writer"))?;
        let mut tx = Transaction::new(&self.store);
        let result = op(&mut tx)?;
        tx.commit()?;
        Ok(result)
    }

    fn read(&self) -> Tx<'_, K, S> {
        Transaction::new(&self.store)
    }

    // === MUTATION ===

    /// Attach `child` (with its whole subtree) as the last child of `parent`.
    /// Absent nodes are created as single-node roots first.
    pub fn add_child(&self, parent: &K, child: &K) -> Result<()> {
        check_key(parent, "parentNodeId")?;
        check_key(child, "childNodeId")?;
        self.write(|tx| self.add_child_in(tx, parent, child))
    }

    /// Attach several children in order, in one transaction
    pub fn add_children(&self, parent: &K, children: &[K]) -> Result<()> {
        check_key(parent, "parentNodeId")?;
        for child in children {
            check_key(child, "childNodeId")?;
        }
        self.write(|tx| {
            for child in children {
                self.add_child_in(tx, parent, child)?;
            }
            Ok(())
        })
    }

    /// Detach `child` from `parent`. A leaf child is deleted when
    /// `delete_if_leaf` is set; otherwise the child's subtree becomes a tree
    /// of its own. A parent left as a childless root is deleted.
    pub fn remove_child(&self, parent: &K, child: &K, delete_if_leaf: bool) -> Result<()> {
        check_key(parent, "parentNodeId")?;
        check_key(child, "childNodeId")?;
        self.write(|tx| {
            let parent_node = self.node_in(tx, parent)?.ok_or_else(|| not_found(parent))?;
            let child_node = self.node_in(tx, child)?.ok_or_else(|| not_found(child))?;

            match self.parent_in(tx, &child_node)? {
                Some(p) if p.id == parent_node.id => {}
                _ => {
                    tracing::warn!("remove child: {} is not a child of {}", child, parent);
                    return Err(StoreError::NotFound(format!("{} is not a child of {}", child, parent)));
                }
            }

            self.detach_in(tx, &parent_node, &child_node, delete_if_leaf)
        })
    }

    /// Re-parent `child` (and its subtree) under `new_parent`
    pub fn move_node(&self, new_parent: &K, child: &K) -> Result<()> {
        check_key(new_parent, "newParentNodeId")?;
        check_key(child, "childNodeId")?;
        self.write(|tx| {
            if new_parent == child {
                return Err(StoreError::cycle(new_parent, child));
            }

            if let Some(child_node) = self.node_in(tx, child)? {
                if let Some(parent_node) = self.node_in(tx, new_parent)? {
                    if child_node.contains(&parent_node) {
                        tracing::warn!("move {} under its descendant {} rejected", child, new_parent);
                        return Err(StoreError::cycle(new_parent, child));
                    }
                }
                if let Some(current) = self.parent_in(tx, &child_node)? {
                    tracing::debug!("move {}: detach from {}", child, current.node_key);
                    self.detach_in(tx, &current, &child_node, false)?;
                }
            }

            self.add_child_in(tx, new_parent, child)
        })
    }

    /// Delete `node`. A leaf is removed outright. For an inner node, its leaf
    /// children are deleted and its inner children become roots of their own
    /// trees; the node goes away with its last child.
    pub fn delete(&self, node: &K) -> Result<()> {
        check_key(node, "nodeId")?;
        self.write(|tx| {
            let target = match self.node_in(tx, node)? {
                Some(n) => n,
                None => {
                    tracing::debug!("delete {}: no such node", node);
                    return Ok(());
                }
            };

            if let Some(parent) = self.parent_in(tx, &target)? {
                self.detach_in(tx, &parent, &target, true)?;
            }

            let target = match tx.get(target.id)? {
                Some(n) => n,
                None => return Ok(()),
            };
            if target.is_leaf() {
                // lone root
                tx.delete(target.id);
                return Ok(());
            }

            for child in self.children_in(tx, &target)? {
                let (Some(current), Some(child)) = (tx.get(target.id)?, tx.get(child.id)?) else {
                    break;
                };
                self.detach_in(tx, &current, &child, true)?;
            }
            Ok(())
        })
    }

    // === QUERIES ===

    pub fn get_node(&self, key: &K) -> Result<Option<IntervalTreeNode<K>>> {
        check_key(key, "nodeId")?;
        self.node_in(&self.read(), key)
    }

    /// Every descendant in pre-order; empty for leaves and absent nodes
    pub fn get_sub_tree(&self, key: &K) -> Result<Vec<K>> {
        check_key(key, "nodeId")?;
        let tx = self.read();
        let Some(node) = self.node_in(&tx, key)? else {
            return Ok(Vec::new());
        };
        Ok(self.sub_tree_in(&tx, &node)?.into_iter().map(|n| n.node_key).collect())
    }

    /// Direct children in tree order
    pub fn get_children(&self, key: &K) -> Result<Vec<K>> {
        check_key(key, "nodeId")?;
        let tx = self.read();
        let Some(node) = self.node_in(&tx, key)? else {
            return Ok(Vec::new());
        };
        Ok(self.children_in(&tx, &node)?.into_iter().map(|n| n.node_key).collect())
    }

    pub fn get_parent(&self, key: &K) -> Result<Option<K>> {
        check_key(key, "nodeId")?;
        let tx = self.read();
        let Some(node) = self.node_in(&tx, key)? else {
            return Ok(None);
        };
        Ok(self.parent_in(&tx, &node)?.map(|p| p.node_key))
    }

    /// Every ancestor, nearest first
    pub fn get_ancestors(&self, key: &K) -> Result<Vec<K>> {
        check_key(key, "nodeId")?;
        let tx = self.read();
        let Some(node) = self.node_in(&tx, key)? else {
            return Ok(Vec::new());
        };
        let ancestors = tx.find(
            &self
                .tree(&node.tree_id)
                .lt(field::LOW, node.low)
                .gt(field::HIGH, node.high)
                .order_by_desc(field::LOW),
        )?;
        Ok(ancestors.into_iter().map(|n| n.node_key).collect())
    }

    /// Root keys of every tree in this forest
    pub fn get_roots(&self) -> Result<Vec<K>> {
        let roots = self.store.find(&self.forest().eq(field::LOW, 1i64))?;
        let mut keys: Vec<K> = roots.into_iter().map(|n| n.node_key).collect();
        keys.sort();
        Ok(keys)
    }

    // === DIAGNOSTICS ===

    /// Check that the tree rooted at `tree_id` numbers its intervals
    /// `1..=2n` without gaps or overlaps
    pub fn verify_tree(&self, tree_id: &K) -> Result<()> {
        check_key(tree_id, "treeId")?;
        let nodes = self.store.find(&self.tree(tree_id).order_by(field::LOW))?;
        if nodes.is_empty() {
            return Ok(());
        }

        let violation = |msg: String| -> Result<()> {
            Err(StoreError::ConsistencyViolation(format!("tree {}: {}", tree_id, msg)))
        };

        let n = nodes.len() as i64;
        let mut numbers: Vec<i64> = nodes.iter().flat_map(|node| [node.low, node.high]).collect();
        numbers.sort_unstable();
        if numbers.iter().copied().ne(1..=2 * n) {
            return violation(format!("interval bounds are not 1..={}", 2 * n));
        }

        let root = &nodes[0];
        if root.node_key != *tree_id || root.low != 1 || root.high != 2 * n {
            return violation(format!("root is {} ({}, {})", root.node_key, root.low, root.high));
        }

        // Sorted by low, each node must nest inside the innermost open interval
        let mut open: Vec<&Node<K>> = Vec::new();
        for node in &nodes {
            if node.low >= node.high || (node.high - node.low) % 2 == 0 {
                return violation(format!("malformed interval {} ({}, {})", node.node_key, node.low, node.high));
            }
            while open.last().is_some_and(|top| top.high < node.low) {
                open.pop();
            }
            if let Some(top) = open.last() {
                if node.high > top.high {
                    return violation(format!("{} overlaps {}", node.node_key, top.node_key));
                }
            }
            open.push(node);
        }
        Ok(())
    }

    // === TRANSACTION STEPS ===

    fn node_in(&self, tx: &Tx<'_, K, S>, key: &K) -> Result<Option<Node<K>>> {
        tx.find_one(&self.forest().eq(field::NODE_KEY, key.to_value()))
    }

    fn ensure_node_in(&self, tx: &mut Tx<'_, K, S>, key: &K) -> Result<Node<K>> {
        if let Some(node) = self.node_in(tx, key)? {
            return Ok(node);
        }
        let id = tx.next_id()?;
        tracing::debug!("create root node {} ({})", key, id);
        Ok(tx.create(IntervalTreeNode::root(id, key.clone(), &self.tree_type)))
    }

    fn sub_tree_in(&self, tx: &Tx<'_, K, S>, node: &Node<K>) -> Result<Vec<Node<K>>> {
        if node.is_leaf() {
            return Ok(Vec::new());
        }
        tx.find(
            &self
                .tree(&node.tree_id)
                .gt(field::LOW, node.low)
                .lt(field::HIGH, node.high)
                .order_by(field::LOW),
        )
    }

    fn children_in(&self, tx: &Tx<'_, K, S>, node: &Node<K>) -> Result<Vec<Node<K>>> {
        let mut children: Vec<Node<K>> = Vec::new();
        for candidate in self.sub_tree_in(tx, node)? {
            // pre-order: skip the subtree of the last child taken
            if children.last().is_some_and(|c| candidate.high < c.high) {
                continue;
            }
            children.push(candidate);
        }
        Ok(children)
    }

    fn parent_in(&self, tx: &Tx<'_, K, S>, node: &Node<K>) -> Result<Option<Node<K>>> {
        if node.is_root() {
            return Ok(None);
        }
        let ancestors = tx.find(
            &self
                .tree(&node.tree_id)
                .lt(field::LOW, node.low)
                .gt(field::HIGH, node.high),
        )?;
        Ok(ancestors.into_iter().min_by_key(|a| node.low - a.low))
    }

    fn add_child_in(&self, tx: &mut Tx<'_, K, S>, parent: &K, child: &K) -> Result<()> {
        tracing::debug!("add child: {} under {}", child, parent);

        if parent == child {
            tracing::warn!("add {} under itself rejected", child);
            return Err(StoreError::cycle(parent, child));
        }
        let parent_node = self.node_in(tx, parent)?;
        if let Some(child_node) = self.node_in(tx, child)? {
            if let Some(current) = self.parent_in(tx, &child_node)? {
                tracing::warn!("{} already has parent {}", child, current.node_key);
                return Err(StoreError::already_exists(&current.node_key, child));
            }
            if parent_node.as_ref().is_some_and(|p| child_node.contains(p)) {
                tracing::warn!("add {} under its descendant {} rejected", child, parent);
                return Err(StoreError::cycle(parent, child));
            }
        }

        let parent_node = self.ensure_node_in(tx, parent)?;
        let child_node = self.ensure_node_in(tx, child)?;
        self.attach_in(tx, &parent_node, &child_node)
    }

    /// Open a gap of `2 * size(child)` at the end of parent's interval and
    /// move the child's tree into it
    fn attach_in(&self, tx: &mut Tx<'_, K, S>, parent: &Node<K>, child: &Node<K>) -> Result<()> {
        let k = 2 * child.size();
        self.shift_following_in(tx, &parent.tree_id, parent.high, k)?;
        self.resize_ancestors_in(tx, parent, k)?;
        self.rehome_in(tx, child, &parent.tree_id, parent.high - child.low)
    }

    fn detach_in(&self, tx: &mut Tx<'_, K, S>, parent: &Node<K>, child: &Node<K>, delete_if_leaf: bool) -> Result<()> {
        if delete_if_leaf && child.is_leaf() {
            tracing::debug!("delete leaf {} ({})", child.node_key, child.id);
            tx.delete(child.id);
        } else {
            self.rehome_in(tx, child, &child.node_key, -(child.low - 1))?;
        }

        let k = 2 * child.size();
        self.shift_following_in(tx, &parent.tree_id, child.high, -k)?;
        self.resize_ancestors_in(tx, parent, -k)?;

        if let Some(parent) = tx.get(parent.id)? {
            if parent.is_root_without_child() {
                tracing::debug!("delete childless root {} ({})", parent.node_key, parent.id);
                tx.delete(parent.id);
            }
        }
        Ok(())
    }

    /// low/high += delta for every node of the tree starting after `after`
    fn shift_following_in(&self, tx: &mut Tx<'_, K, S>, tree_id: &K, after: i64, delta: i64) -> Result<()> {
        let nodes = tx.find(&self.tree(tree_id).gt(field::LOW, after))?;
        let ids = row_ids(&nodes);
        tracing::debug!("shift following nodes of {} after {} by {}: {:?}", tree_id, after, delta, ids);
        tx.bulk_update(&ids, |n| {
            n.low += delta;
            n.high += delta;
        })?;
        Ok(())
    }

    /// high += delta for `node` and every ancestor
    fn resize_ancestors_in(&self, tx: &mut Tx<'_, K, S>, node: &Node<K>, delta: i64) -> Result<()> {
        let nodes = tx.find(
            &self
                .tree(&node.tree_id)
                .le(field::LOW, node.low)
                .ge(field::HIGH, node.high),
        )?;
        let ids = row_ids(&nodes);
        tracing::debug!("resize ancestors of {} by {}: {:?}", node.node_key, delta, ids);
        tx.bulk_update(&ids, |n| n.high += delta)?;
        Ok(())
    }

    /// Shift `root`'s whole subtree by `delta` into tree `tree_id`
    fn rehome_in(&self, tx: &mut Tx<'_, K, S>, root: &Node<K>, tree_id: &K, delta: i64) -> Result<()> {
        let nodes = tx.find(
            &self
                .tree(&root.tree_id)
                .ge(field::LOW, root.low)
                .le(field::HIGH, root.high),
        )?;
        let ids = row_ids(&nodes);
        tracing::debug!("move subtree of {} to tree {} by {}: {:?}", root.node_key, tree_id, delta, ids);
        tx.bulk_update(&ids, |n| {
            n.low += delta;
            n.high += delta;
            n.tree_id = tree_id.clone();
        })?;
        Ok(())
    }
}

impl<K: VertexKey, S: RowStore<IntervalTreeNode<K>>> HierarchyIndex<K> for IntervalTreeStore<K, S> {
    fn link(&self, parent: &K, child: &K) -> Result<()> {
        self.add_child(parent, child)
    }

    /// A leaf child is deleted, an inner child becomes a root
    fn unlink(&self, parent: &K, child: &K) -> Result<()> {
        self.remove_child(parent, child, true)
    }

    fn remove_vertex(&self, vertex: &K) -> Result<()> {
        self.delete(vertex)
    }

    fn ancestors(&self, vertex: &K) -> Result<Vec<K>> {
        self.get_ancestors(vertex)
    }

    fn descendants(&self, vertex: &K) -> Result<Vec<K>> {
        self.get_sub_tree(vertex)
    }
}
