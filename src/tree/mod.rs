//! Nested-set interval tree store
//!
//! Each node of a single-parent forest carries an interval `(low, high)`;
//! node A is an ancestor of node B in the same tree iff
//! `A.low < B.low && B.high < A.high`. A tree of `n` nodes numbers its
//! intervals `1..=2n`, the root is `(1, 2n)` and a leaf spans two adjacent
//! numbers. Mutations renumber whole index ranges with bulk updates.

mod store;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

use crate::storage::{Record, RowId, Value, VertexKey};

pub use store::IntervalTreeStore;

pub(crate) mod field {
    pub const ID: &str = "id";
    pub const NODE_KEY: &str = "node_key";
    pub const LOW: &str = "low";
    pub const HIGH: &str = "high";
    pub const TREE_ID: &str = "tree_id";
    pub const TREE_TYPE: &str = "tree_type";
}

/// Position of one node in its tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalTreeNode<K> {
    pub id: RowId,
    pub node_key: K,
    pub low: i64,
    pub high: i64,
    /// Key of the tree's root node
    pub tree_id: K,
    pub tree_type: String,
}

impl<K: VertexKey> IntervalTreeNode<K> {
    /// A standalone single-node tree
    pub fn root(id: RowId, node_key: K, tree_type: &str) -> Self {
        Self {
            id,
            tree_id: node_key.clone(),
            node_key,
            low: 1,
            high: 2,
            tree_type: tree_type.to_string(),
        }
    }

    /// Node count of the subtree, this node included
    pub fn size(&self) -> i64 {
        (self.high - self.low + 1) / 2
    }

    pub fn is_root(&self) -> bool {
        self.low == 1
    }

    pub fn is_leaf(&self) -> bool {
        self.high - self.low == 1
    }

    pub fn is_root_without_child(&self) -> bool {
        self.low == 1 && self.high == 2
    }

    /// Strict interval containment within the same tree
    pub fn contains(&self, other: &Self) -> bool {
        self.tree_id == other.tree_id && self.low < other.low && other.high < self.high
    }
}

impl<K: VertexKey> Record for IntervalTreeNode<K> {
    const TABLE: &'static str = "interval_tree_node";
    const INDEXED_FIELDS: &'static [&'static str] = &[field::NODE_KEY, field::TREE_ID];

    fn id(&self) -> RowId {
        self.id
    }

    fn field(&self, name: &str) -> Value {
        match name {
            field::ID => Value::from(self.id),
            field::NODE_KEY => self.node_key.to_value(),
            field::LOW => Value::Int(self.low),
            field::HIGH => Value::Int(self.high),
            field::TREE_ID => self.tree_id.to_value(),
            field::TREE_TYPE => Value::Text(self.tree_type.clone()),
            _ => Value::Null,
        }
    }
}
