//! hierdb - materialized hierarchy indexes
//!
//! # Architecture
//!
//! - **DAG store**: transitive closure of a multi-parent graph, one row per
//!   reachable (ancestor, descendant) pair, maintained incrementally
//! - **Interval tree store**: nested-set `(low, high)` labels for a
//!   single-parent forest, renumbered with bulk range updates
//! - **Row store**: in-memory or sled-backed tables with secondary indexes
//! - **Transactions**: every public mutation stages its writes and commits
//!   them atomically
//!
//! # Usage example
//!
//! ```no_run
//! use hierdb::{DagStore, IntervalTreeStore, MemoryStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dag: DagStore<String, _> = DagStore::new(MemoryStore::new(), "party");
//! dag.add_edges(&"group1".to_string(), &"group2".to_string())?;
//! dag.add_edges(&"group2".to_string(), &"user4".to_string())?;
//! let ancestors = dag.find_incoming_vertices(&"user4".to_string())?;
//! println!("{:?}", ancestors); // {"group1", "group2"}
//!
//! let tree: IntervalTreeStore<String, _> = IntervalTreeStore::new(MemoryStore::new(), "organization");
//! tree.add_child(&"org1".to_string(), &"org2".to_string())?;
//! tree.add_child(&"org2".to_string(), &"user1".to_string())?;
//! println!("{:?}", tree.get_sub_tree(&"org1".to_string())?); // ["org2", "user1"]
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dag;
pub mod error;
pub mod graph;
pub mod index;
pub mod storage;
pub mod tree;

pub use config::StoreConfig;
pub use dag::{DagEdgeRow, DagStore};
pub use error::{Result, StoreError};
pub use graph::HierarchyIndex;
pub use storage::{MemoryStore, Query, Record, RowStore, SledStore, Transaction, Value, VertexKey};
pub use tree::{IntervalTreeNode, IntervalTreeStore};
