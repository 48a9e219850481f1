//! Transitive-closure DAG store
//!
//! Every reachable (ancestor, descendant) pair of a multi-parent DAG is kept
//! as a row. Direct edges have `hops == 0`; derived rows record which direct
//! edge caused them (`direct_edge_id`) and which rows supplied the path
//! prefix (`entry_edge_id`) and suffix (`exit_edge_id`), so removing a direct
//! edge can find everything that depended on it.

mod store;


use serde::{Deserialize, Serialize};

use crate::storage::{Record, RowId, Value, VertexKey};

pub use store::DagStore;

/// Column names used in queries
pub(crate) mod field {
    pub const ID: &str = "id";
    pub const DIRECT_EDGE_ID: &str = "direct_edge_id";
    pub const ENTRY_EDGE_ID: &str = "entry_edge_id";
    pub const EXIT_EDGE_ID: &str = "exit_edge_id";
    pub const START_VERTEX: &str = "start_vertex";
    pub const END_VERTEX: &str = "end_vertex";
    pub const HOPS: &str = "hops";
    pub const GRAPH_ID: &str = "graph_id";
}

/// One closure row: `start_vertex` reaches `end_vertex`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagEdgeRow<K> {
    pub id: RowId,

    /// Direct edge whose insertion created this row (self for direct edges)
    pub direct_edge_id: RowId,

    /// Row supplying the path into the direct edge's start vertex (self for direct edges)
    pub entry_edge_id: RowId,

    /// Row supplying the path out of the direct edge's end vertex (self for direct edges)
    pub exit_edge_id: RowId,

    pub start_vertex: K,
    pub end_vertex: K,

    /// 0 for direct edges; derived rows add one to the hops of the rows they extend
    pub hops: u32,

    /// Partition key
    pub graph_id: String,
}

impl<K: VertexKey> DagEdgeRow<K> {
    /// A user-inserted edge, its own entry/direct/exit
    pub fn direct(id: RowId, start_vertex: K, end_vertex: K, graph_id: &str) -> Self {
        Self {
            id,
            direct_edge_id: id,
            entry_edge_id: id,
            exit_edge_id: id,
            start_vertex,
            end_vertex,
            hops: 0,
            graph_id: graph_id.to_string(),
        }
    }

    pub fn is_direct(&self) -> bool {
        self.hops == 0
    }
}

impl<K: VertexKey> Record for DagEdgeRow<K> {
    const TABLE: &'static str = "dag_edge";
    const INDEXED_FIELDS: &'static [&'static str] = &[
        field::START_VERTEX,
        field::END_VERTEX,
        field::DIRECT_EDGE_ID,
        field::ENTRY_EDGE_ID,
        field::EXIT_EDGE_ID,
    ];

    fn id(&self) -> RowId {
        self.id
    }

    fn field(&self, name: &str) -> Value {
        match name {
            field::ID => Value::from(self.id),
            field::DIRECT_EDGE_ID => Value::from(self.direct_edge_id),
            field::ENTRY_EDGE_ID => Value::from(self.entry_edge_id),
            field::EXIT_EDGE_ID => Value::from(self.exit_edge_id),
            field::START_VERTEX => self.start_vertex.to_value(),
            field::END_VERTEX => self.end_vertex.to_value(),
            field::HOPS => Value::Int(self.hops as i64),
            field::GRAPH_ID => Value::Text(self.graph_id.clone()),
            _ => Value::Null,
        }
    }
}
