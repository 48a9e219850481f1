//! DagStore: incremental maintenance of the closure rows

use std::collections::{BTreeSet, HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Mutex;

use super::{field, DagEdgeRow};
use crate::error::{Result, StoreError};
use crate::graph::{traversal, HierarchyIndex};
use crate::storage::{Query, RowId, RowStore, Transaction, Value, VertexKey};

type Tx<'a, K, S> = Transaction<'a, DagEdgeRow<K>, S>;

/// Closure-table store for one graph partition
///
/// Every public mutation runs as one [`Transaction`]: rejections happen
/// before anything is staged, and the write-set lands in a single commit.
/// Writers through the same `DagStore` are serialized; writers in other
/// processes sharing the backend must be serialized by the caller.
pub struct DagStore<K, S> {
    store: S,
    graph_id: String,
    write_lock: Mutex<()>,
    _marker: PhantomData<fn() -> K>,
}

fn check_key<K: VertexKey>(key: &K, name: &str) -> Result<()> {
    if !key.is_valid() {
        return Err(StoreError::InvalidArgument(format!(
            "Argument [{}] is not a valid vertex: {:?}",
            name, key
        )));
    }
    Ok(())
}

impl<K: VertexKey, S: RowStore<DagEdgeRow<K>>> DagStore<K, S> {
    pub fn new(store: S, graph_id: impl Into<String>) -> Self {
        Self {
            store,
            graph_id: graph_id.into(),
            write_lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    pub fn backend(&self) -> &S {
        &self.store
    }

    fn partition(&self) -> Query {
        Query::new().eq(field::GRAPH_ID, self.graph_id.as_str())
    }

    fn direct_query(&self, start: &K, end: &K) -> Query {
        self.partition()
            .eq(field::START_VERTEX, start.to_value())
            .eq(field::END_VERTEX, end.to_value())
            .eq(field::HOPS, 0i64)
    }

    fn write<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Tx<'_, K, S>) -> Result<T>,
    {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned("dag writer"))?;
        let mut tx = Transaction::new(&self.store);
        let result = op(&mut tx)?;
        tx.commit()?;
        Ok(result)
    }

    // === EDGE OPERATIONS ===

    /// Whether a direct edge `start -> end` exists
    pub fn has_edge(&self, start: &K, end: &K) -> Result<bool> {
        check_key(start, "startVertex")?;
        check_key(end, "endVertex")?;
        Ok(self.store.find_size(&self.direct_query(start, end))? > 0)
    }

    /// Insert direct edge `start -> end` and every closure row it implies
    pub fn add_edges(&self, start: &K, end: &K) -> Result<DagEdgeRow<K>> {
        check_key(start, "startVertex")?;
        check_key(end, "endVertex")?;
        self.write(|tx| self.add_edge_in(tx, start, end))
    }

    /// Insert several direct edges in one transaction; any rejection rolls back all of them
    pub fn add_edges_batch(&self, edges: &[(K, K)]) -> Result<Vec<DagEdgeRow<K>>> {
        for (start, end) in edges {
            check_key(start, "startVertex")?;
            check_key(end, "endVertex")?;
        }
        self.write(|tx| {
            edges
                .iter()
                .map(|(start, end)| self.add_edge_in(tx, start, end))
                .collect()
        })
    }

    /// Remove direct edge `start -> end` and every row derived through it.
    /// Returns the number of deleted rows.
    pub fn remove_edges(&self, start: &K, end: &K) -> Result<usize> {
        check_key(start, "startVertex")?;
        check_key(end, "endVertex")?;
        self.write(|tx| self.remove_edge_in(tx, start, end))
    }

    pub fn remove_edges_batch(&self, edges: &[(K, K)]) -> Result<usize> {
        for (start, end) in edges {
            check_key(start, "startVertex")?;
            check_key(end, "endVertex")?;
        }
        self.write(|tx| {
            let mut removed = 0;
            for (start, end) in edges {
                removed += self.remove_edge_in(tx, start, end)?;
            }
            Ok(removed)
        })
    }

    /// Remove every direct edge touching `vertex`, with their derived rows
    pub fn remove_edges_of_vertex(&self, vertex: &K) -> Result<usize> {
        check_key(vertex, "vertex")?;
        self.write(|tx| {
            let value = vertex.to_value();
            let mut direct = tx.find(&self.partition().eq(field::HOPS, 0i64).eq(field::START_VERTEX, value.clone()))?;
            direct.extend(tx.find(&self.partition().eq(field::HOPS, 0i64).eq(field::END_VERTEX, value))?);

            let mut removed = 0;
            for edge in direct {
                if tx.get(edge.id)?.is_some() {
                    removed += self.remove_direct_in(tx, &edge)?;
                }
            }
            tracing::debug!("remove edges of vertex {}: {} rows", vertex, removed);
            Ok(removed)
        })
    }

    // === QUERIES ===

    /// Every vertex that reaches `vertex`
    pub fn find_incoming_vertices(&self, vertex: &K) -> Result<BTreeSet<K>> {
        check_key(vertex, "vertex")?;
        let rows = self.store.find(&self.partition().eq(field::END_VERTEX, vertex.to_value()))?;
        let incoming: BTreeSet<K> = rows.into_iter().map(|r| r.start_vertex).collect();
        tracing::debug!("incoming vertices of {}: {:?}", vertex, incoming);
        Ok(incoming)
    }

    /// Every vertex reachable from `vertex`
    pub fn find_outgoing_vertices(&self, vertex: &K) -> Result<BTreeSet<K>> {
        check_key(vertex, "vertex")?;
        let rows = self.store.find(&self.partition().eq(field::START_VERTEX, vertex.to_value()))?;
        let outgoing: BTreeSet<K> = rows.into_iter().map(|r| r.end_vertex).collect();
        tracing::debug!("outgoing vertices of {}: {:?}", vertex, outgoing);
        Ok(outgoing)
    }

    /// All closure rows for one (start, end) pair, direct and derived.
    /// A pair reachable along several paths has one row per insertion route.
    pub fn find_edges(&self, start: &K, end: &K) -> Result<Vec<DagEdgeRow<K>>> {
        check_key(start, "startVertex")?;
        check_key(end, "endVertex")?;
        self.store.find(
            &self
                .partition()
                .eq(field::START_VERTEX, start.to_value())
                .eq(field::END_VERTEX, end.to_value())
                .order_by(field::HOPS),
        )
    }

    /// Every row of this graph partition
    pub fn edges(&self) -> Result<Vec<DagEdgeRow<K>>> {
        self.store.find(&self.partition())
    }

    // === DIAGNOSTICS ===

    /// Recompute reachability from the direct edges and compare it with the
    /// stored closure. Also checks that every derived row's provenance rows exist.
    pub fn verify_closure(&self) -> Result<()> {
        let rows = self.edges()?;
        let ids: HashSet<RowId> = rows.iter().map(|r| r.id).collect();

        let mut adjacency: HashMap<K, Vec<K>> = HashMap::new();
        for row in rows.iter().filter(|r| r.is_direct()) {
            adjacency.entry(row.start_vertex.clone()).or_default().push(row.end_vertex.clone());
        }

        let mut expected: BTreeSet<(K, K)> = BTreeSet::new();
        for start in adjacency.keys() {
            let reachable = traversal::bfs(std::slice::from_ref(start), usize::MAX, |v| {
                adjacency.get(v).cloned().unwrap_or_default()
            });
            for end in reachable.into_iter().filter(|v| v != start) {
                expected.insert((start.clone(), end));
            }
        }

        let mut actual: BTreeSet<(K, K)> = BTreeSet::new();
        for row in &rows {
            for reference in [row.direct_edge_id, row.entry_edge_id, row.exit_edge_id] {
                if !ids.contains(&reference) {
                    return Err(StoreError::ConsistencyViolation(format!(
                        "row {} ({} -> {}) references missing row {}",
                        row.id, row.start_vertex, row.end_vertex, reference
                    )));
                }
            }
            actual.insert((row.start_vertex.clone(), row.end_vertex.clone()));
        }

        if let Some((s, e)) = expected.difference(&actual).next() {
            return Err(StoreError::ConsistencyViolation(format!("missing closure row {} -> {}", s, e)));
        }
        if let Some((s, e)) = actual.difference(&expected).next() {
            return Err(StoreError::ConsistencyViolation(format!("stale closure row {} -> {}", s, e)));
        }
        Ok(())
    }

    // === TRANSACTION STEPS ===

    fn add_edge_in(&self, tx: &mut Tx<'_, K, S>, start: &K, end: &K) -> Result<DagEdgeRow<K>> {
        tracing::debug!("add edge: from {} to {}", start, end);

        if start == end {
            tracing::warn!("add edge from {} to itself rejected", start);
            return Err(StoreError::cycle(start, end));
        }
        if tx.find_size(&self.direct_query(start, end))? > 0 {
            tracing::warn!("edge from {} to {} already exists", start, end);
            return Err(StoreError::already_exists(start, end));
        }

        // Rows ending at start: every ancestor path into the new edge
        let incoming = tx.find(&self.partition().eq(field::END_VERTEX, start.to_value()))?;
        if incoming.iter().any(|a| &a.start_vertex == end) {
            tracing::warn!("add edge from {} to {} would cause a cycle", start, end);
            return Err(StoreError::cycle(start, end));
        }
        // Rows starting at end: every descendant path out of the new edge
        let outgoing = tx.find(&self.partition().eq(field::START_VERTEX, end.to_value()))?;

        let direct_id = tx.next_id()?;
        let direct = tx.create(DagEdgeRow::direct(direct_id, start.clone(), end.clone(), &self.graph_id));

        // step 1: start's incoming edges to end
        for a in &incoming {
            let id = tx.next_id()?;
            tx.create(DagEdgeRow {
                id,
                direct_edge_id: direct_id,
                entry_edge_id: a.id,
                exit_edge_id: direct_id,
                start_vertex: a.start_vertex.clone(),
                end_vertex: end.clone(),
                hops: a.hops + 1,
                graph_id: self.graph_id.clone(),
            });
        }

        // step 2: start to end's outgoing edges
        for b in &outgoing {
            let id = tx.next_id()?;
            tx.create(DagEdgeRow {
                id,
                direct_edge_id: direct_id,
                entry_edge_id: direct_id,
                exit_edge_id: b.id,
                start_vertex: start.clone(),
                end_vertex: b.end_vertex.clone(),
                hops: b.hops + 1,
                graph_id: self.graph_id.clone(),
            });
        }

        // step 3: start's incoming edges to the end vertices of end's outgoing edges
        for a in &incoming {
            for b in &outgoing {
                let id = tx.next_id()?;
                tx.create(DagEdgeRow {
                    id,
                    direct_edge_id: direct_id,
                    entry_edge_id: a.id,
                    exit_edge_id: b.id,
                    start_vertex: a.start_vertex.clone(),
                    end_vertex: b.end_vertex.clone(),
                    hops: a.hops + b.hops + 1,
                    graph_id: self.graph_id.clone(),
                });
            }
        }

        tracing::debug!(
            "edge {} ({} -> {}): {} incoming, {} outgoing, {} rows staged",
            direct_id,
            start,
            end,
            incoming.len(),
            outgoing.len(),
            tx.pending()
        );
        Ok(direct)
    }

    fn remove_edge_in(&self, tx: &mut Tx<'_, K, S>, start: &K, end: &K) -> Result<usize> {
        tracing::debug!("remove edge: from {} to {}", start, end);

        let direct = tx.find_one(&self.direct_query(start, end))?.ok_or_else(|| {
            tracing::warn!("edge from {} to {} does not exist", start, end);
            StoreError::NotFound(format!("edge from {} to {}", start, end))
        })?;
        self.remove_direct_in(tx, &direct)
    }

    fn remove_direct_in(&self, tx: &mut Tx<'_, K, S>, edge: &DagEdgeRow<K>) -> Result<usize> {
        // step 1: rows inserted together with this direct edge
        let mut remove_ids: BTreeSet<RowId> = tx
            .find(&self.partition().eq(field::DIRECT_EDGE_ID, Value::from(edge.id)))?
            .into_iter()
            .map(|r| r.id)
            .collect();
        remove_ids.insert(edge.id);

        // step 2: rows inserted afterwards whose path goes through a removed row
        let mut frontier: Vec<RowId> = remove_ids.iter().copied().collect();
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for id in frontier {
                for column in [field::ENTRY_EDGE_ID, field::EXIT_EDGE_ID] {
                    let dependents = tx.find(&self.partition().eq(column, Value::from(id)).gt(field::HOPS, 0i64))?;
                    for row in dependents {
                        if remove_ids.insert(row.id) {
                            next.push(row.id);
                        }
                    }
                }
            }
            frontier = next;
        }

        tracing::debug!("remove edge {}: removeEdgeIds = {:?}", edge.id, remove_ids);
        Ok(tx.batch_delete_by_id(remove_ids))
    }
}

impl<K: VertexKey, S: RowStore<DagEdgeRow<K>>> HierarchyIndex<K> for DagStore<K, S> {
    fn link(&self, parent: &K, child: &K) -> Result<()> {
        self.add_edges(parent, child).map(|_| ())
    }

    fn unlink(&self, parent: &K, child: &K) -> Result<()> {
        self.remove_edges(parent, child).map(|_| ())
    }

    fn remove_vertex(&self, vertex: &K) -> Result<()> {
        self.remove_edges_of_vertex(vertex).map(|_| ())
    }

    fn ancestors(&self, vertex: &K) -> Result<Vec<K>> {
        Ok(self.find_incoming_vertices(vertex)?.into_iter().collect())
    }

    fn descendants(&self, vertex: &K) -> Result<Vec<K>> {
        Ok(self.find_outgoing_vertices(vertex)?.into_iter().collect())
    }
}
