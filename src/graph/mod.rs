//! Hierarchy API shared by both stores

pub mod traversal;

use crate::error::Result;
use crate::storage::VertexKey;

/// Common interface of the hierarchy stores
///
/// The service layer picks one implementation per relationship type: the
/// interval tree store for strict single-parent chains, the DAG store for
/// multi-parent graphs.
pub trait HierarchyIndex<K: VertexKey> {
    // === MUTATION ===

    /// Make `child` a direct descendant of `parent`
    fn link(&self, parent: &K, child: &K) -> Result<()>;

    /// Remove the direct parent -> child relation
    fn unlink(&self, parent: &K, child: &K) -> Result<()>;

    /// Drop every relation the vertex takes part in
    fn remove_vertex(&self, vertex: &K) -> Result<()>;

    // === QUERIES ===

    /// Every vertex that can reach `vertex`
    fn ancestors(&self, vertex: &K) -> Result<Vec<K>>;

    /// Every vertex reachable from `vertex`
    fn descendants(&self, vertex: &K) -> Result<Vec<K>>;
}
