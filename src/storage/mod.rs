//! Row storage: the persistence substrate under both hierarchy stores
//!
//! A [`RowStore`] holds rows of one [`Record`] type. All mutation goes through
//! a [`Transaction`], which stages writes in a [`DeltaLog`] and hands the whole
//! write-set to the backend in a single atomic `apply` on commit.

pub mod delta;
pub mod memory;
pub mod query;
pub mod sled_store;
pub mod txn;
pub mod value;

use std::fmt::Debug;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub use delta::{Delta, DeltaLog};
pub use memory::MemoryStore;
pub use query::{Operator, OrderBy, Predicate, Query};
pub use sled_store::SledStore;
pub use txn::Transaction;
pub use value::{Value, VertexKey};

/// Row identity, unique within a table
pub type RowId = u64;

/// A persisted row type
pub trait Record: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table (sled tree) name
    const TABLE: &'static str;

    /// Fields maintained in the secondary index
    const INDEXED_FIELDS: &'static [&'static str];

    fn id(&self) -> RowId;

    /// Value of a named field; unknown names read as `Value::Null`
    fn field(&self, name: &str) -> Value;
}

/// Backend holding rows of one table
pub trait RowStore<R: Record>: Send + Sync {
    /// Fetch a row by id
    fn get(&self, id: RowId) -> Result<Option<R>>;

    /// Rows matching `query`, in query order
    fn find(&self, query: &Query) -> Result<Vec<R>>;

    /// Number of rows matching `query`
    fn find_size(&self, query: &Query) -> Result<usize> {
        Ok(self.find(query)?.len())
    }

    /// Allocate a fresh row id
    fn next_id(&self) -> Result<RowId>;

    /// Apply a write-set atomically: either every delta lands or none does
    fn apply(&self, deltas: &[Delta<R>]) -> Result<()>;

    /// Total number of rows
    fn len(&self) -> Result<usize> {
        self.find_size(&Query::new())
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl<R: Record, S: RowStore<R> + ?Sized> RowStore<R> for Arc<S> {
    fn get(&self, id: RowId) -> Result<Option<R>> {
        (**self).get(id)
    }

    fn find(&self, query: &Query) -> Result<Vec<R>> {
        (**self).find(query)
    }

    fn find_size(&self, query: &Query) -> Result<usize> {
        (**self).find_size(query)
    }

    fn next_id(&self) -> Result<RowId> {
        (**self).next_id()
    }

    fn apply(&self, deltas: &[Delta<R>]) -> Result<()> {
        (**self).apply(deltas)
    }
}
