//! In-process row store

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::{Delta, Query, Record, RowId, RowStore};
use crate::error::{Result, StoreError};

/// Rows kept in a `BTreeMap` behind a `RwLock`; `apply` holds the write lock
/// for the whole write-set.
#[derive(Debug)]
pub struct MemoryStore<R> {
    rows: RwLock<BTreeMap<RowId, R>>,
    next_id: AtomicU64,
}

impl<R: Record> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> MemoryStore<R> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Snapshot of every row in id order
    pub fn rows(&self) -> Result<Vec<R>> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows.values().cloned().collect())
    }
}

fn poisoned() -> StoreError {
    StoreError::Poisoned("memory store rows")
}

impl<R: Record> RowStore<R> for MemoryStore<R> {
    fn get(&self, id: RowId) -> Result<Option<R>> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows.get(&id).cloned())
    }

    fn find(&self, query: &Query) -> Result<Vec<R>> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        let mut result: Vec<R> = rows.values().filter(|r| query.matches(*r)).cloned().collect();
        query.sort(&mut result);
        Ok(result)
    }

    fn find_size(&self, query: &Query) -> Result<usize> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows.values().filter(|r| query.matches(*r)).count())
    }

    fn next_id(&self) -> Result<RowId> {
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn apply(&self, deltas: &[Delta<R>]) -> Result<()> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        for delta in deltas {
            match delta {
                Delta::Put(row) => {
                    rows.insert(row.id(), row.clone());
                }
                Delta::Delete { id } => {
                    rows.remove(id);
                }
            }
        }
        Ok(())
    }
}
