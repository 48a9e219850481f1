//! Unit of work over a row store
//!
//! Reads see staged writes first, then the backend (the same layering the
//! delta log gets over flushed segments). Nothing reaches the backend until
//! [`Transaction::commit`]; dropping the transaction discards every staged
//! write.

use std::collections::HashMap;

use super::{Delta, DeltaLog, Query, Record, RowId, RowStore};
use crate::error::Result;

pub struct Transaction<'a, R: Record, S: RowStore<R> + ?Sized> {
    store: &'a S,
    // id -> staged row, None = staged delete
    staged: HashMap<RowId, Option<R>>,
    log: DeltaLog<R>,
}

impl<'a, R: Record, S: RowStore<R> + ?Sized> Transaction<'a, R, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            staged: HashMap::new(),
            log: DeltaLog::new(),
        }
    }

    /// Get row (from staged writes or backend)
    pub fn get(&self, id: RowId) -> Result<Option<R>> {
        if let Some(staged) = self.staged.get(&id) {
            return Ok(staged.clone());
        }
        self.store.get(id)
    }

    pub fn find(&self, query: &Query) -> Result<Vec<R>> {
        let mut rows: Vec<R> = self
            .store
            .find(query)?
            .into_iter()
            .filter(|row| !self.staged.contains_key(&row.id()))
            .collect();

        rows.extend(
            self.staged
                .values()
                .flatten()
                .filter(|row| query.matches(*row))
                .cloned(),
        );

        query.sort(&mut rows);
        Ok(rows)
    }

    /// First row in query order
    pub fn find_one(&self, query: &Query) -> Result<Option<R>> {
        Ok(self.find(query)?.into_iter().next())
    }

    pub fn find_size(&self, query: &Query) -> Result<usize> {
        if self.staged.is_empty() {
            return self.store.find_size(query);
        }
        Ok(self.find(query)?.len())
    }

    pub fn next_id(&self) -> Result<RowId> {
        self.store.next_id()
    }

    pub fn create(&mut self, row: R) -> R {
        self.put(row.clone());
        row
    }

    pub fn update(&mut self, row: R) {
        self.put(row);
    }

    pub fn delete(&mut self, id: RowId) {
        self.staged.insert(id, None);
        self.log.push(Delta::Delete { id });
    }

    /// Delete every listed row, returns how many ids were given
    pub fn batch_delete_by_id<I: IntoIterator<Item = RowId>>(&mut self, ids: I) -> usize {
        let mut count = 0;
        for id in ids {
            self.delete(id);
            count += 1;
        }
        count
    }

    /// Apply `mutate` to every listed row that still exists
    pub fn bulk_update<F>(&mut self, ids: &[RowId], mut mutate: F) -> Result<usize>
    where
        F: FnMut(&mut R),
    {
        let mut updated = 0;
        for &id in ids {
            if let Some(mut row) = self.get(id)? {
                mutate(&mut row);
                self.put(row);
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Number of staged operations
    pub fn pending(&self) -> usize {
        self.log.len()
    }

    /// Hand the write-set to the backend in one atomic apply
    pub fn commit(self) -> Result<usize> {
        if self.log.is_empty() {
            return Ok(0);
        }
        let count = self.log.len();
        self.store.apply(self.log.as_slice())?;
        tracing::debug!("{}: committed {} operations", R::TABLE, count);
        Ok(count)
    }

    fn put(&mut self, row: R) {
        self.staged.insert(row.id(), Some(row.clone()));
        self.log.push(Delta::Put(row));
    }
}
