//! Persistent row store on sled
//!
//! Rows live bincode-encoded in a tree named after the table, keyed by the
//! big-endian row id. Indexed fields are mirrored into `<table>.idx`; a commit
//! updates both trees inside one sled transaction.

use std::marker::PhantomData;

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};

use super::{Delta, Query, Record, RowId, RowStore};
use crate::error::{Result, StoreError};
use crate::index::{self, FieldIndex};

pub struct SledStore<R> {
    db: Db,
    rows: Tree,
    index: FieldIndex,
    flush_on_commit: bool,
    _marker: PhantomData<fn() -> R>,
}

// Encoded write-set entry: None = delete
type Prepared = (RowId, Option<(Vec<u8>, Vec<Vec<u8>>)>);

impl<R: Record> SledStore<R> {
    /// Open the table trees inside an existing database
    pub fn open(db: &Db) -> Result<Self> {
        let rows = db.open_tree(R::TABLE)?;
        let index = FieldIndex::new(db.open_tree(format!("{}.idx", R::TABLE))?);

        tracing::info!("Opened table {}: {} rows, {} index entries", R::TABLE, rows.len(), index.len());

        Ok(Self {
            db: db.clone(),
            rows,
            index,
            flush_on_commit: false,
            _marker: PhantomData,
        })
    }

    /// Fsync after every commit
    pub fn with_flush_on_commit(mut self, flush: bool) -> Self {
        self.flush_on_commit = flush;
        self
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<R> {
        Ok(bincode::deserialize(bytes)?)
    }

    fn prepare(deltas: &[Delta<R>]) -> Result<Vec<Prepared>> {
        deltas
            .iter()
            .map(|delta| {
                let new = match delta {
                    Delta::Put(row) => Some((bincode::serialize(row)?, index::entries_for(row)?)),
                    Delta::Delete { .. } => None,
                };
                Ok((delta.id(), new))
            })
            .collect()
    }
}

impl<R: Record> RowStore<R> for SledStore<R> {
    fn get(&self, id: RowId) -> Result<Option<R>> {
        match self.rows.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn find(&self, query: &Query) -> Result<Vec<R>> {
        let mut result = Vec::new();

        if let Some((field, value)) = query.index_hint(R::INDEXED_FIELDS) {
            for id in self.index.lookup(field, value)? {
                if let Some(row) = self.get(id)? {
                    if query.matches(&row) {
                        result.push(row);
                    }
                }
            }
        } else {
            for entry in self.rows.iter() {
                let (_, bytes) = entry?;
                let row = Self::decode(&bytes)?;
                if query.matches(&row) {
                    result.push(row);
                }
            }
        }

        query.sort(&mut result);
        Ok(result)
    }

    fn next_id(&self) -> Result<RowId> {
        // generate_id starts at 0; keep 0 unused
        Ok(self.db.generate_id()? + 1)
    }

    fn apply(&self, deltas: &[Delta<R>]) -> Result<()> {
        let prepared = Self::prepare(deltas)?;

        (&self.rows, self.index.tree())
            .transaction(|(rows, idx)| {
                for (id, new) in &prepared {
                    let key = id.to_be_bytes();

                    if let Some(old) = rows.get(&key[..])? {
                        let old_row: R = bincode::deserialize(&old)
                            .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;
                        let stale = index::entries_for(&old_row).map_err(ConflictableTransactionError::Abort)?;
                        for entry in stale {
                            idx.remove(entry)?;
                        }
                    }

                    match new {
                        Some((bytes, entries)) => {
                            rows.insert(&key[..], bytes.as_slice())?;
                            for entry in entries {
                                idx.insert(entry.as_slice(), Vec::<u8>::new())?;
                            }
                        }
                        None => {
                            rows.remove(&key[..])?;
                        }
                    }
                }
                Ok::<(), ConflictableTransactionError<StoreError>>(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(err) => err,
                TransactionError::Storage(err) => StoreError::Storage(err),
            })?;

        if self.flush_on_commit {
            self.db.flush()?;
        }
        Ok(())
    }
}
