//! Delta log: the ordered write-set of a unit of work

use super::{Record, RowId};

/// Operation in delta log
#[derive(Debug, Clone)]
pub enum Delta<R> {
    /// Insert or overwrite a row
    Put(R),
    Delete { id: RowId },
}

impl<R: Record> Delta<R> {
    pub fn id(&self) -> RowId {
        match self {
            Delta::Put(row) => row.id(),
            Delta::Delete { id } => *id,
        }
    }
}

/// In-memory delta log, replayed in order by the backend on commit
#[derive(Debug)]
pub struct DeltaLog<R> {
    operations: Vec<Delta<R>>,
}

impl<R> Default for DeltaLog<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> DeltaLog<R> {
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    pub fn push(&mut self, delta: Delta<R>) {
        self.operations.push(delta);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn as_slice(&self) -> &[Delta<R>] {
        &self.operations
    }
}
