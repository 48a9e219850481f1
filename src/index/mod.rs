//! Secondary indexes via sled KV store
//!
//! One entry per (indexed field, row): key `field \0 bincode(value) id_be`,
//! empty value. Values are length-prefixed by bincode, so the
//! `field \0 bincode(value)` prefix selects exactly the rows with that value.

use sled::Tree;

use crate::error::{Result, StoreError};
use crate::storage::{Record, RowId, Value};

const ID_LEN: usize = 8;

/// Field index: (field, value) -> [row_ids]
pub struct FieldIndex {
    tree: Tree,
}

impl FieldIndex {
    pub fn new(tree: Tree) -> Self {
        Self { tree }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Get all row ids whose `field` equals `value`
    pub fn lookup(&self, field: &str, value: &Value) -> Result<Vec<RowId>> {
        let prefix = prefix(field, value)?;
        let mut result = Vec::new();
        for entry in self.tree.scan_prefix(&prefix) {
            let (key, _) = entry.map_err(|e| StoreError::Index(format!("Failed to scan index: {}", e)))?;
            result.push(decode_id(&key)?);
        }
        Ok(result)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

/// Lookup prefix for `field = value`
pub fn prefix(field: &str, value: &Value) -> Result<Vec<u8>> {
    let mut key = Vec::with_capacity(field.len() + 24);
    key.extend_from_slice(field.as_bytes());
    key.push(0);
    key.extend_from_slice(&bincode::serialize(value)?);
    Ok(key)
}

/// Full entry key for one row
pub fn entry_key(field: &str, value: &Value, id: RowId) -> Result<Vec<u8>> {
    let mut key = prefix(field, value)?;
    key.extend_from_slice(&id.to_be_bytes());
    Ok(key)
}

/// Every index entry a row contributes
pub fn entries_for<R: Record>(row: &R) -> Result<Vec<Vec<u8>>> {
    R::INDEXED_FIELDS
        .iter()
        .map(|field| entry_key(field, &row.field(field), row.id()))
        .collect()
}

/// Row id stored in the trailing bytes of an entry key
pub fn decode_id(key: &[u8]) -> Result<RowId> {
    if key.len() < ID_LEN {
        return Err(StoreError::Index("Index key too short".into()));
    }
    let id_bytes: [u8; ID_LEN] = key[key.len() - ID_LEN..]
        .try_into()
        .map_err(|_| StoreError::Index("Invalid row ID".into()))?;
    Ok(RowId::from_be_bytes(id_bytes))
}
