//! Error types for hierarchy stores

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Edge already exists: {start} -> {end}")]
    AlreadyExists { start: String, end: String },

    #[error("Adding {start} -> {end} would create a cycle")]
    CycleDetected { start: String, end: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Lock poisoned: {0}")]
    Poisoned(&'static str),
}

impl StoreError {
    pub(crate) fn already_exists(start: impl std::fmt::Display, end: impl std::fmt::Display) -> Self {
        StoreError::AlreadyExists { start: start.to_string(), end: end.to_string() }
    }

    pub(crate) fn cycle(start: impl std::fmt::Display, end: impl std::fmt::Display) -> Self {
        StoreError::CycleDetected { start: start.to_string(), end: end.to_string() }
    }
}
