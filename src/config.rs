//! Store configuration
//!
//! Loaded from a JSON file, then overridden by `HIERDB_*` environment
//! variables. Missing fields take their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dag::{DagEdgeRow, DagStore};
use crate::error::{Result, StoreError};
use crate::storage::{SledStore, VertexKey};
use crate::tree::{IntervalTreeNode, IntervalTreeStore};

pub const DB_EXTENSION: &str = "hierdb";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database directory, normalized to a `.hierdb` extension
    pub path: PathBuf,

    /// DAG partition used by [`StoreConfig::dag_store`]
    pub graph_id: String,

    /// Forest used by [`StoreConfig::tree_store`]
    pub tree_type: String,

    /// Remove the database when it is dropped
    pub temporary: bool,

    /// fsync after every commit
    pub flush_on_commit: bool,

    /// `tracing` filter level for the CLI
    pub log_level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("hierarchy.hierdb"),
            graph_id: "default".to_string(),
            tree_type: "default".to_string(),
            temporary: false,
            flush_on_commit: false,
            log_level: "info".to_string(),
        }
    }
}

/// Give the path a `.hierdb` extension, replacing any other one
pub fn normalize_db_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();

    if path.extension().and_then(|s| s.to_str()) == Some(DB_EXTENSION) {
        return path.to_path_buf();
    }

    if path.extension().is_some() {
        return path.with_extension(DB_EXTENSION);
    }

    let mut new_path = path.to_path_buf();
    let new_filename = format!(
        "{}.{}",
        path.file_name().and_then(|s| s.to_str()).unwrap_or("db"),
        DB_EXTENSION
    );
    new_path.set_file_name(new_filename);
    new_path
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(StoreError::InvalidArgument(format!("{}: expected a boolean, got {:?}", name, other))),
    }
}

impl StoreConfig {
    /// Read a JSON config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = fs::File::open(path.as_ref())?;
        let config: StoreConfig = serde_json::from_reader(file)?;
        tracing::debug!("Loaded config from {:?}", path.as_ref());
        Ok(config)
    }

    /// Optional file, then the process environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env(|name| std::env::var(name).ok())
    }

    /// Apply `HIERDB_*` overrides from `lookup`
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("HIERDB_PATH") {
            self.path = PathBuf::from(path);
        }
        if let Some(graph_id) = lookup("HIERDB_GRAPH_ID") {
            self.graph_id = graph_id;
        }
        if let Some(tree_type) = lookup("HIERDB_TREE_TYPE") {
            self.tree_type = tree_type;
        }
        if let Some(value) = lookup("HIERDB_TEMPORARY") {
            self.temporary = parse_flag("HIERDB_TEMPORARY", &value)?;
        }
        if let Some(value) = lookup("HIERDB_FLUSH_ON_COMMIT") {
            self.flush_on_commit = parse_flag("HIERDB_FLUSH_ON_COMMIT", &value)?;
        }
        if let Some(level) = lookup("HIERDB_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(self)
    }

    pub fn db_path(&self) -> PathBuf {
        normalize_db_path(&self.path)
    }

    pub fn open_db(&self) -> Result<sled::Db> {
        let path = self.db_path();
        let db = sled::Config::new().path(&path).temporary(self.temporary).open()?;
        tracing::info!("Opened database at {:?} (temporary: {})", path, self.temporary);
        Ok(db)
    }

    pub fn dag_store<K: VertexKey>(&self, db: &sled::Db) -> Result<DagStore<K, SledStore<DagEdgeRow<K>>>> {
        let rows = SledStore::open(db)?.with_flush_on_commit(self.flush_on_commit);
        Ok(DagStore::new(rows, self.graph_id.clone()))
    }

    pub fn tree_store<K: VertexKey>(
        &self,
        db: &sled::Db,
    ) -> Result<IntervalTreeStore<K, SledStore<IntervalTreeNode<K>>>> {
        let rows = SledStore::open(db)?.with_flush_on_commit(self.flush_on_commit);
        Ok(IntervalTreeStore::new(rows, self.tree_type.clone()))
    }
}
