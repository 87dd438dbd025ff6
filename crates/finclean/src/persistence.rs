//! Storage boundary for imported tables.
//!
//! The pipeline only needs "save this table, give me an id back". Durability
//! belongs to whatever implements [`PersistenceSink`]; [`MemorySink`] keeps
//! everything in process.

use std::fmt;

use parking_lot::RwLock;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier handed back by a sink for a stored table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store rejected '{name}': {reason}")]
    Rejected { name: String, reason: String },
}

/// Where imported tables are saved.
///
/// A failing sink never fails the import; the pipeline logs the failure and
/// carries on with the table in memory.
pub trait PersistenceSink: Send + Sync {
    /// Store `table` under `name`. `kind` is the source format (`csv`,
    /// `xlsx`, `json`, ...).
    fn save(&self, table: &DataFrame, name: &str, kind: &str)
    -> Result<RecordId, PersistenceError>;
}

/// A table held by [`MemorySink`].
#[derive(Debug, Clone)]
pub struct StoredTable {
    pub id: RecordId,
    pub name: String,
    pub kind: String,
    pub table: DataFrame,
}

/// In-process sink, mostly useful for tests and the CLI.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: RwLock<Vec<StoredTable>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }

    /// Look up a stored table by id.
    pub fn get(&self, id: &RecordId) -> Option<StoredTable> {
        self.tables.read().iter().find(|t| &t.id == id).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tables.read().iter().map(|t| t.name.clone()).collect()
    }
}

impl PersistenceSink for MemorySink {
    fn save(
        &self,
        table: &DataFrame,
        name: &str,
        kind: &str,
    ) -> Result<RecordId, PersistenceError> {
        let mut tables = self.tables.write();
        let id = RecordId(format!("mem-{}", tables.len() + 1));
        tables.push(StoredTable {
            id: id.clone(),
            name: name.to_string(),
            kind: kind.to_string(),
            table: table.clone(),
        });
        Ok(id)
    }
}
