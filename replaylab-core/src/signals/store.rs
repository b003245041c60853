//! Signal store boundary.
//!
//! Stores hand back loosely-typed JSON records; turning them into
//! [`crate::domain::SignalSnapshot`] is the loader's job.

use serde_json::Value;
use std::path::Path;
use thiserror::Error;

use super::loader::parse_timestamp;
use super::query::SignalQuery;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("signal store database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("signal store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("signal store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("signal file has unexpected shape: {0}")]
    Shape(String),

    #[error("signal store connection lock poisoned")]
    LockPoisoned,
}

/// Read-only source of recorded decision packets.
pub trait SignalStore: Send + Sync {
    fn query(&self, query: &SignalQuery) -> Result<Vec<Value>, StoreError>;
}

/// First present string field among `keys`.
pub(crate) fn str_field<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| record.get(*k).and_then(Value::as_str))
}

/// In-memory store with the same filtering semantics as the SQLite store.
///
/// Records without a workspace id are visible from every workspace.
#[derive(Debug, Clone, Default)]
pub struct MemorySignalStore {
    records: Vec<Value>,
}

impl MemorySignalStore {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }

    /// Load a JSON array of packets, or an object with a `packets` array.
    pub fn from_json_file(path: &Path) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)?;
        let records = match value {
            Value::Array(items) => items,
            Value::Object(mut obj) => match obj.remove("packets") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(StoreError::Shape(
                        "expected an array or an object with a 'packets' array".into(),
                    ))
                }
            },
            _ => return Err(StoreError::Shape("expected a JSON array".into())),
        };
        Ok(Self { records })
    }

    pub fn push(&mut self, record: Value) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn admits(query: &SignalQuery, record: &Value) -> bool {
        if let Some(ws) = str_field(record, &["workspace_id", "workspaceId"]) {
            if ws != query.workspace_id {
                return false;
            }
        }
        let symbol_ok = str_field(record, &["symbol"])
            .map(|s| query.matches_symbol(s))
            .unwrap_or(false);
        if !symbol_ok {
            return false;
        }
        let date_ok = record
            .get("created_at")
            .or_else(|| record.get("createdAt"))
            .and_then(parse_timestamp)
            .map(|at| query.covers(at.date_naive()))
            .unwrap_or(false);
        if !date_ok {
            return false;
        }
        let source = str_field(record, &["signal_source", "signalSource"]).unwrap_or("");
        query.sources.matches(source)
    }
}

impl SignalStore for MemorySignalStore {
    fn query(&self, query: &SignalQuery) -> Result<Vec<Value>, StoreError> {
        let mut hits: Vec<&Value> = self
            .records
            .iter()
            .filter(|r| Self::admits(query, r))
            .collect();
        // Stable: records with equal timestamps keep insertion order
        hits.sort_by_key(|r| {
            r.get("created_at")
                .or_else(|| r.get("createdAt"))
                .and_then(parse_timestamp)
        });
        Ok(hits.into_iter().cloned().collect())
    }
}
