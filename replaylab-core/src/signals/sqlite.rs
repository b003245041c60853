//! SQLite-backed signal store over the `decision_packets` table.

use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OpenFlags};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Mutex;

use super::query::SignalQuery;
use super::store::{SignalStore, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS decision_packets (
    packet_id     TEXT PRIMARY KEY,
    workspace_id  TEXT NOT NULL,
    symbol        TEXT NOT NULL,
    signal_source TEXT,
    created_at    TEXT NOT NULL,
    payload       TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_decision_packets_ws_symbol
    ON decision_packets (workspace_id, symbol, created_at);
";

pub struct SqliteSignalStore {
    conn: Mutex<Connection>,
}

impl SqliteSignalStore {
    /// Open an existing database read-only.
    pub fn open_read_only(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open (creating if needed) a writable database with the packet schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace one packet. `payload` holds score, bias and levels.
    pub fn insert_packet(
        &self,
        packet_id: &str,
        workspace_id: &str,
        symbol: &str,
        signal_source: &str,
        created_at: &str,
        payload: &Value,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO decision_packets
                (packet_id, workspace_id, symbol, signal_source, created_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                packet_id,
                workspace_id,
                symbol,
                signal_source,
                created_at,
                serde_json::to_string(payload)?
            ],
        )?;
        Ok(())
    }
}

/// Build the WHERE clause and its parameters for `query`.
fn build_filter(query: &SignalQuery) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

    clauses.push("workspace_id = ?".into());
    params_vec.push(Box::new(query.workspace_id.clone()));

    let marks = vec!["?"; query.symbols.len()].join(", ");
    clauses.push(format!("UPPER(symbol) IN ({marks})"));
    for s in &query.symbols {
        params_vec.push(Box::new(s.clone()));
    }

    clauses.push("date(created_at) BETWEEN ? AND ?".into());
    params_vec.push(Box::new(query.start.format("%Y-%m-%d").to_string()));
    params_vec.push(Box::new(query.end.format("%Y-%m-%d").to_string()));

    let mut source_terms: Vec<String> = Vec::new();
    if !query.sources.exact.is_empty() {
        let marks = vec!["?"; query.sources.exact.len()].join(", ");
        source_terms.push(format!("signal_source IN ({marks})"));
        for e in &query.sources.exact {
            params_vec.push(Box::new(e.clone()));
        }
    }
    for p in &query.sources.patterns {
        source_terms.push("signal_source LIKE ?".into());
        params_vec.push(Box::new(p.clone()));
    }
    if !source_terms.is_empty() {
        clauses.push(format!("({})", source_terms.join(" OR ")));
    }

    (clauses.join(" AND "), params_vec)
}

impl SignalStore for SqliteSignalStore {
    fn query(&self, query: &SignalQuery) -> Result<Vec<Value>, StoreError> {
        if query.symbols.is_empty() {
            return Ok(Vec::new());
        }
        let (where_sql, params_vec) = build_filter(query);
        let sql = format!(
            "SELECT packet_id, workspace_id, symbol, signal_source, created_at, payload
             FROM decision_packets
             WHERE {where_sql}
             ORDER BY datetime(created_at), rowid"
        );
        let refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(refs.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (packet_id, workspace_id, symbol, source, created_at, payload) = row?;
            let mut record = match payload.as_deref().map(serde_json::from_str::<Value>) {
                Some(Ok(Value::Object(map))) => map,
                Some(_) => {
                    tracing::debug!(packet_id = %packet_id, "packet payload is not a JSON object");
                    Map::new()
                }
                None => Map::new(),
            };
            record.insert("packet_id".into(), Value::String(packet_id));
            record.insert("workspace_id".into(), Value::String(workspace_id));
            record.insert("symbol".into(), Value::String(symbol));
            record.insert(
                "signal_source".into(),
                source.map(Value::String).unwrap_or(Value::Null),
            );
            record.insert("created_at".into(), Value::String(created_at));
            out.push(Value::Object(record));
        }
        tracing::debug!(count = out.len(), "decision packets selected");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::query::SourceFilter;
    use chrono::NaiveDate;
    use serde_json::json;

    fn seeded() -> SqliteSignalStore {
        let store = SqliteSignalStore::in_memory().unwrap();
        let rows = [
            ("p1", "ws", "BTCUSDT", "scanner", "2024-01-05T10:00:00Z"),
            ("p2", "ws", "btc", "confluence", "2024-01-03 09:00:00"),
            ("p3", "ws", "BTC", "options_flow", "2024-02-01"),
            ("p4", "other", "BTC", "scanner", "2024-01-04"),
            ("p5", "ws", "ETH", "scanner", "2024-01-04"),
        ];
        for (id, ws, sym, src, at) in rows {
            let payload = json!({"bias": "bullish", "signal_score": 70});
            store.insert_packet(id, ws, sym, src, at, &payload).unwrap();
        }
        store
    }

    fn query(sources: SourceFilter) -> SignalQuery {
        SignalQuery::new(
            "ws",
            "BTC-USD",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            sources,
        )
    }

    #[test]
    fn selects_symbol_family_in_workspace_and_range() {
        let rows = seeded().query(&query(SourceFilter::default())).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r["packet_id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["p2", "p1"]);
        // Payload fields are merged into the record
        assert_eq!(rows[0]["bias"], "bullish");
        assert_eq!(rows[0]["signal_source"], "confluence");
    }

    #[test]
    fn exact_and_pattern_sources_are_ored() {
        let rows = seeded()
            .query(&query(SourceFilter {
                exact: vec!["confluence".into()],
                patterns: vec!["SCAN%".into()],
            }))
            .unwrap();
        assert_eq!(rows.len(), 2);

        let rows = seeded()
            .query(&query(SourceFilter {
                exact: vec!["confluence".into()],
                patterns: vec![],
            }))
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn file_database_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.db");
        {
            let store = SqliteSignalStore::open(&path).unwrap();
            store
                .insert_packet("p1", "ws", "BTC", "scanner", "2024-01-10", &json!({}))
                .unwrap();
        }
        let ro = SqliteSignalStore::open_read_only(&path).unwrap();
        assert_eq!(ro.query(&query(SourceFilter::default())).unwrap().len(), 1);
    }
}
