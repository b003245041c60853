//! Signal snapshot loader.
//!
//! The validation boundary between loosely-typed store records and
//! [`SignalSnapshot`]. Every record is either coerced into the strict shape
//! or dropped and counted; raw JSON never gets past this module.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::query::SignalQuery;
use super::store::{str_field, SignalStore, StoreError};
use crate::domain::{Bias, SignalSnapshot};

/// Snapshots that passed validation, in `created_at` order, plus the
/// number of records dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadedSnapshots {
    pub snapshots: Vec<SignalSnapshot>,
    pub dropped: usize,
}

/// Query `store` and coerce the result.
pub fn load_snapshots(
    store: &dyn SignalStore,
    query: &SignalQuery,
) -> Result<LoadedSnapshots, StoreError> {
    let records = store.query(query)?;
    let loaded = coerce_records(records);
    tracing::info!(
        workspace = %query.workspace_id,
        loaded = loaded.snapshots.len(),
        dropped = loaded.dropped,
        "signal snapshots loaded"
    );
    Ok(loaded)
}

/// Coerce raw records, dropping the ones that do not fit.
pub fn coerce_records(records: Vec<Value>) -> LoadedSnapshots {
    let mut out = LoadedSnapshots::default();
    for record in &records {
        match coerce(record) {
            Ok(snapshot) => out.snapshots.push(snapshot),
            Err(reason) => {
                let id = str_field(record, &["packet_id", "packetId", "id"]).unwrap_or("?");
                tracing::debug!(packet_id = id, reason, "dropping malformed decision packet");
                out.dropped += 1;
            }
        }
    }
    out.snapshots.sort_by_key(|s| s.created_at);
    out
}

/// Coerce one record. The error names the offending field.
pub fn coerce(record: &Value) -> Result<SignalSnapshot, &'static str> {
    if !record.is_object() {
        return Err("record is not an object");
    }
    let packet_id = field(record, &["packet_id", "packetId", "id"])
        .and_then(text)
        .ok_or("packet_id")?;
    let symbol = str_field(record, &["symbol"])
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .ok_or("symbol")?;
    let created_at = field(record, &["created_at", "createdAt"])
        .and_then(parse_timestamp)
        .ok_or("created_at")?;
    let bias = field(record, &["bias", "direction"])
        .and_then(Value::as_str)
        .and_then(parse_bias)
        .ok_or("bias")?;

    let signal_score = match field(record, &["signal_score", "signalScore", "score"]) {
        None | Some(Value::Null) => None,
        Some(v) => Some(number(v).ok_or("signal_score")?),
    };

    Ok(SignalSnapshot {
        packet_id,
        symbol,
        signal_source: str_field(record, &["signal_source", "signalSource", "source"])
            .unwrap_or_default()
            .to_string(),
        signal_score,
        bias,
        status: str_field(record, &["status"]).unwrap_or_default().to_string(),
        created_at,
        entry_zone: field(record, &["entry_zone", "entryZone", "entry"]).and_then(level),
        invalidation: field(record, &["invalidation", "stop", "stop_loss", "stopLoss"])
            .and_then(level),
        targets: field(record, &["targets", "target"])
            .map(targets)
            .unwrap_or_default(),
    })
}

/// Parse `created_at`: RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`
/// or a bare date (midnight UTC). Naive forms are taken as UTC.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

pub fn parse_bias(s: &str) -> Option<Bias> {
    match s.trim().to_ascii_lowercase().as_str() {
        "bullish" | "long" | "buy" => Some(Bias::Bullish),
        "bearish" | "short" | "sell" => Some(Bias::Bearish),
        "neutral" | "flat" | "none" => Some(Bias::Neutral),
        _ => None,
    }
}

fn field<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| record.get(*k))
}

fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn positive(n: f64) -> Option<f64> {
    (n > 0.0).then_some(n)
}

/// A price level: number, numeric string, `{low, high}` (midpoint) or `{price}`.
fn level(v: &Value) -> Option<f64> {
    match v {
        Value::Object(obj) => {
            let low = obj.get("low").and_then(number);
            let high = obj.get("high").and_then(number);
            let mid = match (low, high) {
                (Some(l), Some(h)) => Some((l + h) / 2.0),
                (Some(x), None) | (None, Some(x)) => Some(x),
                (None, None) => obj.get("price").and_then(number),
            };
            mid.and_then(positive)
        }
        other => number(other).and_then(positive),
    }
}

fn targets(v: &Value) -> Vec<f64> {
    match v {
        Value::Array(items) => items.iter().filter_map(level).collect(),
        Value::Null => Vec::new(),
        scalar => level(scalar).into_iter().collect(),
    }
}
