//! Replay runner — wires the fetch-join, engine, enrichment, metrics and
//! diagnostics together.
//!
//! `run_replay()` is the caller contract. Price feed and signal store are
//! passed in as trait objects so the CLI, tests and benches pick their own.

use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use replaylab_core::data::{DataError, DataSource, PriceFeed};
use replaylab_core::domain::PriceSeries;
use replaylab_core::engine::{
    enrich, run_replay_engine, EngineConfig, EngineError, ExitPolicy, NoDataReason, ReplayMode,
    ReplayStats,
};
use replaylab_core::signals::{load_snapshots, SignalQuery, SignalStore, SourceFilter, StoreError};
use replaylab_core::Timeframe;

use crate::config::ConfigError;
use crate::diagnostics::{build_diagnostics, Diagnostics};
use crate::metrics::{aggregate, BacktestResult};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("signal store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

/// One replay request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRequest {
    pub workspace_id: String,
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub timeframe: Timeframe,
    pub initial_capital: f64,
    pub min_signal_score: f64,
    pub mode: ReplayMode,
    pub sources: SourceFilter,
    pub policy: ExitPolicy,
}

impl ReplayRequest {
    pub fn validate(&self) -> Result<(), RunError> {
        if self.symbol.trim().is_empty() {
            return Err(RunError::InvalidRequest("symbol is empty".into()));
        }
        if self.start > self.end {
            return Err(RunError::InvalidRequest(format!(
                "start {} is after end {}",
                self.start, self.end
            )));
        }
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(RunError::InvalidRequest(format!(
                "initial capital must be positive, got {}",
                self.initial_capital
            )));
        }
        Ok(())
    }

    fn signal_query(&self) -> SignalQuery {
        SignalQuery::new(
            self.workspace_id.clone(),
            &self.symbol,
            self.start,
            self.end,
            self.sources.clone(),
        )
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            symbol: self.symbol.clone(),
            start: self.start,
            end: self.end,
            initial_capital: self.initial_capital,
            min_signal_score: self.min_signal_score,
            policy: self.policy,
        }
    }
}

/// Complete result of a single replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: String,
    pub dataset_hash: String,
    pub request: ReplayRequest,
    pub data_source: DataSource,
    /// Upstream requests issued by the price feed.
    pub upstream_requests: usize,
    pub bar_count: usize,
    pub result: BacktestResult,
    pub stats: ReplayStats,
    /// Set whenever the run produced no trades for a reportable reason.
    pub no_data_reason: Option<NoDataReason>,
    pub diagnostics: Diagnostics,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Run a replay end to end.
///
/// Prices and signal snapshots are fetched concurrently; the engine starts
/// only once both have arrived. Any fetch or engine error is terminal.
pub fn run_replay(
    request: &ReplayRequest,
    feed: &dyn PriceFeed,
    store: &dyn SignalStore,
) -> Result<ReplayReport, RunError> {
    request.validate()?;
    tracing::info!(
        symbol = %request.symbol,
        start = %request.start,
        end = %request.end,
        timeframe = %request.timeframe.label,
        mode = request.mode.as_str(),
        feed = feed.name(),
        "starting replay"
    );

    let query = request.signal_query();
    let (prices, signals) = rayon::join(
        || {
            let started = Instant::now();
            let fetched =
                feed.fetch(&request.symbol, &request.timeframe, request.start, request.end);
            let elapsed_ms = started.elapsed().as_millis() as u64;
            tracing::info!(elapsed_ms, "price fetch finished");
            fetched
        },
        || {
            let started = Instant::now();
            let loaded = load_snapshots(store, &query);
            let elapsed_ms = started.elapsed().as_millis() as u64;
            tracing::info!(elapsed_ms, "signal load finished");
            loaded
        },
    );
    let fetched = prices?;
    let loaded = signals?;

    let series = fetched.series.between_dates(request.start, request.end);
    let dataset_hash = compute_dataset_hash(&series);

    let outcome = run_replay_engine(&series, &loaded, &request.engine_config())?;
    if let Some(reason) = &outcome.no_data_reason {
        tracing::warn!(%reason, "replay produced no trades");
    }

    let cols = series.columns();
    let trades = enrich(outcome.trades, &cols.keys, &cols.highs, &cols.lows);
    let result = aggregate(trades, &cols.keys, request.initial_capital);
    let diagnostics = build_diagnostics(
        &result.trades,
        &cols.keys,
        request.start,
        request.end,
        &outcome.stats,
        fetched.source,
    );
    let run_id = compute_run_id(request, &dataset_hash)?;

    tracing::info!(
        run_id = %short_id(&run_id),
        trades = result.trades.len(),
        total_return_pct = result.metrics.total_return_pct,
        "replay finished"
    );

    Ok(ReplayReport {
        schema_version: SCHEMA_VERSION,
        run_id,
        dataset_hash,
        request: request.clone(),
        data_source: fetched.source,
        upstream_requests: fetched.requests,
        bar_count: series.len(),
        result,
        stats: outcome.stats,
        no_data_reason: outcome.no_data_reason,
        diagnostics,
    })
}

/// BLAKE3 over every bar of the (date-filtered) series.
pub fn compute_dataset_hash(series: &PriceSeries) -> String {
    let mut hasher = blake3::Hasher::new();
    for (key, bar) in series.iter() {
        hasher.update(key.as_str().as_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Deterministic id for (request, dataset): equal ids mean equal inputs.
pub fn compute_run_id(request: &ReplayRequest, dataset_hash: &str) -> Result<String, RunError> {
    let json = serde_json::to_vec(request)
        .map_err(|e| RunError::InvalidRequest(format!("request is not serializable: {e}")))?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(&json);
    hasher.update(dataset_hash.as_bytes());
    Ok(hasher.finalize().to_hex().to_string())
}

/// First 12 hex characters, used for directory names and log lines.
pub fn short_id(id: &str) -> &str {
    &id[..id.len().min(12)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use replaylab_core::domain::{BarKey, BarKind, PriceBar};

    fn series(n: i64, close: f64) -> PriceSeries {
        let d0 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        PriceSeries::from_bars(
            BarKind::Daily,
            (0..n).map(|i| {
                (
                    BarKey::daily(d0 + chrono::Duration::days(i)),
                    PriceBar {
                        open: close,
                        high: close + 1.0,
                        low: close - 1.0,
                        close,
                        volume: 1.0,
                    },
                )
            }),
        )
    }

    fn request() -> ReplayRequest {
        ReplayRequest {
            workspace_id: "ws".into(),
            symbol: "SPY".into(),
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            timeframe: Timeframe::parse("1d").unwrap(),
            initial_capital: 10_000.0,
            min_signal_score: 50.0,
            mode: ReplayMode::Scanner,
            sources: SourceFilter::default(),
            policy: ExitPolicy::default(),
        }
    }

    #[test]
    fn dataset_hash_is_deterministic_and_sensitive() {
        let a = compute_dataset_hash(&series(30, 100.0));
        assert_eq!(a, compute_dataset_hash(&series(30, 100.0)));
        assert_ne!(a, compute_dataset_hash(&series(30, 100.5)));
        assert_ne!(a, compute_dataset_hash(&series(31, 100.0)));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn run_id_changes_with_request() {
        let req = request();
        let id = compute_run_id(&req, "abc").unwrap();
        assert_eq!(id, compute_run_id(&req, "abc").unwrap());
        assert_ne!(id, compute_run_id(&req, "abd").unwrap());

        let mut other = req.clone();
        other.min_signal_score = 60.0;
        assert_ne!(id, compute_run_id(&other, "abc").unwrap());
    }

    #[test]
    fn validation_rejects_bad_requests() {
        let mut req = request();
        req.end = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert!(matches!(req.validate(), Err(RunError::InvalidRequest(_))));

        let mut req = request();
        req.initial_capital = f64::NAN;
        assert!(matches!(req.validate(), Err(RunError::InvalidRequest(_))));

        let mut req = request();
        req.symbol = "  ".into();
        assert!(matches!(req.validate(), Err(RunError::InvalidRequest(_))));
    }

    #[test]
    fn short_id_truncates() {
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }
}
