//! Price feed trait and structured error types.
//!
//! The PriceFeed trait abstracts over price sources (Alpha Vantage for
//! equities, Binance for crypto, CSV import, synthetic) so the runner can
//! swap implementations and tests can substitute fixed series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::PriceSeries;
use crate::timeframe::Timeframe;

/// Structured error types for data operations.
///
/// Every variant carries enough context (symbol, range, upstream text) for a
/// caller to render an actionable message. None of them are retried here.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("unsupported timeframe '{input}' (expected e.g. 1m, 5m, 15m, 30m, 1h, 4h, 1d)")]
    UnsupportedTimeframe { input: String },

    #[error("cannot resample {source_minutes}m bars into {target_minutes}m bars: ratio is not an integer")]
    NonIntegerResampleRatio {
        target_minutes: u32,
        source_minutes: u32,
    },

    #[error("invalid symbol '{symbol}': {message}")]
    InvalidSymbol { symbol: String, message: String },

    #[error("rate limited by {provider}: {message}")]
    RateLimited { provider: String, message: String },

    #[error("no data for symbol '{symbol}' between {start} and {end}")]
    NoDataForSymbol {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("unexpected response shape from {provider}: {message}")]
    UnexpectedUpstreamShape { provider: String, message: String },

    #[error("{provider} request failed: {message}")]
    Upstream { provider: String, message: String },

    #[error("pagination for '{symbol}' stopped after {pages} pages (limit or timeout reached)")]
    PaginationTimeout { symbol: String, pages: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Where a series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    AlphaVantage,
    Binance,
    CsvImport,
    Synthetic,
}

/// Result of a successful fetch for a single symbol.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub symbol: String,
    pub series: PriceSeries,
    pub source: DataSource,
    /// Upstream requests issued (pages for paginated feeds).
    pub requests: usize,
}

/// Source of OHLCV series.
///
/// Implementations normalize upstream bars into a [`PriceSeries`] keyed by
/// [`crate::domain::BarKey`] and apply the resampler when the timeframe asks
/// for it. The returned series may extend beyond `[start, end]`; date
/// filtering belongs to the caller.
pub trait PriceFeed: Send + Sync {
    /// Human-readable name of this feed.
    fn name(&self) -> &str;

    fn fetch(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError>;
}
