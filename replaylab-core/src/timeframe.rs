//! Timeframe parsing.
//!
//! Turns a user-supplied timeframe string ("1h", "daily", "scalp") into a
//! [`Timeframe`] descriptor: bar kind, bar width, the width of the raw feed
//! the providers are asked for, and the provider interval codes. Requested
//! widths no provider serves natively (2h, 4h) are fetched at 60 minutes and
//! resampled.

use serde::{Deserialize, Serialize};

use crate::data::provider::DataError;
use crate::domain::BarKind;

pub const MINUTES_PER_DAY: u32 = 1440;

/// Intraday widths both upstreams serve natively, in minutes.
const NATIVE_INTRADAY_MINUTES: &[u32] = &[1, 5, 15, 30, 60];

/// Accepted spellings per canonical timeframe.
const ALIASES: &[(&str, u32, &[&str])] = &[
    ("1m", 1, &["1m", "1min", "1minute"]),
    ("5m", 5, &["5m", "5min", "scalp", "scalping"]),
    ("15m", 15, &["15m", "15min"]),
    ("30m", 30, &["30m", "30min"]),
    ("1h", 60, &["1h", "h", "60m", "60min", "1hour", "hourly"]),
    ("2h", 120, &["2h", "120m", "2hour"]),
    ("4h", 240, &["4h", "240m", "4hour"]),
    ("1d", MINUTES_PER_DAY, &["1d", "d", "d1", "day", "1day", "daily"]),
];

/// Interval codes the two upstream providers understand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIntervals {
    /// Alpha Vantage `function` parameter.
    pub equity_function: String,
    /// Alpha Vantage `interval` parameter (intraday only).
    pub equity_interval: Option<String>,
    /// Binance kline `interval` parameter.
    pub crypto_interval: String,
}

/// Canonical timeframe descriptor. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    /// Canonical label, e.g. "4h".
    pub label: String,
    pub kind: BarKind,
    /// Requested bar width.
    pub minutes: u32,
    /// Width of the raw provider feed.
    pub source_minutes: u32,
    /// `source_minutes < minutes`.
    pub needs_resample: bool,
    pub intervals: ProviderIntervals,
}

impl Timeframe {
    /// Parse a timeframe string. Case and surrounding whitespace are ignored.
    /// Unknown strings fail; there is no default.
    pub fn parse(input: &str) -> Result<Timeframe, DataError> {
        let normalized = input.trim().to_lowercase();
        let (label, minutes) = ALIASES
            .iter()
            .find(|(_, _, aliases)| aliases.contains(&normalized.as_str()))
            .map(|(label, minutes, _)| (*label, *minutes))
            .ok_or_else(|| DataError::UnsupportedTimeframe {
                input: input.to_string(),
            })?;

        let kind = if minutes >= MINUTES_PER_DAY {
            BarKind::Daily
        } else {
            BarKind::Intraday
        };
        let source_minutes = native_source_minutes(minutes);

        Ok(Timeframe {
            label: label.to_string(),
            kind,
            minutes,
            source_minutes,
            needs_resample: source_minutes < minutes,
            intervals: provider_intervals(kind, source_minutes),
        })
    }

    /// Ratio of requested width to feed width.
    pub fn resample_ratio(&self) -> u32 {
        if self.source_minutes == 0 {
            return 1;
        }
        self.minutes / self.source_minutes
    }
}

/// Largest native feed width that evenly divides the requested width.
fn native_source_minutes(minutes: u32) -> u32 {
    if minutes >= MINUTES_PER_DAY {
        return MINUTES_PER_DAY;
    }
    NATIVE_INTRADAY_MINUTES
        .iter()
        .rev()
        .copied()
        .find(|native| *native <= minutes && minutes % native == 0)
        .unwrap_or(1)
}

fn provider_intervals(kind: BarKind, source_minutes: u32) -> ProviderIntervals {
    match kind {
        BarKind::Daily => ProviderIntervals {
            equity_function: "TIME_SERIES_DAILY".into(),
            equity_interval: None,
            crypto_interval: "1d".into(),
        },
        BarKind::Intraday => ProviderIntervals {
            equity_function: "TIME_SERIES_INTRADAY".into(),
            equity_interval: Some(format!("{source_minutes}min")),
            crypto_interval: if source_minutes == 60 {
                "1h".into()
            } else {
                format!("{source_minutes}m")
            },
        },
    }
}
