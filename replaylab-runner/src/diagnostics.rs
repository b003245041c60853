//! Post-hoc diagnostics: strategy direction and a data validation summary.
//!
//! Nothing here can fail a run. Anything odd becomes a warning string.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use replaylab_core::data::DataSource;
use replaylab_core::domain::{BarKey, ExitReason, Side, Trade};
use replaylab_core::engine::ReplayStats;

/// Share of trades on one side needed to call a strategy biased.
pub const DIRECTION_THRESHOLD: f64 = 0.7;

/// Gaps longer than this between consecutive bars are reported.
const MAX_QUIET_GAP_DAYS: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyDirection {
    LongBiased,
    ShortBiased,
    Mixed,
    NoTrades,
}

impl StrategyDirection {
    pub fn label(self) -> &'static str {
        match self {
            StrategyDirection::LongBiased => "long-biased",
            StrategyDirection::ShortBiased => "short-biased",
            StrategyDirection::Mixed => "mixed",
            StrategyDirection::NoTrades => "no trades",
        }
    }
}

/// Dominant direction from realized trade sides.
pub fn infer_direction(trades: &[Trade]) -> StrategyDirection {
    if trades.is_empty() {
        return StrategyDirection::NoTrades;
    }
    let longs = trades.iter().filter(|t| t.side == Side::Long).count() as f64;
    let share = longs / trades.len() as f64;
    if share >= DIRECTION_THRESHOLD {
        StrategyDirection::LongBiased
    } else if 1.0 - share >= DIRECTION_THRESHOLD {
        StrategyDirection::ShortBiased
    } else {
        StrategyDirection::Mixed
    }
}

/// Bar coverage actually used against what was requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub requested_start: NaiveDate,
    pub requested_end: NaiveDate,
    pub first_bar: Option<BarKey>,
    pub last_bar: Option<BarKey>,
    pub bars_used: usize,
    /// Calendar days with at least one bar.
    pub days_covered: usize,
    pub days_requested: usize,
    pub coverage_pct: f64,
    pub largest_gap_days: i64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub direction: StrategyDirection,
    pub long_trades: usize,
    pub short_trades: usize,
    pub exit_reasons: BTreeMap<String, usize>,
    pub validation: ValidationSummary,
}

/// Assemble diagnostics for one replay.
pub fn build_diagnostics(
    trades: &[Trade],
    bar_keys: &[BarKey],
    start: NaiveDate,
    end: NaiveDate,
    stats: &ReplayStats,
    source: DataSource,
) -> Diagnostics {
    let mut exit_reasons = BTreeMap::new();
    for t in trades {
        *exit_reasons.entry(t.exit_reason.as_str().to_string()).or_insert(0) += 1;
    }
    let long_trades = trades.iter().filter(|t| t.side == Side::Long).count();

    let mut validation = validate_coverage(bar_keys, start, end);
    if stats.dropped_invalid > 0 {
        validation.warnings.push(format!(
            "{} decision packets were dropped as malformed",
            stats.dropped_invalid
        ));
    }
    if stats.rejected_by_out_of_range > 0 {
        validation.warnings.push(format!(
            "{} signals fell outside the usable bar range",
            stats.rejected_by_out_of_range
        ));
    }
    if trades.last().map(|t| t.exit_reason) == Some(ExitReason::EndOfData) {
        validation
            .warnings
            .push("last position was force-closed at end of data".into());
    }
    if source == DataSource::Synthetic {
        validation
            .warnings
            .push("prices are SYNTHETIC; results are not market results".into());
    }

    Diagnostics {
        direction: infer_direction(trades),
        long_trades,
        short_trades: trades.len() - long_trades,
        exit_reasons,
        validation,
    }
}

/// Compare the bars actually present with the requested window.
pub fn validate_coverage(
    bar_keys: &[BarKey],
    start: NaiveDate,
    end: NaiveDate,
) -> ValidationSummary {
    let days_requested = ((end - start).num_days() + 1).max(0) as usize;
    let mut days: Vec<NaiveDate> = bar_keys.iter().map(|k| k.date()).collect();
    days.dedup();
    let days_covered = days.len();
    let largest_gap_days = days
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days())
        .max()
        .unwrap_or(0);

    let mut warnings = Vec::new();
    if let Some(first) = days.first() {
        if (*first - start).num_days() > MAX_QUIET_GAP_DAYS {
            warnings.push(format!("first bar {first} starts well after requested start {start}"));
        }
    }
    if let Some(last) = days.last() {
        if (end - *last).num_days() > MAX_QUIET_GAP_DAYS {
            warnings.push(format!("last bar {last} ends well before requested end {end}"));
        }
    }
    if largest_gap_days > MAX_QUIET_GAP_DAYS {
        warnings.push(format!("largest gap between bars is {largest_gap_days} days"));
    }

    let coverage_pct = if days_requested == 0 {
        0.0
    } else {
        (days_covered as f64 / days_requested as f64 * 100.0).min(100.0)
    };

    ValidationSummary {
        requested_start: start,
        requested_end: end,
        first_bar: bar_keys.first().cloned(),
        last_bar: bar_keys.last().cloned(),
        bars_used: bar_keys.len(),
        days_covered,
        days_requested,
        coverage_pct,
        largest_gap_days,
        warnings,
    }
}
