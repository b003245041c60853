//! Engine configuration, position state, and replay outcome types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::{BarKey, Side, Trade};

/// Fewer aligned bars than this and a replay is refused.
pub const MIN_BARS: usize = 20;

/// Share of initial capital deployed into every position.
pub const CAPITAL_DEPLOYMENT_FRACTION: f64 = 0.95;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(
        "insufficient market data for {symbol}: {bars} bars between {start} and {end}, need at least {required}"
    )]
    InsufficientMarketData {
        symbol: String,
        bars: usize,
        required: usize,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("initial capital must be positive and finite, got {capital}")]
    InvalidCapital { capital: f64 },
}

/// Stop/target levels used when a snapshot carries none.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitPolicy {
    /// Distance of the fallback stop from entry, percent.
    pub fallback_stop_pct: f64,
    /// Distance of the fallback target from entry, percent.
    pub fallback_target_pct: f64,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            fallback_stop_pct: 1.0,
            fallback_target_pct: 2.0,
        }
    }
}

impl ExitPolicy {
    /// Below entry for longs, above for shorts.
    pub fn fallback_stop(&self, side: Side, entry: f64) -> f64 {
        entry * (1.0 - side.sign() * self.fallback_stop_pct / 100.0)
    }

    /// Above entry for longs, below for shorts.
    pub fn fallback_target(&self, side: Side, entry: f64) -> f64 {
        entry * (1.0 + side.sign() * self.fallback_target_pct / 100.0)
    }
}

/// Which family of recorded signals is replayed. A label only; the state
/// machine is identical for every mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    #[default]
    Scanner,
    Options,
    Confluence,
}

impl ReplayMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReplayMode::Scanner => "scanner",
            ReplayMode::Options => "options",
            ReplayMode::Confluence => "confluence",
        }
    }
}

impl std::str::FromStr for ReplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scanner" => Ok(ReplayMode::Scanner),
            "options" => Ok(ReplayMode::Options),
            "confluence" => Ok(ReplayMode::Confluence),
            other => Err(format!("unknown replay mode '{other}'")),
        }
    }
}

/// Configuration for a single replay run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub symbol: String,
    /// Requested window, used in error and no-data messages.
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_capital: f64,
    pub min_signal_score: f64,
    #[serde(default)]
    pub policy: ExitPolicy,
}

/// The single open position of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub side: Side,
    pub entry_price: f64,
    pub entry_bar: usize,
    pub entry_date: BarKey,
    pub stop_price: f64,
    pub target_price: f64,
    pub packet_id: String,
    pub signal_score: Option<f64>,
}

/// Replay state machine states.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PositionState {
    #[default]
    NoPosition,
    LongOpen(OpenPosition),
    ShortOpen(OpenPosition),
}

impl PositionState {
    pub fn open(position: OpenPosition) -> Self {
        match position.side {
            Side::Long => PositionState::LongOpen(position),
            Side::Short => PositionState::ShortOpen(position),
        }
    }

    pub fn position(&self) -> Option<&OpenPosition> {
        match self {
            PositionState::NoPosition => None,
            PositionState::LongOpen(p) | PositionState::ShortOpen(p) => Some(p),
        }
    }

    /// Leave the open state, returning the position that was held.
    pub fn take(&mut self) -> Option<OpenPosition> {
        match std::mem::take(self) {
            PositionState::NoPosition => None,
            PositionState::LongOpen(p) | PositionState::ShortOpen(p) => Some(p),
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::NoPosition)
    }
}

/// Per-run bookkeeping of how snapshots were used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayStats {
    /// Valid snapshots handed to the engine.
    pub total_snapshots: usize,
    /// Snapshots that survived every filter and won their bar.
    pub qualified: usize,
    pub rejected_by_score: usize,
    pub rejected_by_neutral_bias: usize,
    pub rejected_by_out_of_range: usize,
    /// Lost a same-bar tie-break to a higher-scored snapshot.
    pub superseded_same_bar: usize,
    /// Store records that failed validation before reaching the engine.
    pub dropped_invalid: usize,
}

impl ReplayStats {
    pub fn rejected(&self) -> usize {
        self.rejected_by_score + self.rejected_by_neutral_bias + self.rejected_by_out_of_range
    }
}

/// Why a run produced no trades because no signal could drive one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoDataReason {
    /// The store returned nothing usable for the symbol and window.
    NoSnapshots {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
        dropped_invalid: usize,
    },
    /// Snapshots existed but none passed the score/bias/range filters.
    NoneQualified {
        total: usize,
        min_signal_score: f64,
        rejected_by_score: usize,
        rejected_by_neutral_bias: usize,
        rejected_by_out_of_range: usize,
    },
}

impl fmt::Display for NoDataReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoDataReason::NoSnapshots {
                symbol,
                start,
                end,
                dropped_invalid,
            } => {
                write!(
                    f,
                    "No decision packets matched {symbol} between {start} and {end}"
                )?;
                if *dropped_invalid > 0 {
                    write!(f, " ({dropped_invalid} malformed records were dropped)")?;
                }
                Ok(())
            }
            NoDataReason::NoneQualified {
                total,
                min_signal_score,
                rejected_by_score,
                rejected_by_neutral_bias,
                rejected_by_out_of_range,
            } => write!(
                f,
                "{total} decision packets found but none qualified: {rejected_by_score} below the \
                 minimum signal score of {min_signal_score}, {rejected_by_neutral_bias} with neutral \
                 bias, {rejected_by_out_of_range} outside the price series"
            ),
        }
    }
}

/// Everything one replay run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayOutcome {
    pub trades: Vec<Trade>,
    pub stats: ReplayStats,
    pub no_data_reason: Option<NoDataReason>,
    /// Bars the engine walked.
    pub bars: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_levels_bracket_entry() {
        let p = ExitPolicy::default();
        assert!((p.fallback_stop(Side::Long, 100.0) - 99.0).abs() < 1e-9);
        assert!((p.fallback_target(Side::Long, 100.0) - 102.0).abs() < 1e-9);
        assert!((p.fallback_stop(Side::Short, 100.0) - 101.0).abs() < 1e-9);
        assert!((p.fallback_target(Side::Short, 100.0) - 98.0).abs() < 1e-9);
    }

    #[test]
    fn no_data_messages_are_distinguishable() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let none = NoDataReason::NoSnapshots {
            symbol: "SPY".into(),
            start: d,
            end: d,
            dropped_invalid: 0,
        };
        assert!(none.to_string().starts_with("No decision packets matched"));

        let filtered = NoDataReason::NoneQualified {
            total: 3,
            min_signal_score: 50.0,
            rejected_by_score: 3,
            rejected_by_neutral_bias: 0,
            rejected_by_out_of_range: 0,
        };
        assert!(filtered.to_string().contains("minimum signal score"));
        assert_ne!(none.to_string(), filtered.to_string());
    }

    #[test]
    fn state_take_returns_to_no_position() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut s = PositionState::open(OpenPosition {
            side: Side::Short,
            entry_price: 10.0,
            entry_bar: 1,
            entry_date: BarKey::daily(d),
            stop_price: 11.0,
            target_price: 9.0,
            packet_id: "p".into(),
            signal_score: None,
        });
        assert!(matches!(s, PositionState::ShortOpen(_)));
        assert_eq!(s.take().unwrap().side, Side::Short);
        assert!(s.is_flat());
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Options".parse::<ReplayMode>().unwrap(), ReplayMode::Options);
        assert!("swing".parse::<ReplayMode>().is_err());
    }
}
