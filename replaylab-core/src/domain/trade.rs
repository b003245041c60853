//! Trade — a completed round-trip with full traceability.

use serde::{Deserialize, Serialize};

use super::bar::BarKey;

/// Direction of an open position or closed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// +1.0 for long, -1.0 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Stop,
    Target,
    SignalFlip,
    EndOfData,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::Stop => "stop",
            ExitReason::Target => "target",
            ExitReason::SignalFlip => "signal_flip",
            ExitReason::EndOfData => "end_of_data",
        }
    }
}

/// Best and worst prices seen while a trade was open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Excursion {
    /// Most favorable price (highest high for longs, lowest low for shorts).
    pub best_price: f64,
    /// Most adverse price (lowest low for longs, highest high for shorts).
    pub worst_price: f64,
    /// Maximum favorable excursion, percent of entry (>= 0).
    pub mfe_pct: f64,
    /// Maximum adverse excursion, percent of entry (<= 0).
    pub mae_pct: f64,
    /// Bars scanned, entry and exit inclusive.
    pub bars_scanned: usize,
}

/// A closed round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    // ── Identification ──
    pub symbol: String,
    pub side: Side,

    // ── Entry ──
    pub entry_bar: usize,
    pub entry_date: BarKey,
    pub entry: f64,

    // ── Exit ──
    pub exit_bar: usize,
    pub exit_date: BarKey,
    pub exit: f64,
    pub exit_reason: ExitReason,

    // ── Size and PnL ──
    pub shares: f64,
    /// Absolute PnL in account currency.
    #[serde(rename = "return")]
    pub pnl: f64,
    /// Price move in percent, signed by side.
    pub return_percent: f64,

    // ── Duration ──
    pub holding_period_days: f64,

    // ── Signal traceability ──
    pub packet_id: String,
    pub signal_score: Option<f64>,
    pub stop_price: f64,
    pub target_price: f64,

    // ── Enrichment ──
    #[serde(default)]
    pub excursion: Option<Excursion>,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_helpers() {
        assert_eq!(Side::Long.opposite(), Side::Short);
        assert_eq!(Side::Short.sign(), -1.0);
    }

    #[test]
    fn exit_reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&ExitReason::SignalFlip).unwrap(),
            "\"signal_flip\""
        );
        assert_eq!(ExitReason::EndOfData.as_str(), "end_of_data");
    }

    #[test]
    fn trade_serializes_pnl_as_return() {
        let trade = Trade {
            symbol: "SPY".into(),
            side: Side::Long,
            entry_bar: 1,
            entry_date: BarKey::parse("2024-01-02").unwrap(),
            entry: 100.0,
            exit_bar: 3,
            exit_date: BarKey::parse("2024-01-04").unwrap(),
            exit: 102.0,
            exit_reason: ExitReason::Target,
            shares: 950.0,
            pnl: 1_900.0,
            return_percent: 2.0,
            holding_period_days: 2.0,
            packet_id: "p1".into(),
            signal_score: Some(80.0),
            stop_price: 99.0,
            target_price: 102.0,
            excursion: None,
        };
        let json = serde_json::to_value(&trade).unwrap();
        assert_eq!(json["return"], 1_900.0);
        assert_eq!(json["exit_reason"], "target");
        assert!(trade.is_winner());
    }
}
