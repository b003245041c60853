//! The replay state machine.
//!
//! Walks one pre-aligned series bar by bar from index 1, holding at most one
//! position. Per bar the exit check runs first (stop, then target, then
//! signal flip); a flat engine then takes the bar's qualifying signal, so a
//! flip closes the old position and opens the reverse one on the same bar.
//! A position is never exit-checked on its own entry bar.

use std::collections::BTreeMap;

use super::qualify::{qualify, QualifiedSignal};
use super::state::{
    EngineConfig, EngineError, NoDataReason, OpenPosition, PositionState, ReplayOutcome,
    ReplayStats, CAPITAL_DEPLOYMENT_FRACTION, MIN_BARS,
};
use crate::domain::{BarKey, ExitReason, PriceSeries, SeriesColumns, Side, Trade};
use crate::signals::LoadedSnapshots;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Replay `loaded` snapshots over `series` (already filtered to the window).
pub fn run_replay_engine(
    series: &PriceSeries,
    loaded: &LoadedSnapshots,
    config: &EngineConfig,
) -> Result<ReplayOutcome, EngineError> {
    if !(config.initial_capital.is_finite() && config.initial_capital > 0.0) {
        return Err(EngineError::InvalidCapital {
            capital: config.initial_capital,
        });
    }
    if series.len() < MIN_BARS {
        return Err(EngineError::InsufficientMarketData {
            symbol: config.symbol.clone(),
            bars: series.len(),
            required: MIN_BARS,
            start: config.start,
            end: config.end,
        });
    }

    let cols = series.columns();
    let mut stats = ReplayStats {
        total_snapshots: loaded.snapshots.len(),
        dropped_invalid: loaded.dropped,
        ..ReplayStats::default()
    };
    let signals = qualify(
        &cols.keys,
        series.kind(),
        &loaded.snapshots,
        config.min_signal_score,
        &mut stats,
    );
    if stats.rejected() > 0 || stats.superseded_same_bar > 0 {
        tracing::info!(
            symbol = %config.symbol,
            qualified = stats.qualified,
            rejected_by_score = stats.rejected_by_score,
            rejected_by_neutral_bias = stats.rejected_by_neutral_bias,
            rejected_by_out_of_range = stats.rejected_by_out_of_range,
            superseded = stats.superseded_same_bar,
            "signal qualification"
        );
    }

    let trades = walk(&cols, &signals, config);

    let no_data_reason = if loaded.snapshots.is_empty() {
        Some(NoDataReason::NoSnapshots {
            symbol: config.symbol.clone(),
            start: config.start,
            end: config.end,
            dropped_invalid: loaded.dropped,
        })
    } else if signals.is_empty() {
        Some(NoDataReason::NoneQualified {
            total: stats.total_snapshots,
            min_signal_score: config.min_signal_score,
            rejected_by_score: stats.rejected_by_score,
            rejected_by_neutral_bias: stats.rejected_by_neutral_bias,
            rejected_by_out_of_range: stats.rejected_by_out_of_range,
        })
    } else {
        None
    };

    Ok(ReplayOutcome {
        trades,
        stats,
        no_data_reason,
        bars: cols.len(),
    })
}

fn walk(
    cols: &SeriesColumns,
    signals: &BTreeMap<usize, QualifiedSignal>,
    config: &EngineConfig,
) -> Vec<Trade> {
    let n = cols.len();
    let mut state = PositionState::NoPosition;
    let mut trades = Vec::new();

    for i in 1..n {
        let signal = signals.get(&i);

        if let Some(pos) = state.position() {
            if let Some((exit, reason)) = check_exit(pos, cols, i, signal) {
                if let Some(pos) = state.take() {
                    trades.push(close(pos, i, &cols.keys[i], exit, reason, config));
                }
            }
        }

        if state.is_flat() {
            if let Some(sig) = signal {
                if let Some(pos) = open(sig, cols, i, config) {
                    state = PositionState::open(pos);
                }
            }
        }
    }

    if let Some(pos) = state.take() {
        let last = n - 1;
        tracing::debug!(
            symbol = %config.symbol,
            entry = %pos.entry_date,
            "closing open position at end of data"
        );
        trades.push(close(
            pos,
            last,
            &cols.keys[last],
            cols.closes[last],
            ExitReason::EndOfData,
            config,
        ));
    }
    trades
}

/// Exit priority: stop, target, opposing signal. First match wins.
fn check_exit(
    pos: &OpenPosition,
    cols: &SeriesColumns,
    i: usize,
    signal: Option<&QualifiedSignal>,
) -> Option<(f64, ExitReason)> {
    let (high, low) = (cols.highs[i], cols.lows[i]);
    let (stop_hit, target_hit) = match pos.side {
        Side::Long => (low <= pos.stop_price, high >= pos.target_price),
        Side::Short => (high >= pos.stop_price, low <= pos.target_price),
    };
    if stop_hit {
        return Some((pos.stop_price, ExitReason::Stop));
    }
    if target_hit {
        return Some((pos.target_price, ExitReason::Target));
    }
    match signal {
        Some(sig) if sig.side == pos.side.opposite() => {
            Some((cols.closes[i], ExitReason::SignalFlip))
        }
        _ => None,
    }
}

fn open(
    sig: &QualifiedSignal,
    cols: &SeriesColumns,
    i: usize,
    config: &EngineConfig,
) -> Option<OpenPosition> {
    let snap = &sig.snapshot;
    let entry = snap.entry_zone.unwrap_or(cols.closes[i]);
    if !(entry.is_finite() && entry > 0.0) {
        tracing::warn!(
            packet_id = %snap.packet_id,
            entry,
            "skipping signal without a usable entry price"
        );
        return None;
    }
    Some(OpenPosition {
        side: sig.side,
        entry_price: entry,
        entry_bar: i,
        entry_date: cols.keys[i].clone(),
        stop_price: snap
            .invalidation
            .unwrap_or_else(|| config.policy.fallback_stop(sig.side, entry)),
        target_price: snap
            .first_target()
            .unwrap_or_else(|| config.policy.fallback_target(sig.side, entry)),
        packet_id: snap.packet_id.clone(),
        signal_score: snap.signal_score,
    })
}

fn close(
    pos: OpenPosition,
    exit_bar: usize,
    exit_date: &BarKey,
    exit: f64,
    reason: ExitReason,
    config: &EngineConfig,
) -> Trade {
    let shares = CAPITAL_DEPLOYMENT_FRACTION * config.initial_capital / pos.entry_price;
    let sign = pos.side.sign();
    let held = exit_date.timestamp() - pos.entry_date.timestamp();

    Trade {
        symbol: config.symbol.clone(),
        side: pos.side,
        entry_bar: pos.entry_bar,
        entry_date: pos.entry_date,
        entry: pos.entry_price,
        exit_bar,
        exit_date: exit_date.clone(),
        exit,
        exit_reason: reason,
        shares,
        pnl: sign * (exit - pos.entry_price) * shares,
        return_percent: sign * (exit - pos.entry_price) / pos.entry_price * 100.0,
        holding_period_days: held.num_seconds() as f64 / SECONDS_PER_DAY,
        packet_id: pos.packet_id,
        signal_score: pos.signal_score,
        stop_price: pos.stop_price,
        target_price: pos.target_price,
        excursion: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BarKind, Bias, PriceBar, SignalSnapshot};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn day(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(i as i64)
    }

    /// Flat series at 100 with a 1-point range.
    fn flat(n: usize) -> PriceSeries {
        PriceSeries::from_bars(
            BarKind::Daily,
            (0..n).map(|i| {
                (
                    BarKey::daily(day(i)),
                    PriceBar {
                        open: 100.0,
                        high: 100.5,
                        low: 99.5,
                        close: 100.0,
                        volume: 1_000.0,
                    },
                )
            }),
        )
    }

    fn set_bar(s: &mut PriceSeries, i: usize, high: f64, low: f64, close: f64) {
        s.insert(
            BarKey::daily(day(i)),
            PriceBar {
                open: close,
                high,
                low,
                close,
                volume: 1_000.0,
            },
        );
    }

    fn snap(id: &str, bar: usize, bias: Bias, score: f64) -> SignalSnapshot {
        let d = day(bar);
        SignalSnapshot {
            packet_id: id.into(),
            symbol: "SPY".into(),
            signal_source: "scanner".into(),
            signal_score: Some(score),
            bias,
            status: "active".into(),
            created_at: Utc.from_utc_datetime(&d.and_hms_opt(12, 0, 0).unwrap()),
            entry_zone: None,
            invalidation: None,
            targets: vec![],
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            symbol: "SPY".into(),
            start: day(0),
            end: day(30),
            initial_capital: 10_000.0,
            min_signal_score: 50.0,
            policy: Default::default(),
        }
    }

    fn loaded(snapshots: Vec<SignalSnapshot>) -> LoadedSnapshots {
        LoadedSnapshots {
            snapshots,
            dropped: 0,
        }
    }

    #[test]
    fn explicit_levels_stop_fills_at_stop() {
        let mut s = flat(25);
        set_bar(&mut s, 10, 100.0, 94.0, 96.0);
        let mut sig = snap("p1", 5, Bias::Bullish, 80.0);
        sig.entry_zone = Some(100.0);
        sig.invalidation = Some(95.0);
        sig.targets = vec![110.0];

        let out = run_replay_engine(&s, &loaded(vec![sig]), &config()).unwrap();
        assert_eq!(out.trades.len(), 1);
        let t = &out.trades[0];
        assert_eq!(t.side, Side::Long);
        assert_eq!(t.exit_reason, ExitReason::Stop);
        assert_eq!(t.exit, 95.0);
        assert_eq!(t.entry_bar, 5);
        assert_eq!(t.exit_bar, 10);
        assert!((t.shares - 95.0).abs() < 1e-9);
        assert!((t.pnl - (-475.0)).abs() < 1e-9);
        assert!((t.return_percent - (-5.0)).abs() < 1e-9);
        assert!((t.holding_period_days - 5.0).abs() < 1e-9);
        assert!(out.no_data_reason.is_none());
    }

    #[test]
    fn stop_beats_target_on_the_same_bar() {
        let mut s = flat(25);
        set_bar(&mut s, 7, 103.0, 98.0, 100.0);
        let out =
            run_replay_engine(&s, &loaded(vec![snap("p", 5, Bias::Bullish, 80.0)]), &config())
                .unwrap();
        assert_eq!(out.trades[0].exit_reason, ExitReason::Stop);
        assert!((out.trades[0].exit - 99.0).abs() < 1e-9);
    }

    #[test]
    fn short_fallback_target() {
        let mut s = flat(25);
        set_bar(&mut s, 8, 100.2, 97.5, 98.0);
        let out =
            run_replay_engine(&s, &loaded(vec![snap("p", 5, Bias::Bearish, 80.0)]), &config())
                .unwrap();
        let t = &out.trades[0];
        assert_eq!(t.side, Side::Short);
        assert_eq!(t.exit_reason, ExitReason::Target);
        assert!((t.exit - 98.0).abs() < 1e-9);
        assert!(t.pnl > 0.0);
        assert!(t.return_percent > 0.0);
    }

    #[test]
    fn opposing_signal_flips_and_reverses() {
        let s = flat(25);
        let out = run_replay_engine(
            &s,
            &loaded(vec![
                snap("long", 3, Bias::Bullish, 80.0),
                snap("short", 9, Bias::Bearish, 80.0),
            ]),
            &config(),
        )
        .unwrap();
        assert_eq!(out.trades.len(), 2);
        assert_eq!(out.trades[0].exit_reason, ExitReason::SignalFlip);
        assert_eq!(out.trades[0].exit_bar, 9);
        assert_eq!(out.trades[1].side, Side::Short);
        assert_eq!(out.trades[1].entry_bar, 9);
        assert_eq!(out.trades[1].exit_reason, ExitReason::EndOfData);
        assert_eq!(out.trades[1].exit_bar, 24);
    }

    #[test]
    fn same_direction_signal_while_open_is_ignored() {
        let s = flat(25);
        let out = run_replay_engine(
            &s,
            &loaded(vec![
                snap("a", 3, Bias::Bullish, 80.0),
                snap("b", 6, Bias::Bullish, 90.0),
            ]),
            &config(),
        )
        .unwrap();
        assert_eq!(out.trades.len(), 1);
        assert_eq!(out.trades[0].packet_id, "a");
        assert_eq!(out.stats.qualified, 2);
    }

    #[test]
    fn entry_bar_is_not_exit_checked() {
        // Entry bar itself pierces the fallback stop; the trade survives it
        let mut s = flat(25);
        set_bar(&mut s, 5, 100.5, 90.0, 100.0);
        let out =
            run_replay_engine(&s, &loaded(vec![snap("p", 5, Bias::Bullish, 80.0)]), &config())
                .unwrap();
        assert_eq!(out.trades[0].exit_reason, ExitReason::EndOfData);
    }

    #[test]
    fn zero_snapshots_reports_no_packets() {
        let out = run_replay_engine(&flat(25), &loaded(vec![]), &config()).unwrap();
        assert!(out.trades.is_empty());
        let reason = out.no_data_reason.unwrap().to_string();
        assert!(reason.contains("No decision packets matched"));
    }

    #[test]
    fn all_below_score_reports_filter() {
        let snaps = vec![
            snap("a", 3, Bias::Bullish, 10.0),
            snap("b", 6, Bias::Bearish, 20.0),
        ];
        let out = run_replay_engine(&flat(25), &loaded(snaps), &config()).unwrap();
        assert!(out.trades.is_empty());
        assert_eq!(out.stats.rejected_by_score, 2);
        assert!(matches!(
            out.no_data_reason,
            Some(NoDataReason::NoneQualified { rejected_by_score: 2, .. })
        ));
    }

    #[test]
    fn fewer_than_twenty_bars_fails() {
        let err = run_replay_engine(&flat(19), &loaded(vec![]), &config()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientMarketData { bars: 19, required: 20, .. }
        ));
    }

    #[test]
    fn non_positive_capital_is_rejected() {
        let mut cfg = config();
        cfg.initial_capital = 0.0;
        assert!(matches!(
            run_replay_engine(&flat(25), &loaded(vec![]), &cfg),
            Err(EngineError::InvalidCapital { .. })
        ));
    }
}
