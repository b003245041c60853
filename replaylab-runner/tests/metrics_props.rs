//! Property tests for performance aggregation.
//!
//! Arbitrary trade lists must always produce finite metrics, a curve that
//! ends at initial capital plus summed PnL, and bounded ratios.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use replaylab_core::domain::{BarKey, ExitReason, Side, Trade};
use replaylab_runner::{aggregate, PerformanceMetrics};

fn day(n: i64) -> BarKey {
    BarKey::daily(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(n))
}

fn trades_from(pnls: &[(f64, bool)]) -> Vec<Trade> {
    pnls.iter()
        .enumerate()
        .map(|(i, &(pnl, long))| {
            let entry = 100.0;
            let shares = 10.0;
            let move_per_share = pnl / shares;
            let exit = if long { entry + move_per_share } else { entry - move_per_share };
            let i = i as i64;
            Trade {
                symbol: "ETH".into(),
                side: if long { Side::Long } else { Side::Short },
                entry_bar: (i * 3) as usize,
                entry_date: day(i * 3),
                entry,
                exit_bar: (i * 3 + 2) as usize,
                exit_date: day(i * 3 + 2),
                exit,
                exit_reason: ExitReason::Target,
                shares,
                pnl,
                return_percent: pnl / (entry * shares) * 100.0,
                holding_period_days: 2.0,
                packet_id: format!("p{i}"),
                signal_score: None,
                stop_price: 95.0,
                target_price: 105.0,
                excursion: None,
            }
        })
        .collect()
}

fn finite(m: &PerformanceMetrics) -> bool {
    [
        m.win_rate_pct,
        m.total_return_pct,
        m.final_equity,
        m.max_drawdown_pct,
        m.sharpe,
        m.sortino,
        m.calmar,
        m.profit_factor,
        m.avg_win,
        m.avg_loss,
        m.avg_return_pct,
        m.cagr_pct,
        m.volatility_pct,
        m.time_in_market_pct,
        m.avg_holding_days,
    ]
    .iter()
    .all(|v| v.is_finite())
}

proptest! {
    #[test]
    fn metrics_are_always_finite_and_bounded(
        pnls in prop::collection::vec((-900.0..900.0_f64, any::<bool>()), 0..30),
    ) {
        let trades = trades_from(&pnls);
        let n = (pnls.len() as i64 * 3 + 3).max(20);
        let keys: Vec<BarKey> = (0..n).map(day).collect();
        let result = aggregate(trades, &keys, 10_000.0);
        let m = &result.metrics;

        prop_assert!(finite(m), "non-finite metric in {:?}", m);
        prop_assert!(m.profit_factor >= 0.0 && m.profit_factor <= 100.0);
        prop_assert!(m.win_rate_pct >= 0.0 && m.win_rate_pct <= 100.0);
        prop_assert!(m.max_drawdown_pct >= 0.0 && m.max_drawdown_pct <= 100.0);
        prop_assert!(m.time_in_market_pct <= 100.0);
        prop_assert_eq!(m.total_trades, pnls.len());
        prop_assert_eq!(result.equity_curve.len(), pnls.len() + 1);

        let expected = 10_000.0 + pnls.iter().map(|(p, _)| p).sum::<f64>();
        prop_assert!((m.final_equity - expected).abs() < 1e-6);
    }

    #[test]
    fn winners_plus_losers_never_exceed_total(
        pnls in prop::collection::vec((-500.0..500.0_f64, any::<bool>()), 0..30),
    ) {
        let keys: Vec<BarKey> = (0..100).map(day).collect();
        let m = aggregate(trades_from(&pnls), &keys, 5_000.0).metrics;
        prop_assert!(m.winning_trades + m.losing_trades <= m.total_trades);
        prop_assert!(m.max_consecutive_wins <= m.winning_trades);
        prop_assert!(m.max_consecutive_losses <= m.total_trades - m.winning_trades);
    }
}
