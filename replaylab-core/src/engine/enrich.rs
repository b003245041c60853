//! Post-replay trade enrichment: excursion metadata.
//!
//! Purely additive. Entry, exit and PnL fields are never touched.

use crate::domain::{BarKey, Excursion, Side, Trade};

/// Annotate each trade with the best/worst prices reached between its entry
/// and exit bars (inclusive).
///
/// Bar indices are trusted only when the key at `entry_bar` matches the
/// trade's entry date; otherwise the entry is located by key. Trades that
/// cannot be located keep `excursion = None`.
pub fn enrich(trades: Vec<Trade>, bar_keys: &[BarKey], highs: &[f64], lows: &[f64]) -> Vec<Trade> {
    let n = bar_keys.len().min(highs.len()).min(lows.len());
    trades
        .into_iter()
        .map(|mut t| {
            t.excursion = locate(&t, &bar_keys[..n]).and_then(|(start, end)| {
                excursion(t.side, t.entry, &highs[start..=end], &lows[start..=end])
            });
            t
        })
        .collect()
}

fn locate(t: &Trade, keys: &[BarKey]) -> Option<(usize, usize)> {
    let find = |idx: usize, key: &BarKey| -> Option<usize> {
        if keys.get(idx) == Some(key) {
            Some(idx)
        } else {
            keys.binary_search(key).ok()
        }
    };
    let start = find(t.entry_bar, &t.entry_date)?;
    let end = find(t.exit_bar, &t.exit_date)?;
    (start <= end).then_some((start, end))
}

fn excursion(side: Side, entry: f64, highs: &[f64], lows: &[f64]) -> Option<Excursion> {
    if highs.is_empty() || entry <= 0.0 {
        return None;
    }
    let max_high = highs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min_low = lows.iter().cloned().fold(f64::INFINITY, f64::min);

    let (best, worst) = match side {
        Side::Long => (max_high, min_low),
        Side::Short => (min_low, max_high),
    };
    let sign = side.sign();
    Some(Excursion {
        best_price: best,
        worst_price: worst,
        mfe_pct: (sign * (best - entry) / entry * 100.0).max(0.0),
        mae_pct: (sign * (worst - entry) / entry * 100.0).min(0.0),
        bars_scanned: highs.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExitReason;
    use chrono::{Duration, NaiveDate};

    fn keys(n: usize) -> Vec<BarKey> {
        let d0 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n).map(|i| BarKey::daily(d0 + Duration::days(i as i64))).collect()
    }

    fn trade(side: Side, entry_bar: usize, exit_bar: usize, k: &[BarKey]) -> Trade {
        Trade {
            symbol: "SPY".into(),
            side,
            entry_bar,
            entry_date: k[entry_bar].clone(),
            entry: 100.0,
            exit_bar,
            exit_date: k[exit_bar].clone(),
            exit: 101.0,
            exit_reason: ExitReason::Target,
            shares: 1.0,
            pnl: 1.0,
            return_percent: 1.0,
            holding_period_days: 1.0,
            packet_id: "p".into(),
            signal_score: None,
            stop_price: 95.0,
            target_price: 101.0,
            excursion: None,
        }
    }

    #[test]
    fn long_and_short_excursions() {
        let k = keys(6);
        let highs = [100.0, 104.0, 103.0, 108.0, 101.0, 120.0];
        let lows = [99.0, 97.0, 96.0, 99.0, 100.0, 50.0];

        let out = enrich(
            vec![trade(Side::Long, 1, 4, &k), trade(Side::Short, 1, 4, &k)],
            &k,
            &highs,
            &lows,
        );
        let long = out[0].excursion.unwrap();
        assert_eq!(long.best_price, 108.0);
        assert_eq!(long.worst_price, 96.0);
        assert!((long.mfe_pct - 8.0).abs() < 1e-9);
        assert!((long.mae_pct + 4.0).abs() < 1e-9);
        assert_eq!(long.bars_scanned, 4);

        let short = out[1].excursion.unwrap();
        assert_eq!(short.best_price, 96.0);
        assert_eq!(short.worst_price, 108.0);
        assert!((short.mfe_pct - 4.0).abs() < 1e-9);
        assert!((short.mae_pct + 8.0).abs() < 1e-9);
    }

    #[test]
    fn enrichment_is_additive_only() {
        let k = keys(4);
        let t = trade(Side::Long, 1, 2, &k);
        let out = enrich(vec![t.clone()], &k, &[1.0; 4], &[1.0; 4]);
        let mut stripped = out[0].clone();
        stripped.excursion = None;
        assert_eq!(stripped, t);
    }

    #[test]
    fn unlocatable_trade_stays_bare() {
        let k = keys(10);
        let t = trade(Side::Long, 7, 9, &k);
        let out = enrich(vec![t], &k[..5], &[1.0; 5], &[1.0; 5]);
        assert!(out[0].excursion.is_none());
    }
}
