//! Performance aggregation — trade list in, statistics bundle out.
//!
//! Every metric is a pure function of the equity path and/or the trade list.
//! All of them degrade to 0 (or the profit-factor cap) instead of NaN or
//! infinity when there is nothing to measure.

use serde::{Deserialize, Serialize};
use replaylab_core::domain::{BarKey, Trade};

/// Reported profit factor when there are winners but no losers.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

const SECONDS_PER_DAY: f64 = 86_400.0;
const DAYS_PER_YEAR: f64 = 365.25;

/// Aggregate statistics for one replay. Percentages are in percent units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate_pct: f64,
    pub total_return_pct: f64,
    pub final_equity: f64,
    /// Largest peak-to-trough decline, as a positive percentage.
    pub max_drawdown_pct: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub avg_return_pct: f64,
    pub best_trade_pct: f64,
    pub worst_trade_pct: f64,
    pub cagr_pct: f64,
    /// Standard deviation of per-trade returns.
    pub volatility_pct: f64,
    pub time_in_market_pct: f64,
    pub avg_holding_days: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
}

/// Account value after each closed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: BarKey,
    pub equity: f64,
}

/// Trades, equity path and statistics for one replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: PerformanceMetrics,
}

/// Build the equity path and the full statistics bundle.
///
/// The curve starts at `initial_capital` on the first bar and steps once per
/// trade (in trade order) by that trade's PnL.
pub fn aggregate(trades: Vec<Trade>, bar_keys: &[BarKey], initial_capital: f64) -> BacktestResult {
    let equity_curve = equity_path(&trades, bar_keys, initial_capital);
    let values: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();
    let span = span_days(bar_keys);
    let metrics = PerformanceMetrics::compute(&values, &trades, span);
    BacktestResult {
        trades,
        equity_curve,
        metrics,
    }
}

impl PerformanceMetrics {
    /// Compute every metric from an equity path, trade list and the wall-clock
    /// span of the bar series in days.
    pub fn compute(equity_curve: &[f64], trades: &[Trade], span_days: f64) -> Self {
        let returns: Vec<f64> = trades.iter().map(|t| t.return_percent).collect();
        let winners: Vec<&Trade> = trades.iter().filter(|t| t.is_winner()).collect();
        let losers: Vec<&Trade> = trades.iter().filter(|t| t.pnl < 0.0).collect();
        let years = span_days / DAYS_PER_YEAR;

        Self {
            total_trades: trades.len(),
            winning_trades: winners.len(),
            losing_trades: losers.len(),
            win_rate_pct: win_rate(trades) * 100.0,
            total_return_pct: total_return(equity_curve) * 100.0,
            final_equity: equity_curve.last().copied().unwrap_or(0.0),
            max_drawdown_pct: -max_drawdown(equity_curve) * 100.0,
            sharpe: sharpe_ratio(equity_curve),
            sortino: sortino_ratio(equity_curve),
            calmar: calmar_ratio(equity_curve, years),
            profit_factor: profit_factor(trades),
            avg_win: mean_f64(&winners.iter().map(|t| t.pnl).collect::<Vec<_>>()),
            avg_loss: mean_f64(&losers.iter().map(|t| t.pnl).collect::<Vec<_>>()),
            avg_return_pct: mean_f64(&returns),
            best_trade_pct: returns.iter().copied().fold(None, max_opt).unwrap_or(0.0),
            worst_trade_pct: returns.iter().copied().fold(None, min_opt).unwrap_or(0.0),
            cagr_pct: cagr(equity_curve, years) * 100.0,
            volatility_pct: std_dev(&returns),
            time_in_market_pct: time_in_market(trades, span_days) * 100.0,
            avg_holding_days: mean_f64(
                &trades.iter().map(|t| t.holding_period_days).collect::<Vec<_>>(),
            ),
            max_consecutive_wins: max_consecutive_wins(trades),
            max_consecutive_losses: max_consecutive_losses(trades),
        }
    }
}

// ─── Equity path ────────────────────────────────────────────────────

/// Running balance: the starting point, then one point per trade exit.
pub fn equity_path(
    trades: &[Trade],
    bar_keys: &[BarKey],
    initial_capital: f64,
) -> Vec<EquityPoint> {
    let mut curve = Vec::with_capacity(trades.len() + 1);
    let start = bar_keys
        .first()
        .or_else(|| trades.first().map(|t| &t.entry_date));
    if let Some(date) = start {
        curve.push(EquityPoint {
            date: date.clone(),
            equity: initial_capital,
        });
    }
    let mut balance = initial_capital;
    for trade in trades {
        balance += trade.pnl;
        curve.push(EquityPoint {
            date: trade.exit_date.clone(),
            equity: balance,
        });
    }
    curve
}

/// Wall-clock days from the first to the last bar.
pub fn span_days(bar_keys: &[BarKey]) -> f64 {
    match (bar_keys.first(), bar_keys.last()) {
        (Some(first), Some(last)) => {
            let secs = (last.timestamp() - first.timestamp()).num_seconds();
            (secs as f64 / SECONDS_PER_DAY).max(0.0)
        }
        _ => 0.0,
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    let (Some(&initial), Some(&final_eq)) = (equity_curve.first(), equity_curve.last()) else {
        return 0.0;
    };
    if equity_curve.len() < 2 || initial <= 0.0 {
        return 0.0;
    }
    (final_eq - initial) / initial
}

/// Compound annual growth rate over `years` of wall-clock time.
///
/// A wiped-out account reports -1.0. Spans too short to annualize sensibly
/// (overflowing the power) report 0.0.
pub fn cagr(equity_curve: &[f64], years: f64) -> f64 {
    let (Some(&initial), Some(&final_eq)) = (equity_curve.first(), equity_curve.last()) else {
        return 0.0;
    };
    if equity_curve.len() < 2 || initial <= 0.0 || years <= 0.0 {
        return 0.0;
    }
    if final_eq <= 0.0 {
        return -1.0;
    }
    let g = (final_eq / initial).powf(1.0 / years) - 1.0;
    if g.is_finite() {
        g
    } else {
        0.0
    }
}

/// Mean step return over step-return volatility. Not annualized: steps are
/// trades, which are irregularly spaced.
pub fn sharpe_ratio(equity_curve: &[f64]) -> f64 {
    let returns = step_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(&returns) / std
}

/// Like Sharpe, with downside deviation in the denominator.
pub fn sortino_ratio(equity_curve: &[f64]) -> f64 {
    let returns = step_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let downside_sq: Vec<f64> = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).collect();
    if downside_sq.is_empty() {
        return 0.0;
    }
    let downside_std = (downside_sq.iter().sum::<f64>() / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    mean_f64(&returns) / downside_std
}

/// CAGR / |max drawdown|. Negative for losing runs; zero without a drawdown.
pub fn calmar_ratio(equity_curve: &[f64], years: f64) -> f64 {
    let c = cagr(equity_curve, years);
    let dd = max_drawdown(equity_curve);
    if dd >= 0.0 {
        return 0.0;
    }
    c / dd.abs()
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            let dd = (eq - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd.max(-1.0)
}

/// Fraction of trades that made money.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64
}

/// Gross profit / gross loss, capped at [`PROFIT_FACTOR_CAP`].
pub fn profit_factor(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.pnl < 0.0)
        .map(|t| t.pnl.abs())
        .sum();

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { PROFIT_FACTOR_CAP } else { 0.0 };
    }
    (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP)
}

/// Cumulative holding days over the series span, capped at 1.0.
pub fn time_in_market(trades: &[Trade], span_days: f64) -> f64 {
    if trades.is_empty() || span_days <= 0.0 {
        return 0.0;
    }
    let held: f64 = trades.iter().map(|t| t.holding_period_days).sum();
    (held / span_days).clamp(0.0, 1.0)
}

pub fn max_consecutive_wins(trades: &[Trade]) -> usize {
    max_consecutive(trades, true)
}

pub fn max_consecutive_losses(trades: &[Trade]) -> usize {
    max_consecutive(trades, false)
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Fractional change between consecutive equity points.
pub fn step_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn max_opt(acc: Option<f64>, v: f64) -> Option<f64> {
    Some(acc.map_or(v, |a| a.max(v)))
}

fn min_opt(acc: Option<f64>, v: f64) -> Option<f64> {
    Some(acc.map_or(v, |a| a.min(v)))
}

fn max_consecutive(trades: &[Trade], winners: bool) -> usize {
    let mut max_streak = 0;
    let mut current = 0;
    for trade in trades {
        if trade.is_winner() == winners {
            current += 1;
            max_streak = max_streak.max(current);
        } else {
            current = 0;
        }
    }
    max_streak
}
