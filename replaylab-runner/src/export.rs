//! Report export — JSON and CSV artifacts.
//!
//! All persisted reports carry a `schema_version`. Newer versions are
//! rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use replaylab_core::domain::Trade;

use crate::metrics::EquityPoint;
use crate::runner::{short_id, ReplayReport, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a report to pretty JSON.
pub fn export_json(report: &ReplayReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize ReplayReport to JSON")
}

/// Deserialize a report, rejecting schema versions newer than this build.
pub fn import_json(json: &str) -> Result<ReplayReport> {
    let report: ReplayReport =
        serde_json::from_str(json).context("failed to deserialize ReplayReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Trade tape including excursion and signal trace columns.
pub fn export_trades_csv(trades: &[Trade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "symbol",
        "side",
        "entry_bar",
        "entry_date",
        "entry",
        "exit_bar",
        "exit_date",
        "exit",
        "exit_reason",
        "shares",
        "return",
        "return_percent",
        "holding_period_days",
        "stop_price",
        "target_price",
        "packet_id",
        "signal_score",
        "mfe_pct",
        "mae_pct",
    ])?;

    for t in trades {
        let (mfe, mae) = t
            .excursion
            .map(|e| (format!("{:.4}", e.mfe_pct), format!("{:.4}", e.mae_pct)))
            .unwrap_or_default();
        wtr.write_record([
            t.symbol.as_str(),
            side_str(t),
            &t.entry_bar.to_string(),
            t.entry_date.as_str(),
            &format!("{:.6}", t.entry),
            &t.exit_bar.to_string(),
            t.exit_date.as_str(),
            &format!("{:.6}", t.exit),
            t.exit_reason.as_str(),
            &format!("{:.6}", t.shares),
            &format!("{:.2}", t.pnl),
            &format!("{:.4}", t.return_percent),
            &format!("{:.4}", t.holding_period_days),
            &format!("{:.6}", t.stop_price),
            &format!("{:.6}", t.target_price),
            t.packet_id.as_str(),
            &t.signal_score.map(|s| s.to_string()).unwrap_or_default(),
            &mfe,
            &mae,
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Equity path as `date,equity`.
pub fn export_equity_csv(equity_curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "equity"])?;
    for point in equity_curve {
        wtr.write_record([point.date.as_str(), &format!("{:.2}", point.equity)])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

fn side_str(t: &Trade) -> &'static str {
    match t.side {
        replaylab_core::domain::Side::Long => "long",
        replaylab_core::domain::Side::Short => "short",
    }
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the artifact set for one replay.
///
/// Creates `{symbol}_{run_id[..12]}/` under `output_dir` containing
/// `report.json`, `trades.csv` and `equity.csv`. Re-running the same inputs
/// overwrites the same directory. Returns the directory path.
pub fn save_artifacts(report: &ReplayReport, output_dir: &Path) -> Result<PathBuf> {
    let symbol: String = report
        .request
        .symbol
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let run_dir = output_dir.join(format!("{}_{}", symbol, short_id(&report.run_id)));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("report.json"), export_json(report)?)?;
    std::fs::write(
        run_dir.join("trades.csv"),
        export_trades_csv(&report.result.trades)?,
    )?;
    std::fs::write(
        run_dir.join("equity.csv"),
        export_equity_csv(&report.result.equity_curve)?,
    )?;

    tracing::info!(dir = %run_dir.display(), "artifacts written");
    Ok(run_dir)
}

/// Load a report from an artifact directory's `report.json`.
pub fn load_artifacts(dir: &Path) -> Result<ReplayReport> {
    let path = dir.join("report.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use replaylab_core::domain::{BarKey, Excursion, ExitReason, Side};

    fn trade() -> Trade {
        let d = |day| BarKey::daily(NaiveDate::from_ymd_opt(2024, 3, day).unwrap());
        Trade {
            symbol: "BTC".into(),
            side: Side::Short,
            entry_bar: 2,
            entry_date: d(4),
            entry: 42_000.0,
            exit_bar: 5,
            exit_date: d(7),
            exit: 41_160.0,
            exit_reason: ExitReason::Target,
            shares: 0.226190,
            pnl: 190.0,
            return_percent: 2.0,
            holding_period_days: 3.0,
            packet_id: "pkt-7".into(),
            signal_score: Some(72.0),
            stop_price: 42_420.0,
            target_price: 41_160.0,
            excursion: Some(Excursion {
                best_price: 41_100.0,
                worst_price: 42_300.0,
                mfe_pct: 2.1429,
                mae_pct: -0.7143,
                bars_scanned: 4,
            }),
        }
    }

    #[test]
    fn trades_csv_has_header_and_row() {
        let csv = export_trades_csv(&[trade()]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("symbol,side,entry_bar"));
        assert!(lines[1].starts_with("BTC,short,2,2024-03-04,42000.000000"));
        assert!(lines[1].contains(",target,"));
        assert!(lines[1].contains(",pkt-7,72,"));
    }

    #[test]
    fn trades_csv_without_excursion_leaves_blank_columns() {
        let mut t = trade();
        t.excursion = None;
        t.signal_score = None;
        let csv = export_trades_csv(&[t]).unwrap();
        assert!(csv.lines().nth(1).unwrap().ends_with(",pkt-7,,,"));
    }

    #[test]
    fn equity_csv_rows() {
        let curve = vec![
            EquityPoint {
                date: BarKey::daily(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
                equity: 10_000.0,
            },
            EquityPoint {
                date: BarKey::daily(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()),
                equity: 10_190.0,
            },
        ];
        let csv = export_equity_csv(&curve).unwrap();
        assert_eq!(csv, "date,equity\n2024-03-01,10000.00\n2024-03-07,10190.00\n");
    }
}
