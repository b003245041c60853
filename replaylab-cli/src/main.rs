//! ReplayLab CLI — replay recorded signals against historical prices.
//!
//! Commands:
//! - `replay` — run a replay from a TOML config, with flag overrides
//! - `timeframe` — show how a timeframe string is interpreted
//! - `symbols` — show asset class and equivalent spellings of a symbol

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use replaylab_core::data::{
    binance_pair, AlphaVantageFeed, BinanceFeed, CsvPriceFeed, FeedRouter, PriceFeed,
    SyntheticFeed,
};
use replaylab_core::domain::{crypto_base, symbol_variants, AssetClass};
use replaylab_core::signals::{MemorySignalStore, SignalStore, SqliteSignalStore};
use replaylab_core::Timeframe;
use replaylab_runner::{
    export_json, run_replay, save_artifacts, ReplayConfig, ReplayReport, ReplaySection,
};

#[derive(Parser)]
#[command(
    name = "replaylab",
    about = "ReplayLab CLI — replay recorded trading signals against historical prices"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded decision packets over a price series.
    Replay(ReplayArgs),
    /// Print the descriptor a timeframe string parses to.
    Timeframe {
        /// e.g. 15m, 1h, 4h, daily
        input: String,
    },
    /// Print asset class and equivalent spellings of a symbol.
    Symbols {
        symbol: String,
    },
}

#[derive(clap::Args)]
struct ReplayArgs {
    /// Path to a TOML replay config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Symbol (overrides config).
    #[arg(long)]
    symbol: Option<String>,

    /// Start date YYYY-MM-DD (overrides config).
    #[arg(long)]
    start: Option<String>,

    /// End date YYYY-MM-DD (overrides config).
    #[arg(long)]
    end: Option<String>,

    /// Timeframe, e.g. 1h or daily (overrides config).
    #[arg(long)]
    timeframe: Option<String>,

    /// Minimum signal score (overrides config).
    #[arg(long)]
    min_score: Option<f64>,

    /// SQLite database holding the decision_packets table.
    #[arg(long, conflicts_with = "signals_json")]
    signals_db: Option<PathBuf>,

    /// JSON file of decision packets (array or {"packets": [...]}).
    #[arg(long)]
    signals_json: Option<PathBuf>,

    /// Read prices from a CSV file, or a directory of <SYMBOL>.csv files.
    #[arg(long, conflicts_with = "synthetic")]
    prices_csv: Option<PathBuf>,

    /// Use a deterministic synthetic random walk instead of live prices.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Write report.json, trades.csv and equity.csv under this directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Print the full report as JSON on stdout.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay(args) => run_replay_cmd(args),
        Commands::Timeframe { input } => run_timeframe(&input),
        Commands::Symbols { symbol } => run_symbols(&symbol),
    }
}

fn run_replay_cmd(args: ReplayArgs) -> Result<()> {
    let config = build_config(&args)?;
    let request = config.request()?;

    let feed = build_feed(&args, &config)?;
    let store = build_store(&args)?;
    tracing::debug!(feed = feed.name(), "price feed selected");

    let report = run_replay(&request, feed.as_ref(), store.as_ref())?;

    if args.json {
        println!("{}", export_json(&report)?);
    } else {
        print_summary(&report);
    }

    if let Some(dir) = &args.output_dir {
        let run_dir = save_artifacts(&report, dir)?;
        eprintln!("Artifacts saved to: {}", run_dir.display());
    }

    Ok(())
}

/// Config file (if any) with command-line overrides applied, then validated.
fn build_config(args: &ReplayArgs) -> Result<ReplayConfig> {
    let mut config = match &args.config {
        Some(path) => ReplayConfig::from_file(path)?,
        None => {
            let (Some(symbol), Some(start), Some(end)) = (&args.symbol, &args.start, &args.end)
            else {
                bail!("without --config, --symbol, --start and --end are all required");
            };
            ReplayConfig {
                replay: ReplaySection {
                    workspace_id: "default".into(),
                    symbol: symbol.clone(),
                    start_date: parse_date(start)?,
                    end_date: parse_date(end)?,
                    timeframe: "1d".into(),
                    initial_capital: 10_000.0,
                    min_signal_score: 50.0,
                    mode: Default::default(),
                    asset_class: None,
                },
                sources: Default::default(),
                policy: Default::default(),
                providers: Default::default(),
            }
        }
    };

    if let Some(symbol) = &args.symbol {
        config.replay.symbol = symbol.clone();
    }
    if let Some(start) = &args.start {
        config.replay.start_date = parse_date(start)?;
    }
    if let Some(end) = &args.end {
        config.replay.end_date = parse_date(end)?;
    }
    if let Some(tf) = &args.timeframe {
        config.replay.timeframe = tf.clone();
    }
    if let Some(score) = args.min_score {
        config.replay.min_signal_score = score;
    }
    config.validate()?;
    Ok(config)
}

fn build_feed(args: &ReplayArgs, config: &ReplayConfig) -> Result<Box<dyn PriceFeed>> {
    if let Some(path) = &args.prices_csv {
        return Ok(Box::new(CsvPriceFeed::new(path)));
    }
    if args.synthetic {
        return Ok(Box::new(SyntheticFeed::default()));
    }

    let symbol = &config.replay.symbol;
    let class = config
        .replay
        .asset_class
        .unwrap_or_else(|| AssetClass::detect(symbol));
    let key_env = &config.providers.api_key_env;
    let api_key = match std::env::var(key_env) {
        Ok(key) if !key.trim().is_empty() => key,
        _ if class == AssetClass::Equity => {
            bail!(
                "{symbol} is an equity symbol: set {key_env} to an Alpha Vantage API key, \
                 or use --prices-csv/--synthetic"
            )
        }
        _ => String::new(),
    };

    let equity = AlphaVantageFeed::new(config.alpha_vantage(api_key))?;
    let crypto = BinanceFeed::new(config.binance())?;
    Ok(Box::new(
        FeedRouter::new(Box::new(equity), Box::new(crypto))
            .with_asset_class(config.replay.asset_class),
    ))
}

fn build_store(args: &ReplayArgs) -> Result<Box<dyn SignalStore>> {
    if let Some(path) = &args.signals_db {
        let store = SqliteSignalStore::open_read_only(path)
            .with_context(|| format!("failed to open signal database {}", path.display()))?;
        return Ok(Box::new(store));
    }
    if let Some(path) = &args.signals_json {
        let store = MemorySignalStore::from_json_file(path)
            .with_context(|| format!("failed to load decision packets from {}", path.display()))?;
        return Ok(Box::new(store));
    }
    bail!("one of --signals-db or --signals-json is required")
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}' (expected YYYY-MM-DD)"))
}

fn run_timeframe(input: &str) -> Result<()> {
    let tf = Timeframe::parse(input)?;
    println!("Label:          {}", tf.label);
    println!("Kind:           {:?}", tf.kind);
    println!("Minutes:        {}", tf.minutes);
    println!("Source minutes: {}", tf.source_minutes);
    let resample = if tf.needs_resample {
        format!("yes (x{})", tf.resample_ratio())
    } else {
        "no".into()
    };
    println!("Resample:       {resample}");
    println!("Equity call:    {}", tf.intervals.equity_function);
    if let Some(interval) = &tf.intervals.equity_interval {
        println!("Equity interval:{interval}");
    }
    println!("Crypto interval:{}", tf.intervals.crypto_interval);
    Ok(())
}

fn run_symbols(symbol: &str) -> Result<()> {
    let class = AssetClass::detect(symbol);
    println!("Symbol:      {}", symbol.trim().to_uppercase());
    println!("Asset class: {class:?}");
    if class == AssetClass::Crypto {
        println!("Base:        {}", crypto_base(symbol));
        println!("Binance:     {}", binance_pair(symbol));
    }
    println!("Variants:    {}", symbol_variants(symbol).join(", "));
    Ok(())
}

fn print_summary(report: &ReplayReport) {
    let req = &report.request;
    let m = &report.result.metrics;
    let s = &report.stats;

    println!();
    println!("=== Replay Result ===");
    println!("Symbol:         {} ({})", req.symbol, req.timeframe.label);
    println!("Period:         {} to {}", req.start, req.end);
    println!("Mode:           {}", req.mode.as_str());
    println!("Bars:           {}", report.bar_count);
    println!("Run:            {}", &report.run_id[..report.run_id.len().min(12)]);
    println!();
    println!("--- Signals ---");
    println!("Snapshots:      {} ({} malformed dropped)", s.total_snapshots, s.dropped_invalid);
    println!("Qualified:      {}", s.qualified);
    println!(
        "Rejected:       {} score, {} neutral, {} out of range, {} same-bar",
        s.rejected_by_score,
        s.rejected_by_neutral_bias,
        s.rejected_by_out_of_range,
        s.superseded_same_bar
    );
    if let Some(reason) = &report.no_data_reason {
        println!();
        println!("NO TRADES: {reason}");
    }
    println!();
    println!("--- Performance ---");
    println!("Trades:         {} ({} won)", m.total_trades, m.winning_trades);
    println!("Total Return:   {:.2}%", m.total_return_pct);
    println!("Final Equity:   {:.2}", m.final_equity);
    println!("CAGR:           {:.2}%", m.cagr_pct);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Sortino:        {:.3}", m.sortino);
    println!("Calmar:         {:.3}", m.calmar);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown_pct);
    println!("Win Rate:       {:.1}%", m.win_rate_pct);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Avg Win/Loss:   {:.2} / {:.2}", m.avg_win, m.avg_loss);
    println!("Best/Worst:     {:.2}% / {:.2}%", m.best_trade_pct, m.worst_trade_pct);
    println!("Time in Market: {:.1}%", m.time_in_market_pct);
    println!("Direction:      {}", report.diagnostics.direction.label());
    for warn in &report.diagnostics.validation.warnings {
        println!("WARNING: {warn}");
    }
    println!();
}
