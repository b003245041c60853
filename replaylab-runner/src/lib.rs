//! ReplayLab Runner — replay orchestration, metrics, diagnostics, export.
//!
//! This crate builds on `replaylab-core` to provide:
//! - The `run_replay` caller contract (concurrent fetch, engine, enrichment)
//! - Performance aggregation over the trade list
//! - Strategy direction and data coverage diagnostics
//! - TOML configuration
//! - JSON/CSV artifact export

pub mod config;
pub mod diagnostics;
pub mod export;
pub mod metrics;
pub mod runner;

pub use config::{ConfigError, ProviderSection, ReplayConfig, ReplaySection};
pub use diagnostics::{
    build_diagnostics, infer_direction, Diagnostics, StrategyDirection, ValidationSummary,
};
pub use export::{
    export_equity_csv, export_json, export_trades_csv, import_json, load_artifacts, save_artifacts,
};
pub use metrics::{aggregate, BacktestResult, EquityPoint, PerformanceMetrics};
pub use runner::{
    compute_dataset_hash, compute_run_id, run_replay, ReplayReport, ReplayRequest, RunError,
    SCHEMA_VERSION,
};
