//! ReplayLab Core — signal-replay backtesting.
//!
//! This crate holds everything between the two upstream fetches and the
//! statistics layer:
//! - Domain types (bar keys, price series, signal snapshots, trades)
//! - Timeframe parsing and OHLCV resampling
//! - Price feeds: Alpha Vantage (equities), Binance (crypto), CSV, synthetic
//! - Signal stores and the snapshot loader
//! - The single-position replay state machine and trade enrichment

pub mod data;
pub mod domain;
pub mod engine;
pub mod signals;
pub mod timeframe;

pub use timeframe::Timeframe;
