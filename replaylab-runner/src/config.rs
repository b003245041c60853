//! TOML replay configuration.
//!
//! ```toml
//! [replay]
//! workspace_id = "ws-1"
//! symbol = "BTC"
//! start_date = "2024-01-01"
//! end_date = "2024-03-31"
//! timeframe = "4h"
//! initial_capital = 10000.0
//! min_signal_score = 60.0
//! mode = "scanner"
//!
//! [sources]
//! patterns = ["scanner%"]
//!
//! [policy]
//! fallback_stop_pct = 1.0
//! fallback_target_pct = 2.0
//!
//! [providers]
//! api_key_env = "ALPHA_VANTAGE_API_KEY"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use replaylab_core::data::{alpha_vantage, binance, AlphaVantageConfig, BinanceConfig, PageLimits};
use replaylab_core::domain::AssetClass;
use replaylab_core::engine::{ExitPolicy, ReplayMode};
use replaylab_core::signals::SourceFilter;
use replaylab_core::Timeframe;

use crate::runner::ReplayRequest;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Full replay configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayConfig {
    pub replay: ReplaySection,
    #[serde(default)]
    pub sources: SourceFilter,
    #[serde(default)]
    pub policy: ExitPolicy,
    #[serde(default)]
    pub providers: ProviderSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplaySection {
    #[serde(default = "default_workspace")]
    pub workspace_id: String,
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default = "default_capital")]
    pub initial_capital: f64,
    #[serde(default = "default_min_score")]
    pub min_signal_score: f64,
    #[serde(default)]
    pub mode: ReplayMode,
    /// Overrides symbol-based asset class detection.
    #[serde(default)]
    pub asset_class: Option<AssetClass>,
}

/// Upstream endpoints and limits. Keys are never stored here, only the
/// name of the environment variable holding one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSection {
    #[serde(default = "default_equity_url")]
    pub equity_base_url: String,
    #[serde(default = "default_crypto_url")]
    pub crypto_base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_page_limit")]
    pub crypto_page_limit: usize,
    #[serde(default = "default_max_pages")]
    pub crypto_max_pages: usize,
    #[serde(default = "default_crypto_timeout")]
    pub crypto_timeout_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            equity_base_url: default_equity_url(),
            crypto_base_url: default_crypto_url(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout(),
            crypto_page_limit: default_page_limit(),
            crypto_max_pages: default_max_pages(),
            crypto_timeout_secs: default_crypto_timeout(),
        }
    }
}

fn default_workspace() -> String {
    "default".into()
}
fn default_timeframe() -> String {
    "1d".into()
}
fn default_capital() -> f64 {
    10_000.0
}
fn default_min_score() -> f64 {
    50.0
}
fn default_equity_url() -> String {
    alpha_vantage::DEFAULT_BASE_URL.into()
}
fn default_crypto_url() -> String {
    binance::DEFAULT_BASE_URL.into()
}
fn default_api_key_env() -> String {
    "ALPHA_VANTAGE_API_KEY".into()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_page_limit() -> usize {
    1000
}
fn default_max_pages() -> usize {
    200
}
fn default_crypto_timeout() -> u64 {
    120
}

impl ReplayConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ReplayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints. Called on load and again after CLI
    /// overrides are applied.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.replay;
        if r.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("replay.symbol must not be empty".into()));
        }
        if r.start_date > r.end_date {
            return Err(ConfigError::Invalid(format!(
                "replay.start_date {} is after replay.end_date {}",
                r.start_date, r.end_date
            )));
        }
        if !(r.initial_capital.is_finite() && r.initial_capital > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "replay.initial_capital must be positive, got {}",
                r.initial_capital
            )));
        }
        if !r.min_signal_score.is_finite() {
            return Err(ConfigError::Invalid("replay.min_signal_score must be finite".into()));
        }
        Timeframe::parse(&r.timeframe).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        for (name, pct) in [
            ("fallback_stop_pct", self.policy.fallback_stop_pct),
            ("fallback_target_pct", self.policy.fallback_target_pct),
        ] {
            if !(pct.is_finite() && pct > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "policy.{name} must be positive, got {pct}"
                )));
            }
        }

        let p = &self.providers;
        if p.crypto_page_limit == 0 || p.crypto_page_limit > 1000 {
            return Err(ConfigError::Invalid(format!(
                "providers.crypto_page_limit must be in 1..=1000, got {}",
                p.crypto_page_limit
            )));
        }
        if p.crypto_max_pages == 0 {
            return Err(ConfigError::Invalid(
                "providers.crypto_max_pages must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The caller-contract request described by this config.
    pub fn request(&self) -> Result<ReplayRequest, ConfigError> {
        let r = &self.replay;
        let timeframe =
            Timeframe::parse(&r.timeframe).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(ReplayRequest {
            workspace_id: r.workspace_id.clone(),
            symbol: r.symbol.trim().to_string(),
            start: r.start_date,
            end: r.end_date,
            timeframe,
            initial_capital: r.initial_capital,
            min_signal_score: r.min_signal_score,
            mode: r.mode,
            sources: self.sources.clone(),
            policy: self.policy,
        })
    }

    /// Equity adapter settings; the key is handed in by the caller.
    pub fn alpha_vantage(&self, api_key: impl Into<String>) -> AlphaVantageConfig {
        AlphaVantageConfig {
            api_key: api_key.into(),
            base_url: self.providers.equity_base_url.clone(),
            timeout: Duration::from_secs(self.providers.request_timeout_secs),
        }
    }

    pub fn binance(&self) -> BinanceConfig {
        let p = &self.providers;
        BinanceConfig {
            base_url: p.crypto_base_url.clone(),
            timeout: Duration::from_secs(p.request_timeout_secs),
            limits: PageLimits {
                page_size: p.crypto_page_limit,
                max_pages: p.crypto_max_pages,
                deadline: Duration::from_secs(p.crypto_timeout_secs),
            },
        }
    }
}
