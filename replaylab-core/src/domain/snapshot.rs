//! SignalSnapshot — a recorded, timestamped directional signal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::trade::Side;

/// Directional bias of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl Bias {
    /// Position side this bias drives. Neutral drives nothing.
    pub fn side(self) -> Option<Side> {
        match self {
            Bias::Bullish => Some(Side::Long),
            Bias::Bearish => Some(Side::Short),
            Bias::Neutral => None,
        }
    }
}

/// Canonical snapshot shape. Produced only by the snapshot loader, which
/// validates and coerces raw store records into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub packet_id: String,
    pub symbol: String,
    pub signal_source: String,
    pub signal_score: Option<f64>,
    pub bias: Bias,
    pub status: String,
    pub created_at: DateTime<Utc>,
    /// Entry level; `None` means "enter at the bar close".
    pub entry_zone: Option<f64>,
    /// Stop level.
    pub invalidation: Option<f64>,
    /// Profit targets in order; only the first participates in replay.
    pub targets: Vec<f64>,
}

impl SignalSnapshot {
    pub fn first_target(&self) -> Option<f64> {
        self.targets.first().copied()
    }
}
