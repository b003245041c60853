//! Replay engine: signal qualification, the position state machine and
//! trade enrichment.
//!
//! The engine runs once per request over in-memory data. It does no I/O and
//! has no cancellation points; callers cancel before invoking it.

pub mod enrich;
pub mod qualify;
pub mod replay;
pub mod state;

pub use enrich::enrich;
pub use qualify::{bar_index_for, qualify, QualifiedSignal};
pub use replay::run_replay_engine;
pub use state::{
    EngineConfig, EngineError, ExitPolicy, NoDataReason, OpenPosition, PositionState,
    ReplayMode, ReplayOutcome, ReplayStats, CAPITAL_DEPLOYMENT_FRACTION, MIN_BARS,
};
