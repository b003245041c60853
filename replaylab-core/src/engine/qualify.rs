//! Signal qualification pre-pass.
//!
//! Filters snapshots by score and bias, maps each survivor onto the first
//! bar at or after its timestamp, and resolves same-bar collisions. The
//! replay loop only ever sees the resulting bar-indexed map.

use std::collections::BTreeMap;

use super::state::ReplayStats;
use crate::domain::{BarKey, BarKind, Side, SignalSnapshot};

/// A snapshot that will drive the state machine at `bar`.
#[derive(Debug, Clone, PartialEq)]
pub struct QualifiedSignal {
    pub bar: usize,
    pub side: Side,
    pub snapshot: SignalSnapshot,
}

/// Index of the first key at or after the snapshot time, in the series'
/// own key granularity. `keys.len()` when the snapshot is past the end.
pub fn bar_index_for(keys: &[BarKey], kind: BarKind, snapshot: &SignalSnapshot) -> usize {
    let probe = BarKey::for_kind(snapshot.created_at.naive_utc(), kind);
    keys.partition_point(|k| *k < probe)
}

/// Missing scores compare as zero.
fn score_of(snapshot: &SignalSnapshot) -> f64 {
    snapshot.signal_score.unwrap_or(0.0)
}

/// Run the pre-pass. Counts every rejection into `stats`.
pub fn qualify(
    keys: &[BarKey],
    kind: BarKind,
    snapshots: &[SignalSnapshot],
    min_signal_score: f64,
    stats: &mut ReplayStats,
) -> BTreeMap<usize, QualifiedSignal> {
    let mut by_bar: BTreeMap<usize, QualifiedSignal> = BTreeMap::new();

    for snapshot in snapshots {
        if score_of(snapshot) < min_signal_score {
            stats.rejected_by_score += 1;
            continue;
        }
        let Some(side) = snapshot.bias.side() else {
            stats.rejected_by_neutral_bias += 1;
            continue;
        };
        let bar = bar_index_for(keys, kind, snapshot);
        if bar < 1 || bar >= keys.len() {
            stats.rejected_by_out_of_range += 1;
            continue;
        }

        match by_bar.get_mut(&bar) {
            Some(existing) if score_of(snapshot) > score_of(&existing.snapshot) => {
                *existing = QualifiedSignal {
                    bar,
                    side,
                    snapshot: snapshot.clone(),
                };
                stats.superseded_same_bar += 1;
            }
            Some(_) => stats.superseded_same_bar += 1,
            None => {
                by_bar.insert(
                    bar,
                    QualifiedSignal {
                        bar,
                        side,
                        snapshot: snapshot.clone(),
                    },
                );
            }
        }
    }

    stats.qualified = by_bar.len();
    by_bar
}
