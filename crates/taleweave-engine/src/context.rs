//! Generator context assembly from an ancestor path.

use taleweave_core::generator::Turn;
use taleweave_core::store::RoundRecord;

/// Maps a root-first ancestor path into generator turns, keeping only
/// the most recent `max_history` turns when a cap is set.
#[must_use]
pub fn build_context(path: &[RoundRecord], max_history: Option<usize>) -> Vec<Turn> {
    let start = match max_history {
        Some(cap) if path.len() > cap => path.len() - cap,
        _ => 0,
    };
    path[start..]
        .iter()
        .map(|round| Turn {
            player_input: round.player_input.clone(),
            narrative: round.narrative.clone(),
        })
        .collect()
}
