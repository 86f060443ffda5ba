// src/investigate/threat.rs

//! Threat detection by pseudo-null-move: flip the side to move without
//! playing anything and ask the deep engine what the opponent would do
//! with a free tempo.

use shakmaty::Position;
use tracing::debug;

use crate::board::{parse_fen, position_fen, Side};
use crate::constants::THREAT_SIGNIFICANCE_CP;
use crate::investigate::Investigator;
use crate::investigate::tree::ThreatClaim;

/// Measure the gap between the best and second-best deep replies after a
/// hypothetical turn swap. A gap of at least 60cp means the opponent has
/// one standout idea: a threat worth a claim.
pub async fn analyze_threat_at(inv: &Investigator, fen: &str, depth: u32) -> Option<ThreatClaim> {
    let pos = parse_fen(fen)?;
    let current_side = Side::from(pos.turn());

    // Swapping the turn while in check produces an illegal position; the
    // contract is no-threat, not an error.
    let threat_pos = match pos.clone().swap_turn() {
        Ok(swapped) => swapped,
        Err(_) => {
            debug!(fen, "side in check, skipping threat analysis");
            return None;
        }
    };
    let threat_fen = position_fen(&threat_pos);

    let analysis = inv.analyze_top2(&threat_fen, depth).await;
    let best_eval_cp = analysis.top_moves.first().and_then(|m| m.eval_cp)?;
    let second_eval_cp = analysis.top_moves.get(1).and_then(|m| m.eval_cp)?;

    let significance = (best_eval_cp - second_eval_cp).abs();
    if significance < THREAT_SIGNIFICANCE_CP {
        return None;
    }

    let threatening_side = current_side.other();
    let normalized = match threatening_side {
        Side::White => best_eval_cp,
        Side::Black => -best_eval_cp,
    };

    Some(ThreatClaim {
        significance_cp: significance,
        threat_move_san: analysis.best_move_san.clone()?,
        threat_pv_san: analysis.pv_san.clone(),
        threat_eval_cp: Some(best_eval_cp),
        threat_eval_threatening_pov_cp: Some(normalized),
        threatening_side,
        threat_position_fen: threat_fen,
        original_position_fen: fen.to_string(),
    })
}
