// src/investigate/evidence.rs

//! The canonical evidence line: a 4-8 ply SAN sequence anchored on the
//! player's move (or the deep PV), extended one ply at a time only while
//! the shallow engine agrees with the PV continuation. Everything a claim
//! later cites (per-ply deltas, net tag/role changes, the eval/material/
//! positional decomposition) is computed here, once.

use serde::{Deserialize, Serialize};
use shakmaty::Position;
use tracing::debug;

use crate::analysis::delta::{compute_line_deltas, LineDeltas, PerMoveDelta};
use crate::analysis::tags::Tag;
use crate::board::{
    apply_san_line, material_balance_cp_from_fen, parse_fen, parse_san_lenient, position_fen,
};
use crate::constants::{EVIDENCE_END_EVAL_DEPTH, EVIDENCE_STATS_MAX_PLIES};
use crate::investigate::Investigator;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerMoveStat {
    pub ply: usize,
    pub move_san: String,
    pub fen_before: String,
    pub fen_after: String,
    pub eval_before_cp: Option<i32>,
    pub eval_after_cp: Option<i32>,
    pub eval_delta_cp: Option<i32>,
    pub material_before_cp: Option<i32>,
    pub material_after_cp: Option<i32>,
    pub material_delta_cp: Option<i32>,
    pub positional_before_cp: Option<i32>,
    pub positional_after_cp: Option<i32>,
    pub positional_delta_cp: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceLine {
    pub starting_fen: String,
    pub moves_san: Vec<String>,
    /// The moves joined with spaces; claims group on this string.
    pub pgn_line: String,
    pub per_move_deltas: Vec<PerMoveDelta>,
    pub tags_gained_net: Vec<String>,
    pub tags_lost_net: Vec<String>,
    pub tags_gained_net_raw: Vec<String>,
    pub tags_lost_net_raw: Vec<String>,
    pub tags_gained_net_structured: Vec<Tag>,
    pub tags_lost_net_structured: Vec<Tag>,
    pub roles_gained_net: Vec<String>,
    pub roles_lost_net: Vec<String>,
    pub end_fen: Option<String>,
    pub eval_start_cp: Option<i32>,
    pub eval_end_cp: Option<i32>,
    pub eval_delta_cp: Option<i32>,
    pub material_start_cp: Option<i32>,
    pub material_end_cp: Option<i32>,
    pub material_change_net_cp: Option<i32>,
    pub positional_start_cp: Option<i32>,
    pub positional_end_cp: Option<i32>,
    pub per_move_stats: Vec<PerMoveStat>,
}

/// Assemble the evidence line. `seed_move` is the player's move when a
/// specific move is under investigation; `pv_moves` is the deep PV from
/// the position the line continues into.
pub async fn build_evidence_line(
    inv: &Investigator,
    starting_fen: &str,
    seed_move: Option<&str>,
    pv_moves: &[String],
    eval_start_cp: Option<i32>,
) -> Option<EvidenceLine> {
    let config = inv.config();
    let base_plies = config.evidence_plies_base.max(1);
    let max_plies = config.evidence_plies_max.max(base_plies);

    let mut moves: Vec<String> = Vec::new();
    if let Some(seed) = seed_move {
        moves.push(seed.to_string());
    }
    for pv_move in pv_moves {
        if moves.len() >= base_plies {
            break;
        }
        if !pv_move.trim().is_empty() {
            moves.push(pv_move.clone());
        }
    }
    if moves.is_empty() {
        return None;
    }

    let seed_count = usize::from(seed_move.is_some());
    extend_while_shallow_agrees(
        inv,
        starting_fen,
        &mut moves,
        pv_moves,
        seed_count,
        base_plies,
        max_plies,
    )
    .await;

    let deltas = compute_line_deltas(starting_fen, &moves);
    let end_fen = parse_fen(starting_fen)
        .and_then(|pos| apply_san_line(&pos, &moves))
        .map(|pos| position_fen(&pos));

    let eval_end_cp = match &end_fen {
        Some(fen) => inv.analyze_cached(fen, EVIDENCE_END_EVAL_DEPTH).await.eval_cp,
        None => None,
    };

    let material_start_cp = material_balance_cp_from_fen(starting_fen);
    let material_end_cp = end_fen.as_deref().and_then(material_balance_cp_from_fen);
    let positional_start_cp = sub(eval_start_cp, material_start_cp);
    let positional_end_cp = sub(eval_end_cp, material_end_cp);

    let per_move_stats =
        compute_per_move_stats(inv, &deltas.per_move, eval_start_cp).await;

    let LineDeltas {
        per_move,
        tags_gained_net,
        tags_lost_net,
        tags_gained_net_raw,
        tags_lost_net_raw,
        tags_gained_net_structured,
        tags_lost_net_structured,
        roles_gained_net,
        roles_lost_net,
    } = deltas;

    Some(EvidenceLine {
        starting_fen: starting_fen.to_string(),
        pgn_line: moves.join(" "),
        moves_san: moves,
        per_move_deltas: per_move,
        tags_gained_net,
        tags_lost_net,
        tags_gained_net_raw,
        tags_lost_net_raw,
        tags_gained_net_structured,
        tags_lost_net_structured,
        roles_gained_net,
        roles_lost_net,
        eval_start_cp,
        eval_end_cp,
        eval_delta_cp: sub(eval_end_cp, eval_start_cp),
        material_start_cp,
        material_end_cp,
        material_change_net_cp: sub(material_end_cp, material_start_cp),
        positional_start_cp,
        positional_end_cp,
        end_fen,
        per_move_stats,
    })
}

fn sub(a: Option<i32>, b: Option<i32>) -> Option<i32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a - b),
        _ => None,
    }
}

/// Extend one ply at a time past the baseline, stopping at the first
/// position where the shallow best move disagrees with the PV.
async fn extend_while_shallow_agrees(
    inv: &Investigator,
    starting_fen: &str,
    moves: &mut Vec<String>,
    pv_moves: &[String],
    seed_count: usize,
    base_plies: usize,
    max_plies: usize,
) {
    if moves.len() < base_plies {
        return;
    }
    let Some(start) = parse_fen(starting_fen) else {
        return;
    };
    let Some(mut board) = apply_san_line(&start, moves) else {
        debug!(starting_fen, "evidence seed line does not apply, skipping extension");
        return;
    };

    // The seed already consumed a PV prefix; pick up where it stopped.
    let mut pv_index = moves.len().saturating_sub(seed_count);

    while moves.len() < max_plies && pv_index < pv_moves.len() {
        let next_from_pv = &pv_moves[pv_index];
        let shallow = inv
            .analyze_cached(&position_fen(&board), inv.config().depth_shallow)
            .await;
        let Some(best_shallow) = shallow.best_move_san else {
            break;
        };

        let Some(pv_parsed) = parse_san_lenient(&board, next_from_pv) else {
            break;
        };
        let Some(shallow_parsed) = parse_san_lenient(&board, &best_shallow) else {
            break;
        };
        if pv_parsed != shallow_parsed {
            // First disagreement stops extension.
            break;
        }

        moves.push(next_from_pv.clone());
        board.play_unchecked(pv_parsed);
        pv_index += 1;
    }
}

/// Per-ply eval/material/positional series so a narrator can tell the
/// story move by move without recomputing anything.
async fn compute_per_move_stats(
    inv: &Investigator,
    per_move_deltas: &[PerMoveDelta],
    eval_start_cp: Option<i32>,
) -> Vec<PerMoveStat> {
    let deltas = &per_move_deltas[..per_move_deltas.len().min(EVIDENCE_STATS_MAX_PLIES)];
    let mut out = Vec::with_capacity(deltas.len());
    let mut prev_eval = eval_start_cp;

    for (idx, delta) in deltas.iter().enumerate() {
        let eval_before_cp = if idx == 0 && eval_start_cp.is_some() {
            eval_start_cp
        } else {
            inv.analyze_cached(&delta.fen_before, EVIDENCE_END_EVAL_DEPTH)
                .await
                .eval_cp
                .or(prev_eval)
        };
        let eval_after_cp = inv
            .analyze_cached(&delta.fen_after, EVIDENCE_END_EVAL_DEPTH)
            .await
            .eval_cp;
        prev_eval = eval_after_cp;

        let material_before_cp = material_balance_cp_from_fen(&delta.fen_before);
        let material_after_cp = material_balance_cp_from_fen(&delta.fen_after);

        out.push(PerMoveStat {
            ply: delta.ply,
            move_san: delta.move_san.clone(),
            fen_before: delta.fen_before.clone(),
            fen_after: delta.fen_after.clone(),
            eval_before_cp,
            eval_after_cp,
            eval_delta_cp: sub(eval_after_cp, eval_before_cp),
            material_before_cp,
            material_after_cp,
            material_delta_cp: sub(material_after_cp, material_before_cp),
            positional_before_cp: sub(eval_before_cp, material_before_cp),
            positional_after_cp: sub(eval_after_cp, material_after_cp),
            positional_delta_cp: sub(
                sub(eval_after_cp, material_after_cp),
                sub(eval_before_cp, material_before_cp),
            ),
        });
    }

    out
}
