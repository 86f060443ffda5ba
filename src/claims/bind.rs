// src/claims/bind.rs

//! Evidence binding: attach a 2-4 ply SAN line and its precomputed payload
//! to each candidate claim, reading only from the InvestigationResult. The
//! binder never launches analysis; what the investigator did not compute,
//! no claim may cite.

use tracing::debug;

use crate::claims::{Claim, Connector, EvidencePayload, EvidenceSource};
use crate::constants::{CLAIM_EVIDENCE_MAX_PLIES, CONSEQUENCE_EVIDENCE_MAX_PLIES};
use crate::investigate::InvestigationResult;

/// A reusable evidence line mined from the exploration tree.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceIndexEntry {
    /// What the line is about, e.g. the branch move it refutes.
    pub context: String,
    pub moves: Vec<String>,
}

/// Collect every PV the tree knows, keyed by the move that introduces it.
pub fn build_evidence_index(result: &InvestigationResult) -> Vec<EvidenceIndexEntry> {
    let mut index = Vec::new();
    if let Some(tree) = &result.tree {
        if !tree.pv_full.is_empty() {
            index.push(EvidenceIndexEntry {
                context: "root_pv".to_string(),
                moves: tree.pv_full.clone(),
            });
        }
        collect_branch_lines(&tree.branches, &mut index);
    }
    for pv_branch in &result.pv_branches {
        collect_branch_lines(std::slice::from_ref(&pv_branch.node), &mut index);
    }
    index
}

fn collect_branch_lines(
    branches: &[crate::investigate::tree::ExplorationNode],
    out: &mut Vec<EvidenceIndexEntry>,
) {
    for branch in branches {
        if let Some(move_played) = &branch.move_played_san {
            let mut moves = vec![move_played.clone()];
            moves.extend(branch.pv_full.iter().cloned());
            out.push(EvidenceIndexEntry {
                context: move_played.clone(),
                moves,
            });
        }
        collect_branch_lines(&branch.branches, out);
    }
}

fn max_plies_for(claim: &Claim) -> usize {
    if claim.hints.role == "consequence" {
        CONSEQUENCE_EVIDENCE_MAX_PLIES
    } else {
        CLAIM_EVIDENCE_MAX_PLIES
    }
}

/// Selection priority: canonical evidence line, then the PV after the
/// player's move (player's move prepended), then a matching index entry,
/// then a pre-built branch, then a prefix of the root PV.
fn select_line(
    result: &InvestigationResult,
    index: &[EvidenceIndexEntry],
    claim: &Claim,
) -> Option<(Vec<String>, EvidenceSource)> {
    let limit = max_plies_for(claim);

    if let Some(evidence) = &result.evidence {
        if !evidence.moves_san.is_empty() {
            let mut moves = evidence.moves_san.clone();
            moves.truncate(limit);
            return Some((moves, EvidenceSource::Pv));
        }
    }

    if let Some(player_move) = &result.player_move_san {
        // The PV of a move investigation starts after the player's move;
        // prepend it unless the PV already leads with it.
        let mut moves = Vec::new();
        if result.pv_full.first() != Some(player_move) {
            moves.push(player_move.clone());
        }
        moves.extend(result.pv_full.iter().cloned());
        moves.truncate(limit);
        if moves.len() > 1 {
            return Some((moves, EvidenceSource::Pv));
        }
    }

    // An index entry whose context appears in the claim text.
    for entry in index {
        if entry.context != "root_pv" && claim.summary.contains(&entry.context) {
            let mut moves = entry.moves.clone();
            moves.truncate(limit);
            return Some((moves, EvidenceSource::EvidenceIndex));
        }
    }

    // Any pre-built branch line.
    if let Some(entry) = index.iter().find(|e| e.context != "root_pv") {
        let mut moves = entry.moves.clone();
        moves.truncate(limit);
        return Some((moves, EvidenceSource::Pgn));
    }

    if !result.pv_full.is_empty() {
        let mut moves = result.pv_full.clone();
        moves.truncate(limit);
        return Some((moves, EvidenceSource::Pgn));
    }

    None
}

fn payload_from(result: &InvestigationResult, moves: &[String]) -> EvidencePayload {
    let mut payload = EvidencePayload {
        pgn_line: moves.join(" "),
        pgn_moves: moves.to_vec(),
        eval_before_cp: result.eval_before_cp,
        eval_after_cp: result.eval_after_cp,
        eval_drop_cp: result.eval_drop_cp,
        ..EvidencePayload::default()
    };
    if let Some(scan) = &result.root_scan {
        payload.theme_tags = scan.top_themes.clone();
        payload.raw_tags = scan.tags.iter().map(|t| t.name.clone()).collect();
        payload.tactic_tags = scan
            .tags
            .iter()
            .filter(|t| t.name.starts_with("tag.threat.") || t.name.starts_with("tag.piece."))
            .map(|t| t.name.clone())
            .collect();
    }
    if let Some(evidence) = &result.evidence {
        payload.tags_gained_net = evidence.tags_gained_net.clone();
        payload.tags_lost_net = evidence.tags_lost_net.clone();
        payload.tags_gained_net_structured = evidence.tags_gained_net_structured.clone();
        payload.tags_lost_net_structured = evidence.tags_lost_net_structured.clone();
        payload.roles_gained_net = evidence.roles_gained_net.clone();
        payload.roles_lost_net = evidence.roles_lost_net.clone();
        payload.evidence_eval_start_cp = evidence.eval_start_cp;
        payload.evidence_eval_end_cp = evidence.eval_end_cp;
        payload.evidence_material_start_cp = evidence.material_start_cp;
        payload.evidence_material_end_cp = evidence.material_end_cp;
        payload.evidence_positional_start_cp = evidence.positional_start_cp;
        payload.evidence_positional_end_cp = evidence.positional_end_cp;
        payload.material_change_net_cp = evidence.material_change_net_cp;
        payload.key_eval_breakdown = key_breakdown(evidence);
    }
    payload
}

fn key_breakdown(evidence: &crate::investigate::evidence::EvidenceLine) -> String {
    let fmt = |cp: Option<i32>| match cp {
        Some(cp) => format!("{:+.2}", f64::from(cp) / 100.0),
        None => "?".to_string(),
    };
    format!(
        "eval {} -> {}, material {} -> {}, positional {} -> {}",
        fmt(evidence.eval_start_cp),
        fmt(evidence.eval_end_cp),
        fmt(evidence.material_start_cp),
        fmt(evidence.material_end_cp),
        fmt(evidence.positional_start_cp),
        fmt(evidence.positional_end_cp),
    )
}

/// The mandatory downgrade: a connector without 2-4 qualifying evidence
/// plies is stripped, along with its source label.
pub fn downgrade_if_unsupported(claim: &mut Claim) {
    if claim.connector == Connector::None {
        return;
    }
    if claim.evidence_moves.len() < 2 {
        debug!(summary = %claim.summary, "downgrading claim without qualifying evidence");
        claim.connector = Connector::None;
        claim.evidence_source = None;
    } else if claim.evidence_moves.len() > CLAIM_EVIDENCE_MAX_PLIES {
        claim.evidence_moves.truncate(CLAIM_EVIDENCE_MAX_PLIES);
        if let Some(payload) = &mut claim.payload {
            payload.pgn_moves = claim.evidence_moves.clone();
            payload.pgn_line = claim.evidence_moves.join(" ");
        }
    }
}

/// Bind evidence onto every candidate claim.
pub fn bind_claims(result: &InvestigationResult, mut claims: Vec<Claim>) -> Vec<Claim> {
    let index = build_evidence_index(result);
    for claim in &mut claims {
        match select_line(result, &index, claim) {
            Some((moves, source)) => {
                // The selected line overwrites whatever the proposer put
                // here; a claim that omitted the starting move is
                // self-corrected as a side effect.
                claim.payload = Some(payload_from(result, &moves));
                claim.evidence_moves = moves;
                claim.evidence_source = Some(source);
            }
            None => {
                claim.payload = None;
                claim.evidence_moves.clear();
                claim.evidence_source = None;
            }
        }
        downgrade_if_unsupported(claim);
    }
    claims
}
