// src/claims/canonical.rs

//! Canonicalization: deduplicate claims by normalized summary, enforce
//! one claim per evidence line, and fill agenda gaps deterministically.

use std::collections::HashMap;

use tracing::debug;

use crate::claims::bind::build_evidence_index;
use crate::claims::{Claim, ClaimOrigin, Connector, EvidenceSource};
use crate::constants::CLAIM_EVIDENCE_MAX_PLIES;
use crate::investigate::InvestigationResult;

const BOILERPLATE_PREFIXES: [&str; 4] = ["claim:", "note:", "observation:", "insight:"];

/// Normalized form used for dedup grouping: boilerplate prefix dropped,
/// whitespace collapsed, trailing punctuation stripped, case folded.
pub fn normalize_summary(summary: &str) -> String {
    let mut text = summary.trim().to_lowercase();
    for prefix in BOILERPLATE_PREFIXES {
        if let Some(stripped) = text.strip_prefix(prefix) {
            text = stripped.trim_start().to_string();
            break;
        }
    }
    let text = text.trim_end_matches(['.', '!', '?', ' ']);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn origin_score(origin: ClaimOrigin) -> i32 {
    match origin {
        ClaimOrigin::Llm => 30,
        ClaimOrigin::Bind => 20,
        ClaimOrigin::Hammer => 10,
    }
}

fn source_score(source: Option<EvidenceSource>) -> i32 {
    match source {
        Some(EvidenceSource::Pv) => 3,
        Some(EvidenceSource::Pgn) => 2,
        Some(EvidenceSource::Validated) => 2,
        Some(EvidenceSource::EvidenceIndex) => 1,
        Some(EvidenceSource::MotifMiner) => 1,
        None => 0,
    }
}

pub fn claim_score(claim: &Claim) -> i32 {
    let mut score = origin_score(claim.origin) + source_score(claim.evidence_source);
    if claim.is_hammer() {
        score += 100;
    }
    score
}

/// Merge the loser's richer fields into the winner before dropping it.
fn merge_into(winner: &mut Claim, loser: Claim) {
    if winner.evidence_moves.is_empty() && !loser.evidence_moves.is_empty() {
        winner.evidence_moves = loser.evidence_moves;
        winner.evidence_source = loser.evidence_source;
    }
    if winner.payload.is_none() && loser.payload.is_some() {
        winner.payload = loser.payload;
    }
    if loser.hints.priority > winner.hints.priority {
        winner.hints.priority = loser.hints.priority;
    }
    if loser.hints.inline_pgn {
        winner.hints.inline_pgn = true;
    }
}

/// Deduplicate by normalized summary, keeping the highest-scored claim in
/// each group and folding the rest into it.
pub fn dedupe_by_summary(claims: Vec<Claim>) -> Vec<Claim> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Claim> = HashMap::new();

    for claim in claims {
        let key = normalize_summary(&claim.summary);
        match groups.remove(&key) {
            None => {
                order.push(key.clone());
                groups.insert(key, claim);
            }
            Some(existing) => {
                let (mut winner, loser) = if claim_score(&claim) > claim_score(&existing) {
                    (claim, existing)
                } else {
                    (existing, claim)
                };
                debug!(summary = %winner.summary, "merging duplicate claim");
                merge_into(&mut winner, loser);
                groups.insert(key, winner);
            }
        }
    }

    order.into_iter().filter_map(|key| groups.remove(&key)).collect()
}

/// After canonicalization no two claims may share an evidence line; the
/// highest-scored claim keeps it.
pub fn one_claim_per_line(claims: Vec<Claim>) -> Vec<Claim> {
    let mut kept: Vec<Claim> = Vec::new();
    for claim in claims {
        let line = claim.payload.as_ref().map(|p| p.pgn_line.clone());
        match line {
            None => kept.push(claim),
            Some(line) if line.is_empty() => kept.push(claim),
            Some(line) => {
                if let Some(existing_idx) = kept.iter().position(|c| {
                    c.payload.as_ref().map(|p| p.pgn_line.as_str()) == Some(line.as_str())
                }) {
                    if claim_score(&claim) > claim_score(&kept[existing_idx]) {
                        kept[existing_idx] = claim;
                    }
                } else {
                    kept.push(claim);
                }
            }
        }
    }
    kept
}

/// Agenda coverage for suggestion-style requests: with an agenda of N
/// questions, keep at least `min(N, 3)` claims, each bound to a distinct
/// candidate line. Gaps are filled from lines already present in the
/// investigation, without new analysis.
pub fn ensure_agenda_coverage(
    result: &InvestigationResult,
    agenda: &[String],
    mut claims: Vec<Claim>,
) -> Vec<Claim> {
    let wanted = agenda.len().min(3);
    if wanted == 0 {
        return claims;
    }

    let mut used_lines: Vec<String> = claims
        .iter()
        .filter_map(|c| c.payload.as_ref().map(|p| p.pgn_line.clone()))
        .collect();

    let mut candidates: Vec<(String, Vec<String>)> = Vec::new();
    if let Some(evidence) = &result.evidence {
        candidates.push(("best play".to_string(), evidence.moves_san.clone()));
    }
    for entry in build_evidence_index(result) {
        candidates.push((entry.context.clone(), entry.moves));
    }

    for (context, moves) in candidates {
        if claims.len() >= wanted {
            break;
        }
        let mut moves = moves;
        moves.truncate(CLAIM_EVIDENCE_MAX_PLIES);
        if moves.is_empty() {
            continue;
        }
        let line = moves.join(" ");
        if used_lines.contains(&line) {
            continue;
        }
        let summary = if context == "root_pv" || context == "best play" {
            format!("Best play continues {}.", line)
        } else {
            format!("The line starting with {} is covered by {}.", context, line)
        };
        let mut claim = Claim::new(&summary);
        claim.origin = ClaimOrigin::Bind;
        claim.connector = Connector::None;
        claim.evidence_source = Some(EvidenceSource::Pgn);
        claim.evidence_moves = moves.clone();
        claim.payload = Some(crate::claims::EvidencePayload {
            pgn_line: line.clone(),
            pgn_moves: moves,
            ..crate::claims::EvidencePayload::default()
        });
        used_lines.push(line);
        claims.push(claim);
    }

    claims
}

/// Full canonicalization pass.
pub fn canonicalize(
    result: &InvestigationResult,
    agenda: Option<&[String]>,
    claims: Vec<Claim>,
) -> Vec<Claim> {
    let claims = dedupe_by_summary(claims);
    let claims = one_claim_per_line(claims);
    match agenda {
        Some(agenda) => ensure_agenda_coverage(result, agenda, claims),
        None => claims,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::EvidencePayload;
    use crate::investigate::tree::ExplorationNode;

    fn claim_with_line(summary: &str, line: &str, origin: ClaimOrigin) -> Claim {
        let moves: Vec<String> = line.split(' ').map(str::to_string).collect();
        Claim {
            summary: summary.to_string(),
            origin,
            payload: Some(EvidencePayload {
                pgn_line: line.to_string(),
                pgn_moves: moves.clone(),
                ..EvidencePayload::default()
            }),
            evidence_moves: moves,
            evidence_source: Some(EvidenceSource::Pv),
            ..Claim::default()
        }
    }

    #[test]
    fn test_normalize_summary() {
        assert_eq!(
            normalize_summary("  Note:  White is  better!.  "),
            "white is better"
        );
        assert_eq!(normalize_summary("White is better"), "white is better");
    }

    #[test]
    fn test_dedupe_merges_matching_summaries() {
        let strong = claim_with_line("White is better.", "e4 e5", ClaimOrigin::Llm);
        let mut weak = Claim::new("white is better");
        weak.origin = ClaimOrigin::Hammer;
        weak.hints.priority = 9;
        let out = dedupe_by_summary(vec![strong, weak]);
        assert_eq!(out.len(), 1);
        // Winner keeps its identity, loser's stronger hint flows in.
        assert_eq!(out[0].origin, ClaimOrigin::Llm);
        assert_eq!(out[0].hints.priority, 9);
    }

    #[test]
    fn test_dedupe_keeps_distinct_summaries() {
        let a = Claim::new("White is better.");
        let b = Claim::new("Black holds the bishop pair.");
        assert_eq!(dedupe_by_summary(vec![a, b]).len(), 2);
    }

    #[test]
    fn test_causal_claim_outranks_plain_llm_claim() {
        let mut hammer = claim_with_line("A", "e4 e5", ClaimOrigin::Hammer);
        hammer.connector = Connector::Because;
        let plain = claim_with_line("B", "d4 d5", ClaimOrigin::Llm);
        assert!(claim_score(&hammer) > claim_score(&plain));
    }

    #[test]
    fn test_one_claim_per_line() {
        let a = claim_with_line("First reading.", "e4 e5", ClaimOrigin::Bind);
        let b = claim_with_line("Second reading.", "e4 e5", ClaimOrigin::Llm);
        let c = claim_with_line("Other line.", "d4 d5", ClaimOrigin::Bind);
        let out = one_claim_per_line(vec![a, b, c]);
        assert_eq!(out.len(), 2);
        // The LLM-origin duplicate wins the shared line.
        assert!(out.iter().any(|cl| cl.summary == "Second reading."));
        assert!(out.iter().any(|cl| cl.summary == "Other line."));
    }

    #[test]
    fn test_agenda_coverage_fills_gaps_with_distinct_lines() {
        let mut result = crate::investigate::InvestigationResult::minimal(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        );
        result.tree = Some(ExplorationNode {
            pv_full: vec!["e4".into(), "e5".into()],
            branches: vec![ExplorationNode {
                move_played_san: Some("Qh5".into()),
                pv_full: vec!["Nc6".into(), "Qxe5".into()],
                ..ExplorationNode::default()
            }],
            ..ExplorationNode::default()
        });
        let agenda = vec![
            "What is the best plan?".to_string(),
            "Why not the queen sortie?".to_string(),
            "What about development?".to_string(),
        ];
        let out = ensure_agenda_coverage(&result, &agenda, Vec::new());
        assert!(out.len() >= 2);
        let lines: Vec<_> = out
            .iter()
            .filter_map(|c| c.payload.as_ref().map(|p| p.pgn_line.clone()))
            .collect();
        let mut deduped = lines.clone();
        deduped.dedup();
        assert_eq!(lines.len(), deduped.len());
    }

    #[test]
    fn test_canonicalize_end_to_end_invariant() {
        // After canonicalization no two claims share a pgn_line.
        let result = crate::investigate::InvestigationResult::minimal(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        );
        let claims = vec![
            claim_with_line("A.", "e4 e5", ClaimOrigin::Bind),
            claim_with_line("B.", "e4 e5", ClaimOrigin::Llm),
            claim_with_line("A.", "d4 d5", ClaimOrigin::Hammer),
        ];
        let out = canonicalize(&result, None, claims);
        let mut lines: Vec<_> = out
            .iter()
            .filter_map(|c| c.payload.as_ref().map(|p| p.pgn_line.clone()))
            .collect();
        let before = lines.len();
        lines.dedup();
        assert_eq!(before, lines.len());
    }
}
