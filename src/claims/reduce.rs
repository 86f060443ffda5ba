// src/claims/reduce.rs

//! Deterministic reduction of an investigation + its claims into the
//! structured summary the narrative layer consumes: primary claim,
//! rejected alternatives, threats, key insights, and a facts card.

use serde::{Deserialize, Serialize};

use crate::claims::Claim;
use crate::investigate::tree::StopReason;
use crate::investigate::InvestigationResult;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrimaryClaim {
    pub best_move: Option<String>,
    pub eval_start_cp: Option<i32>,
    pub eval_end_cp: Option<i32>,
    pub eval_delta_cp: Option<i32>,
    pub eval_deep_cp: Option<i32>,
    pub eval_shallow_cp: Option<i32>,
    pub is_critical: bool,
    pub is_winning: bool,
    pub evidence_line: Option<String>,
    pub evidence_moves: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RejectedAlternative {
    pub move_san: String,
    pub reason: String,
    pub branch_eval_cp: Option<i32>,
    pub stopped: bool,
    pub stop_reason: Option<StopReason>,
    pub branch_pv: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreatSummary {
    pub significance_cp: i32,
    pub best_move: String,
    pub threat_pv: Vec<String>,
    pub location: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reduction {
    pub primary_claim: PrimaryClaim,
    pub rejected_alternatives: Vec<RejectedAlternative>,
    pub threats: Vec<ThreatSummary>,
    pub key_insights: Vec<String>,
    pub narrative_summary: String,
    pub structured_facts: String,
}

fn pawns(cp: i32) -> f64 {
    f64::from(cp) / 100.0
}

fn fmt_cp(cp: Option<i32>) -> String {
    match cp {
        Some(cp) => format!("{:+.2}", pawns(cp)),
        None => "N/A".to_string(),
    }
}

pub fn reduce(result: &InvestigationResult, claims: &[Claim]) -> Reduction {
    let primary_claim = extract_primary(result, claims);
    let rejected_alternatives = extract_rejected(result);
    let threats = extract_threats(result);
    let key_insights = extract_insights(result);
    let narrative_summary =
        build_narrative(&primary_claim, &rejected_alternatives, &threats, &key_insights);
    let structured_facts =
        build_facts(&primary_claim, &rejected_alternatives, &threats);

    Reduction {
        primary_claim,
        rejected_alternatives,
        threats,
        key_insights,
        narrative_summary,
        structured_facts,
    }
}

fn extract_primary(result: &InvestigationResult, claims: &[Claim]) -> PrimaryClaim {
    let evidence_claim = claims.iter().find(|c| {
        c.payload
            .as_ref()
            .map(|p| !p.pgn_line.is_empty())
            .unwrap_or(false)
    });

    let mut primary = PrimaryClaim {
        best_move: result.best_move_deep_san.clone(),
        eval_start_cp: result.eval_before_cp.or(result.eval_deep_cp),
        eval_deep_cp: result.eval_deep_cp,
        eval_shallow_cp: result.eval_shallow_cp,
        is_critical: result.is_critical,
        is_winning: result.is_winning,
        ..PrimaryClaim::default()
    };

    if let Some(evidence) = &result.evidence {
        primary.eval_start_cp = evidence.eval_start_cp.or(primary.eval_start_cp);
        primary.eval_end_cp = evidence.eval_end_cp;
        primary.eval_delta_cp = evidence.eval_delta_cp;
        primary.evidence_line = Some(evidence.pgn_line.clone());
        primary.evidence_moves = evidence.moves_san.iter().take(8).cloned().collect();
    } else if let Some(claim) = evidence_claim {
        if let Some(payload) = &claim.payload {
            primary.evidence_line = Some(payload.pgn_line.clone());
            primary.evidence_moves = payload.pgn_moves.iter().take(8).cloned().collect();
        }
    }

    primary
}

fn extract_rejected(result: &InvestigationResult) -> Vec<RejectedAlternative> {
    let Some(tree) = &result.tree else {
        return Vec::new();
    };

    result
        .overestimated_moves
        .iter()
        .take(5)
        .map(|move_san| {
            let branch = tree
                .branches
                .iter()
                .find(|b| b.move_played_san.as_deref() == Some(move_san));
            let mut alternative = RejectedAlternative {
                move_san: move_san.clone(),
                reason: "Ranked highly at shallow depth but refuted by deep analysis".to_string(),
                ..RejectedAlternative::default()
            };
            if let Some(branch) = branch {
                alternative.branch_eval_cp = branch.eval_deep_cp;
                alternative.stopped = branch.stopped;
                alternative.stop_reason = branch.stop_reason;
                alternative.branch_pv = branch.pv_full.iter().take(6).cloned().collect();
                if branch.stop_reason == Some(StopReason::D2EvalBelowOriginal) {
                    alternative.reason =
                        "The position after this move is worse than the original position"
                            .to_string();
                }
            }
            alternative
        })
        .collect()
}

fn extract_threats(result: &InvestigationResult) -> Vec<ThreatSummary> {
    let mut threats = Vec::new();

    if let Some(tree) = &result.tree {
        if let Some(claim) = &tree.threat_claim {
            threats.push(summarize_threat(claim, "root".to_string()));
        }
    }
    for pv_threat in result.pv_threats.iter() {
        let location = format!(
            "PV move {} ({})",
            pv_threat.pv_move_index + 1,
            pv_threat.pv_move_san
        );
        threats.push(summarize_threat(&pv_threat.claim, location));
    }
    if let Some(tree) = &result.tree {
        for branch in &tree.branches {
            if let Some(claim) = &branch.threat_claim {
                let location = format!(
                    "Branch ({})",
                    branch.move_played_san.as_deref().unwrap_or("?")
                );
                threats.push(summarize_threat(claim, location));
            }
        }
    }

    threats.truncate(5);
    threats
}

fn summarize_threat(claim: &crate::investigate::tree::ThreatClaim, location: String) -> ThreatSummary {
    ThreatSummary {
        significance_cp: claim.significance_cp,
        best_move: claim.threat_move_san.clone(),
        threat_pv: claim.threat_pv_san.iter().take(6).cloned().collect(),
        explanation: format!(
            "Opponent has narrow options: best move ({}) is significantly better than the \
             alternatives, gap: {}cp",
            claim.threat_move_san, claim.significance_cp
        ),
        location,
    }
}

fn extract_insights(result: &InvestigationResult) -> Vec<String> {
    let mut insights = Vec::new();

    if result.is_critical {
        if let (Some(best), Some(second)) =
            (&result.best_move_deep_san, &result.second_best_deep_san)
        {
            let gap = result
                .best_move_deep_eval_cp
                .zip(result.second_best_deep_eval_cp)
                .map(|(a, b)| (a - b).abs())
                .unwrap_or(0);
            insights.push(format!(
                "Critical decision: {best} is significantly better than {second} (gap: {gap}cp)"
            ));
        }
    }
    if result.is_winning {
        insights.push("Position is winning for the side to move".to_string());
    }
    if !result.overestimated_moves.is_empty() {
        insights.push(format!(
            "Found {} move(s) that appear good at shallow depth but are worse at deep analysis",
            result.overestimated_moves.len()
        ));
    }
    if let Some(tree) = &result.tree {
        if !tree.branches.is_empty() {
            let stopped = tree.branches.iter().filter(|b| b.stopped).count();
            if stopped > 0 {
                insights.push(format!(
                    "Explored {} alternate lines, {} stopped due to evaluation drop",
                    tree.branches.len(),
                    stopped
                ));
            }
        }
    }
    if result.pv_full.len() > 10 {
        insights.push(format!(
            "Principal variation extends {} moves ahead",
            result.pv_full.len()
        ));
    }

    insights
}

fn build_narrative(
    primary: &PrimaryClaim,
    rejected: &[RejectedAlternative],
    threats: &[ThreatSummary],
    insights: &[String],
) -> String {
    let mut parts = Vec::new();

    parts.push(format!(
        "Position evaluation: {} pawns",
        fmt_cp(primary.eval_start_cp.or(primary.eval_deep_cp))
    ));
    if let Some(best) = &primary.best_move {
        parts.push(format!("Best move: {best}"));
    }
    if let (Some(end), Some(delta)) = (primary.eval_end_cp, primary.eval_delta_cp) {
        let direction = if delta > 0 {
            "improves"
        } else if delta < 0 {
            "worsens"
        } else {
            "maintains"
        };
        parts.push(format!(
            "After the best line, evaluation {direction} to {} ({} change)",
            fmt_cp(Some(end)),
            fmt_cp(Some(delta))
        ));
    }

    if !rejected.is_empty() {
        parts.push(format!("\nRejected alternatives ({}):", rejected.len()));
        for alt in rejected.iter().take(3) {
            parts.push(format!("  - {}: {}", alt.move_san, alt.reason));
        }
    }
    if !threats.is_empty() {
        parts.push(format!("\nSignificant threats detected ({}):", threats.len()));
        for threat in threats.iter().take(3) {
            parts.push(format!(
                "  - At {}: {}cp gap between best and second-best",
                threat.location, threat.significance_cp
            ));
        }
    }
    if !insights.is_empty() {
        parts.push("\nKey insights:".to_string());
        for insight in insights.iter().take(5) {
            parts.push(format!("  - {insight}"));
        }
    }

    parts.join("\n")
}

fn build_facts(
    primary: &PrimaryClaim,
    rejected: &[RejectedAlternative],
    threats: &[ThreatSummary],
) -> String {
    let mut parts = Vec::new();

    parts.push("=== PRIMARY CLAIM ===".to_string());
    parts.push(format!(
        "Best move: {}",
        primary.best_move.as_deref().unwrap_or("N/A")
    ));
    parts.push(format!("Eval (deep): {} pawns", fmt_cp(primary.eval_deep_cp)));
    parts.push(format!("Eval (shallow): {} pawns", fmt_cp(primary.eval_shallow_cp)));
    if primary.eval_start_cp.is_some() {
        parts.push(format!("Eval start: {} pawns", fmt_cp(primary.eval_start_cp)));
    }
    if primary.eval_end_cp.is_some() {
        parts.push(format!("Eval end: {} pawns", fmt_cp(primary.eval_end_cp)));
    }
    if primary.eval_delta_cp.is_some() {
        parts.push(format!("Eval delta: {} pawns", fmt_cp(primary.eval_delta_cp)));
    }
    if primary.is_critical {
        parts.push("CRITICAL: significant gap between best and second-best moves".to_string());
    }
    if primary.is_winning {
        parts.push("WINNING: best and second-best evals have opposite signs".to_string());
    }
    if !primary.evidence_moves.is_empty() {
        parts.push(format!("\nEvidence line: {}", primary.evidence_moves.join(" ")));
    }

    if !rejected.is_empty() {
        parts.push(format!("\n=== REJECTED ALTERNATIVES ({}) ===", rejected.len()));
        for (i, alt) in rejected.iter().take(3).enumerate() {
            parts.push(format!("{}. {}: {}", i + 1, alt.move_san, alt.reason));
            if let Some(eval) = alt.branch_eval_cp {
                parts.push(format!("   Branch eval: {} pawns", fmt_cp(Some(eval))));
            }
            if !alt.branch_pv.is_empty() {
                let pv: Vec<_> = alt.branch_pv.iter().take(4).cloned().collect();
                parts.push(format!("   Branch PV: {}", pv.join(" ")));
            }
        }
    }

    if !threats.is_empty() {
        parts.push(format!("\n=== THREATS ({}) ===", threats.len()));
        for (i, threat) in threats.iter().take(3).enumerate() {
            parts.push(format!(
                "{}. At {}: {}cp gap",
                i + 1,
                threat.location,
                threat.significance_cp
            ));
            parts.push(format!("   Best threat: {}", threat.best_move));
            if !threat.threat_pv.is_empty() {
                let pv: Vec<_> = threat.threat_pv.iter().take(4).cloned().collect();
                parts.push(format!("   Threat PV: {}", pv.join(" ")));
            }
        }
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Side;
    use crate::investigate::tree::{ExplorationNode, ThreatClaim};

    fn sample_result() -> InvestigationResult {
        let mut result = InvestigationResult::minimal(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        );
        result.best_move_deep_san = Some("Nf3".into());
        result.best_move_deep_eval_cp = Some(80);
        result.second_best_deep_san = Some("h4".into());
        result.second_best_deep_eval_cp = Some(-10);
        result.is_critical = true;
        result.is_winning = true;
        result.eval_deep_cp = Some(80);
        result.overestimated_moves = vec!["Qh5".into()];
        result.tree = Some(ExplorationNode {
            branches: vec![ExplorationNode {
                move_played_san: Some("Qh5".into()),
                eval_deep_cp: Some(-120),
                stopped: true,
                stop_reason: Some(crate::investigate::tree::StopReason::D2EvalBelowOriginal),
                pv_full: vec!["Nc6".into()],
                ..ExplorationNode::default()
            }],
            threat_claim: Some(ThreatClaim {
                significance_cp: 140,
                threat_move_san: "Qxf7#".into(),
                threat_pv_san: vec!["Qxf7#".into()],
                threat_eval_cp: Some(10_000),
                threat_eval_threatening_pov_cp: Some(10_000),
                threatening_side: Side::Black,
                threat_position_fen: String::new(),
                original_position_fen: String::new(),
            }),
            ..ExplorationNode::default()
        });
        result
    }

    #[test]
    fn test_reduce_collects_all_sections() {
        let reduction = reduce(&sample_result(), &[]);
        assert_eq!(reduction.primary_claim.best_move.as_deref(), Some("Nf3"));
        assert_eq!(reduction.rejected_alternatives.len(), 1);
        assert_eq!(reduction.threats.len(), 1);
        assert!(!reduction.key_insights.is_empty());
        assert!(reduction.narrative_summary.contains("Best move: Nf3"));
        assert!(reduction.structured_facts.contains("=== PRIMARY CLAIM ==="));
    }

    #[test]
    fn test_rejected_alternative_reason_tracks_stop() {
        let reduction = reduce(&sample_result(), &[]);
        let alt = &reduction.rejected_alternatives[0];
        assert_eq!(alt.move_san, "Qh5");
        assert!(alt.stopped);
        assert!(alt.reason.contains("worse than the original"));
        assert_eq!(alt.branch_eval_cp, Some(-120));
    }

    #[test]
    fn test_insights_mention_critical_gap() {
        let reduction = reduce(&sample_result(), &[]);
        assert!(reduction
            .key_insights
            .iter()
            .any(|i| i.contains("Critical decision") && i.contains("90cp")));
        assert!(reduction
            .key_insights
            .iter()
            .any(|i| i.contains("winning")));
    }

    #[test]
    fn test_threat_section_locations() {
        let reduction = reduce(&sample_result(), &[]);
        assert_eq!(reduction.threats[0].location, "root");
        assert_eq!(reduction.threats[0].best_move, "Qxf7#");
    }

    #[test]
    fn test_minimal_result_reduces_quietly() {
        let result = InvestigationResult::minimal("8/4k3/8/8/8/8/4K3/8 w - - 0 1");
        let reduction = reduce(&result, &[]);
        assert!(reduction.rejected_alternatives.is_empty());
        assert!(reduction.threats.is_empty());
        assert!(reduction.narrative_summary.contains("Position evaluation"));
    }
}
