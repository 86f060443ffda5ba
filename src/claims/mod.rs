// src/claims/mod.rs

//! Claims: the only currency the narrative layer is allowed to spend.
//! Each claim is a readable sentence, an optional causal connector, and a
//! short SAN evidence line copied from the investigation. A claim that
//! asserts causality without qualifying evidence is downgraded, never
//! trusted.

pub mod bind;
pub mod canonical;
pub mod reduce;

use serde::{Deserialize, Serialize};

use crate::analysis::tags::Tag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connector {
    #[default]
    None,
    Because,
    Allows,
    Creates,
    LeadsTo,
    Causes,
    ResultsIn,
    Therefore,
    SoThat,
    WhichMeans,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    Pv,
    Pgn,
    EvidenceIndex,
    Validated,
    MotifMiner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOrigin {
    Llm,
    #[default]
    Bind,
    Hammer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderHints {
    pub role: String,
    pub priority: i32,
    pub inline_pgn: bool,
}

impl Default for RenderHints {
    fn default() -> Self {
        RenderHints {
            role: "fact".to_string(),
            priority: 0,
            inline_pgn: false,
        }
    }
}

/// Everything a renderer may cite about the evidence line. Referentially
/// copied from the InvestigationResult; the binder never recomputes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidencePayload {
    pub pgn_line: String,
    pub pgn_moves: Vec<String>,
    pub theme_tags: Vec<String>,
    pub raw_tags: Vec<String>,
    pub tactic_tags: Vec<String>,
    pub tags_gained_net: Vec<String>,
    pub tags_lost_net: Vec<String>,
    pub tags_gained_net_structured: Vec<Tag>,
    pub tags_lost_net_structured: Vec<Tag>,
    pub roles_gained_net: Vec<String>,
    pub roles_lost_net: Vec<String>,
    pub eval_before_cp: Option<i32>,
    pub eval_after_cp: Option<i32>,
    pub eval_drop_cp: Option<i32>,
    pub evidence_eval_start_cp: Option<i32>,
    pub evidence_eval_end_cp: Option<i32>,
    pub evidence_material_start_cp: Option<i32>,
    pub evidence_material_end_cp: Option<i32>,
    pub evidence_positional_start_cp: Option<i32>,
    pub evidence_positional_end_cp: Option<i32>,
    pub material_change_net_cp: Option<i32>,
    pub key_eval_breakdown: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Must read as a complete sentence without the evidence line.
    pub summary: String,
    pub connector: Connector,
    pub evidence_moves: Vec<String>,
    pub evidence_source: Option<EvidenceSource>,
    pub payload: Option<EvidencePayload>,
    pub origin: ClaimOrigin,
    pub hints: RenderHints,
}

impl Claim {
    pub fn new(summary: &str) -> Self {
        Claim {
            summary: summary.to_string(),
            ..Claim::default()
        }
    }

    /// A hammer claim carries a connector and at least two evidence plies;
    /// it is the only claim class permitted to assert causality.
    pub fn is_hammer(&self) -> bool {
        self.connector != Connector::None && self.evidence_moves.len() >= 2
    }
}

/// Deterministic candidate claims for an investigation, before binding.
/// These are the rule-based proposals; an LLM may add its own, and both go
/// through the same binding and canonicalization gauntlet.
pub fn propose_claims(result: &crate::investigate::InvestigationResult) -> Vec<Claim> {
    let mut claims = Vec::new();

    if let Some(best) = &result.best_move_deep_san {
        let mut claim = Claim::new(&format!("The strongest continuation is {best}."));
        claim.hints.role = "baseline".to_string();
        claim.hints.priority = 10;
        claims.push(claim);
    }

    if let Some(evidence) = &result.evidence {
        if evidence.moves_san.len() >= 2 {
            let direction = match evidence.eval_delta_cp {
                Some(delta) if delta > 20 => "improves the position",
                Some(delta) if delta < -20 => "concedes ground",
                _ => "keeps the balance",
            };
            let mut claim = Claim::new(&format!("Following the main line {direction}."));
            claim.connector = Connector::LeadsTo;
            claim.hints.role = "evidence_line".to_string();
            claim.hints.inline_pgn = true;
            claims.push(claim);
        }
    }

    for move_san in result.overestimated_moves.iter().take(3) {
        let mut claim = Claim::new(&format!(
            "{move_san} looks tempting at shallow depth but deep analysis refutes it."
        ));
        claim.connector = Connector::Because;
        claim.hints.role = "overestimated_move".to_string();
        claims.push(claim);
    }

    if let Some(tree) = &result.tree {
        if let Some(threat) = &tree.threat_claim {
            let mut claim = Claim::new(&format!(
                "With a free tempo, {} would play {} ({}cp swing).",
                threat.threatening_side, threat.threat_move_san, threat.significance_cp
            ));
            claim.hints.role = "threat".to_string();
            claims.push(claim);
        }
    }

    claims
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_wire_names() {
        assert_eq!(serde_json::to_string(&Connector::None).unwrap(), "\"none\"");
        assert_eq!(serde_json::to_string(&Connector::LeadsTo).unwrap(), "\"leads_to\"");
        assert_eq!(serde_json::to_string(&Connector::WhichMeans).unwrap(), "\"which_means\"");
    }

    #[test]
    fn test_hammer_requires_connector_and_moves() {
        let mut claim = Claim::new("White wins a pawn.");
        assert!(!claim.is_hammer());
        claim.connector = Connector::Because;
        assert!(!claim.is_hammer());
        claim.evidence_moves = vec!["Qxb7".into(), "Rb8".into()];
        assert!(claim.is_hammer());
    }

    #[test]
    fn test_claim_round_trips_through_json() {
        let claim = Claim {
            summary: "The knight is overworked.".into(),
            connector: Connector::Because,
            evidence_moves: vec!["Nxe5".into(), "Qxd4".into()],
            evidence_source: Some(EvidenceSource::Pv),
            origin: ClaimOrigin::Llm,
            ..Claim::default()
        };
        let json = serde_json::to_string(&claim).unwrap();
        let back: Claim = serde_json::from_str(&json).unwrap();
        assert_eq!(claim, back);
    }
}
