// src/investigate/tree.rs

//! The exploration tree produced by dual-depth investigation. Nodes own
//! their subtrees outright and are immutable once returned; a branch can
//! never reference a sibling.

use serde::{Deserialize, Serialize};

use crate::board::Side;
use crate::engine::TopMove;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The child's shallow eval fell below the deep baseline at the root:
    /// the shallow engine no longer believes in this line.
    D2EvalBelowOriginal,
    /// Shallow and deep agree here; nothing left to refute.
    NoOverestimatedMoves,
    DepthLimit,
}

/// Emitted when, after a hypothetical side-to-move swap, the gap between
/// the best and second-best deep replies reaches the significance bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatClaim {
    pub significance_cp: i32,
    pub threat_move_san: String,
    pub threat_pv_san: Vec<String>,
    /// White-POV eval of the best threat reply.
    pub threat_eval_cp: Option<i32>,
    /// Same eval, sign-normalized to the threatening side's perspective.
    pub threat_eval_threatening_pov_cp: Option<i32>,
    pub threatening_side: Side,
    /// The swapped-turn position the threat engine call saw.
    pub threat_position_fen: String,
    pub original_position_fen: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplorationNode {
    pub fen: String,
    /// `None` at the root of the tree.
    pub move_played_san: Option<String>,
    pub eval_deep_cp: Option<i32>,
    pub eval_shallow_cp: Option<i32>,
    pub best_move_deep_san: Option<String>,
    pub best_move_deep_eval_cp: Option<i32>,
    pub second_best_deep_san: Option<String>,
    pub second_best_deep_eval_cp: Option<i32>,
    pub is_critical: bool,
    pub is_winning: bool,
    pub pv_full: Vec<String>,
    pub overestimated_moves: Vec<String>,
    pub threat_claim: Option<ThreatClaim>,
    pub branches: Vec<ExplorationNode>,
    pub stopped: bool,
    pub stop_reason: Option<StopReason>,
    pub terminal_top_moves_deep: Vec<TopMove>,
}

impl ExplorationNode {
    pub fn count_nodes(&self) -> usize {
        1 + self.branches.iter().map(ExplorationNode::count_nodes).sum::<usize>()
    }

    pub fn stopped_branches(&self) -> usize {
        let own = usize::from(self.stopped);
        own + self.branches.iter().map(ExplorationNode::stopped_branches).sum::<usize>()
    }
}

/// A shallow sub-exploration hung off an interior PV ply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvBranch {
    pub pv_move_index: usize,
    pub pv_move_san: String,
    pub node: ExplorationNode,
}

/// A threat discovered at an interior PV ply (before the move is played).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvThreat {
    pub pv_move_index: usize,
    pub pv_move_san: String,
    pub claim: ThreatClaim,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&StopReason::D2EvalBelowOriginal).unwrap(),
            "\"d2_eval_below_original\""
        );
        assert_eq!(
            serde_json::to_string(&StopReason::NoOverestimatedMoves).unwrap(),
            "\"no_overestimated_moves\""
        );
        assert_eq!(serde_json::to_string(&StopReason::DepthLimit).unwrap(), "\"depth_limit\"");
    }

    #[test]
    fn test_node_counting() {
        let leaf = ExplorationNode {
            stopped: true,
            stop_reason: Some(StopReason::NoOverestimatedMoves),
            ..ExplorationNode::default()
        };
        let root = ExplorationNode {
            branches: vec![leaf.clone(), leaf],
            ..ExplorationNode::default()
        };
        assert_eq!(root.count_nodes(), 3);
        assert_eq!(root.stopped_branches(), 2);
    }
}
