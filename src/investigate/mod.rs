// src/investigate/mod.rs

//! The dual-depth investigator. One deep search tells us the truth about a
//! position; one shallow search tells us which moves *look* attractive.
//! The difference between the two is the story worth explaining: shallow
//! favourites that deep search refutes get expanded into a bounded
//! exploration tree, with threats measured at every node.

pub mod cache;
pub mod evidence;
pub mod threat;
pub mod tree;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use shakmaty::Position;
use tracing::{debug, info};

use crate::analysis::{scan_fen, PositionScan};
use crate::board::{game_phase, parse_fen, parse_san_lenient, position_fen, san_of, GamePhase, Side};
use crate::config::InvestigatorConfig;
use crate::constants::{PV_BRANCH_DEPTH_LIMIT, PV_BRANCH_LIMIT, SHALLOW_MULTIPV};
use crate::engine::{AnalysisResult, EngineHandle, TopMove};
use crate::event::{EventBroker, ProgressEvent};
use crate::goal::search::GoalSearchResult;

use cache::{LeafCache, ResultCache, ResultKey};
use evidence::EvidenceLine;
use tree::{ExplorationNode, PvBranch, PvThreat, StopReason, ThreatClaim};

/// Aggregate answer for one investigation request. Serializable without
/// loss; owned by the orchestrator until it moves into the result cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvestigationResult {
    pub fen: String,
    /// Position before the player's move, when a move was investigated.
    pub original_fen: Option<String>,
    pub game_phase: Option<GamePhase>,
    pub player_move_san: Option<String>,
    pub eval_before_cp: Option<i32>,
    pub eval_after_cp: Option<i32>,
    /// Positive means the mover lost ground, from the mover's perspective.
    pub eval_drop_cp: Option<i32>,
    pub eval_deep_cp: Option<i32>,
    pub eval_shallow_cp: Option<i32>,
    pub best_move_deep_san: Option<String>,
    pub best_move_deep_eval_cp: Option<i32>,
    pub second_best_deep_san: Option<String>,
    pub second_best_deep_eval_cp: Option<i32>,
    pub is_critical: bool,
    pub is_winning: bool,
    pub top_moves_shallow: Vec<TopMove>,
    pub overestimated_moves: Vec<String>,
    pub pv_full: Vec<String>,
    pub mistake: Option<MistakeSeverity>,
    pub urgency: Option<Urgency>,
    pub tree: Option<ExplorationNode>,
    pub pv_threats: Vec<PvThreat>,
    pub pv_branches: Vec<PvBranch>,
    pub root_scan: Option<PositionScan>,
    pub evidence: Option<EvidenceLine>,
    pub goal_search: Option<GoalSearchResult>,
    pub pgn_exploration: String,
    pub assumptions: Vec<String>,
}

impl InvestigationResult {
    /// The guaranteed-well-formed fallback: phase classification only.
    pub fn minimal(fen: &str) -> Self {
        InvestigationResult {
            fen: fen.to_string(),
            game_phase: parse_fen(fen).map(|pos| game_phase(&pos)),
            ..InvestigationResult::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MistakeSeverity {
    None,
    Inaccuracy,
    Mistake,
    Blunder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Normal,
    High,
    Critical,
}

/// Severity bands over the magnitude of the eval drop.
pub fn classify_mistake(eval_drop_cp: i32) -> MistakeSeverity {
    let drop = eval_drop_cp.abs();
    if drop > 300 {
        MistakeSeverity::Blunder
    } else if drop > 150 {
        MistakeSeverity::Mistake
    } else if drop > 50 {
        MistakeSeverity::Inaccuracy
    } else {
        MistakeSeverity::None
    }
}

/// How sharp the position is, from the magnitude of its eval.
pub fn classify_urgency(eval_cp: i32) -> Urgency {
    let eval = eval_cp.abs();
    if eval > 300 {
        Urgency::Critical
    } else if eval > 150 {
        Urgency::High
    } else {
        Urgency::Normal
    }
}

/// What the dual-depth core learned about one root position.
struct DualDepthOutcome {
    tree: ExplorationNode,
    top_moves_shallow: Vec<TopMove>,
    eval_shallow_cp: Option<i32>,
    pv_threats: Vec<PvThreat>,
    pv_branches: Vec<PvBranch>,
}

pub struct Investigator {
    engine: Arc<EngineHandle>,
    config: InvestigatorConfig,
    leaf_cache: Mutex<LeafCache>,
    result_cache: Mutex<ResultCache>,
    events: EventBroker,
}

impl Investigator {
    pub fn new(engine: Arc<EngineHandle>, config: InvestigatorConfig) -> Self {
        let leaf_cache = Mutex::new(LeafCache::new(config.leaf_cache_size));
        let result_cache = Mutex::new(ResultCache::new(config.result_cache_size));
        Investigator {
            engine,
            config,
            leaf_cache,
            result_cache,
            events: EventBroker::new(),
        }
    }

    pub fn config(&self) -> &InvestigatorConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBroker {
        &self.events
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Single-PV analysis through the leaf cache.
    pub async fn analyze_cached(&self, fen: &str, depth: u32) -> AnalysisResult {
        if let Some(hit) = self.leaf_cache.lock().unwrap().probe(fen, depth) {
            return hit;
        }
        let result = self.engine.analyze(fen, depth, 1).await;
        self.leaf_cache.lock().unwrap().store(fen, depth, &result);
        result
    }

    /// Two-line analysis for critical/winning detection; never cached.
    pub async fn analyze_top2(&self, fen: &str, depth: u32) -> AnalysisResult {
        self.engine.analyze(fen, depth, 2).await
    }

    /// Wide shallow analysis used for overestimated-move detection.
    async fn analyze_shallow(&self, fen: &str) -> AnalysisResult {
        self.engine
            .analyze(fen, self.config.depth_shallow, SHALLOW_MULTIPV)
            .await
    }

    /// Overestimated moves: shallow candidates ranked above the deep best
    /// move in the shallow ordering. If the deep best does not appear in
    /// the shallow list at all, every shallow candidate is suspect.
    pub fn find_overestimated_moves(deep: &AnalysisResult, shallow: &AnalysisResult) -> Vec<String> {
        let Some(deep_best) = deep.best_move_san.as_deref() else {
            return Vec::new();
        };
        let deep_rank_in_shallow = shallow
            .top_moves
            .iter()
            .find(|m| m.move_san == deep_best)
            .map(|m| m.rank);
        match deep_rank_in_shallow {
            None => shallow.top_moves.iter().map(|m| m.move_san.clone()).collect(),
            Some(rank) => shallow
                .top_moves
                .iter()
                .filter(|m| m.rank < rank)
                .map(|m| m.move_san.clone())
                .collect(),
        }
    }

    fn critical_winning(deep: &AnalysisResult) -> (bool, bool) {
        let best = deep.top_moves.first().and_then(|m| m.eval_cp);
        let second = deep.top_moves.get(1).and_then(|m| m.eval_cp);
        match (best, second) {
            (Some(a), Some(b)) => {
                let critical = (a - b).abs() > crate::constants::CRITICAL_GAP_CP;
                let winning = (a > 0 && b < 0) || (a < 0 && b > 0);
                (critical, winning)
            }
            _ => (false, false),
        }
    }

    /// Rewrite the PV so it starts with the deep best move. Some engine
    /// bindings return misaligned multi-PV output; downstream anchoring
    /// assumes they match.
    fn align_pv(best_move_san: Option<&str>, pv: Vec<String>, max_plies: usize) -> Vec<String> {
        let mut pv = pv;
        if let Some(best) = best_move_san {
            if pv.first().map(String::as_str) != Some(best) {
                let mut aligned = vec![best.to_string()];
                aligned.extend(pv.into_iter().filter(|m| m != best));
                pv = aligned;
            }
        }
        if max_plies > 0 {
            pv.truncate(max_plies);
        }
        pv
    }

    fn cap_branching(&self, mut moves: Vec<String>) -> Vec<String> {
        if let Some(limit) = self.config.branching_limit {
            moves.truncate(limit);
        }
        moves
    }

    /// Investigate a position with dual-depth search and recursive
    /// branching over overestimated moves.
    pub async fn investigate_with_dual_depth(&self, fen: &str) -> InvestigationResult {
        let key = ResultKey {
            fen: fen.to_string(),
            move_san: None,
            kind: "position".to_string(),
            variant: self.config.variant_tag(),
        };
        if let Some(hit) = self.result_cache.lock().unwrap().probe(&key) {
            debug!(fen, "investigation cache hit");
            return hit;
        }

        let mut result = self.investigate_position_uncached(fen).await;
        if result.game_phase.is_none() {
            // Malformed FEN: the minimal result is the whole answer.
            return result;
        }
        let pgn = crate::pgn::build_exploration_pgn(self, &result).await;
        result.pgn_exploration = pgn;

        self.result_cache.lock().unwrap().store(key, &result);
        self.events.publish(ProgressEvent::InvestigationComplete {
            fen: fen.to_string(),
            move_san: None,
        });
        result
    }

    async fn investigate_position_uncached(&self, fen: &str) -> InvestigationResult {
        let Some(_pos) = parse_fen(fen) else {
            let mut minimal = InvestigationResult::minimal(fen);
            minimal.assumptions.push("malformed_fen".to_string());
            return minimal;
        };

        info!(fen, "starting dual-depth investigation");
        self.events.publish(ProgressEvent::Status {
            message: format!("Investigating {fen}"),
        });

        let mut result = InvestigationResult::minimal(fen);
        result.root_scan = Some(scan_fen(fen));

        let outcome = self.dual_depth_core(fen).await;
        let root = &outcome.tree;
        result.eval_deep_cp = root.eval_deep_cp;
        result.eval_shallow_cp = outcome.eval_shallow_cp;
        result.best_move_deep_san = root.best_move_deep_san.clone();
        result.best_move_deep_eval_cp = root.best_move_deep_eval_cp;
        result.second_best_deep_san = root.second_best_deep_san.clone();
        result.second_best_deep_eval_cp = root.second_best_deep_eval_cp;
        result.is_critical = root.is_critical;
        result.is_winning = root.is_winning;
        result.pv_full = root.pv_full.clone();
        result.overestimated_moves = root.overestimated_moves.clone();
        result.top_moves_shallow = outcome.top_moves_shallow;
        result.pv_threats = outcome.pv_threats;
        result.pv_branches = outcome.pv_branches;
        result.eval_before_cp = root.eval_deep_cp;
        result.urgency = root.eval_deep_cp.map(classify_urgency);

        result.evidence = evidence::build_evidence_line(
            self,
            fen,
            None,
            &result.pv_full.clone(),
            result.eval_deep_cp,
        )
        .await;

        result.tree = Some(outcome.tree);
        result
    }

    /// Investigate a specific played move: eval before/after/drop plus a
    /// dual-depth exploration of the position the move leaves behind.
    pub async fn investigate_move(&self, fen: &str, move_san: &str) -> InvestigationResult {
        let key = ResultKey {
            fen: fen.to_string(),
            move_san: Some(move_san.to_string()),
            kind: "move".to_string(),
            variant: self.config.variant_tag(),
        };
        if let Some(hit) = self.result_cache.lock().unwrap().probe(&key) {
            debug!(fen, move_san, "move investigation cache hit");
            return hit;
        }

        let Some(pos) = parse_fen(fen) else {
            let mut minimal = InvestigationResult::minimal(fen);
            minimal.assumptions.push("malformed_fen".to_string());
            return minimal;
        };
        let Some(m) = parse_san_lenient(&pos, move_san) else {
            let mut minimal = InvestigationResult::minimal(fen);
            minimal
                .assumptions
                .push(format!("illegal_move:{move_san}"));
            return minimal;
        };
        let canonical_san = san_of(&pos, m);
        let mover = Side::from(pos.turn());

        self.events.publish(ProgressEvent::MoveInvestigationStart {
            move_san: canonical_san.clone(),
            fen: fen.to_string(),
        });
        info!(fen, move_san = %canonical_san, "starting move investigation");

        // Deep look at the pre-move position: baseline eval and the best
        // alternative the player passed up.
        let before = self.analyze_top2(fen, self.config.depth_deep).await;

        let mut after_pos = pos.clone();
        after_pos.play_unchecked(m);
        let fen_after = position_fen(&after_pos);
        self.events.publish(ProgressEvent::MovePlayed {
            move_san: canonical_san.clone(),
            fen: fen_after.clone(),
        });

        let mut result = InvestigationResult::minimal(fen);
        result.original_fen = Some(fen.to_string());
        result.player_move_san = Some(canonical_san.clone());
        result.root_scan = Some(scan_fen(fen));
        result.eval_before_cp = before.eval_cp;

        let outcome = self.dual_depth_core(&fen_after).await;
        let root = &outcome.tree;
        result.eval_after_cp = root.eval_deep_cp;
        result.eval_drop_cp = match (result.eval_before_cp, result.eval_after_cp) {
            (Some(before_cp), Some(after_cp)) => {
                let drop_white = before_cp - after_cp;
                Some(match mover {
                    Side::White => drop_white,
                    Side::Black => -drop_white,
                })
            }
            _ => None,
        };
        result.mistake = result.eval_drop_cp.map(classify_mistake);
        result.urgency = root.eval_deep_cp.map(classify_urgency);
        result.eval_deep_cp = root.eval_deep_cp;
        result.eval_shallow_cp = outcome.eval_shallow_cp;
        result.best_move_deep_san = before.best_move_san.clone();
        result.best_move_deep_eval_cp = before.top_moves.first().and_then(|t| t.eval_cp);
        result.second_best_deep_san = before.second_best_san.clone();
        result.second_best_deep_eval_cp = before.second_best_eval_cp;
        let (is_critical, is_winning) = Self::critical_winning(&before);
        result.is_critical = is_critical;
        result.is_winning = is_winning;
        result.pv_full = root.pv_full.clone();
        result.overestimated_moves = root.overestimated_moves.clone();
        result.top_moves_shallow = outcome.top_moves_shallow;
        result.pv_threats = outcome.pv_threats;
        result.pv_branches = outcome.pv_branches;

        // Evidence anchors on the player's move and continues into the PV
        // of the resulting position.
        result.evidence = evidence::build_evidence_line(
            self,
            fen,
            Some(canonical_san.as_str()),
            &root.pv_full.clone(),
            result.eval_before_cp,
        )
        .await;

        result.fen = fen_after;
        result.tree = Some(outcome.tree);
        let pgn = crate::pgn::build_exploration_pgn(self, &result).await;
        result.pgn_exploration = pgn;

        self.result_cache.lock().unwrap().store(key, &result);
        self.events.publish(ProgressEvent::InvestigationComplete {
            fen: fen.to_string(),
            move_san: Some(canonical_san),
        });
        result
    }

    /// Goal-directed search entry; shares the engine and caches with the
    /// dual-depth path.
    pub async fn investigate_target(
        &self,
        fen: &str,
        goal: &serde_json::Value,
        policy: crate::goal::search::TargetPolicy,
    ) -> InvestigationResult {
        let mut result = InvestigationResult::minimal(fen);
        if result.game_phase.is_none() {
            result.assumptions.push("malformed_fen".to_string());
            return result;
        }
        result.root_scan = Some(scan_fen(fen));
        let search = crate::goal::search::run_target_search(self, fen, goal, policy).await;
        result.pv_full = search.witness_line_san.clone();
        result.assumptions.extend(search.assumptions.clone());
        result.pgn_exploration = search.pgn.clone();
        result.goal_search = Some(search);
        result
    }

    /// The dual-depth algorithm at the root: deep truth, shallow illusion,
    /// overestimated branching, threats, and mid-PV sub-exploration.
    async fn dual_depth_core(&self, fen: &str) -> DualDepthOutcome {
        // Equal depths short-circuit to a single engine call per node.
        if self.config.depth_deep == self.config.depth_shallow {
            let single = self.analyze_cached(fen, self.config.depth_deep).await;
            let pv = Self::align_pv(
                single.best_move_san.as_deref(),
                single.pv_san.clone(),
                self.config.pv_max_plies,
            );
            let tree = ExplorationNode {
                fen: fen.to_string(),
                eval_deep_cp: single.eval_cp,
                eval_shallow_cp: single.eval_cp,
                best_move_deep_san: single.best_move_san.clone(),
                best_move_deep_eval_cp: single.top_moves.first().and_then(|t| t.eval_cp),
                pv_full: pv,
                ..ExplorationNode::default()
            };
            return DualDepthOutcome {
                tree,
                top_moves_shallow: single.top_moves,
                eval_shallow_cp: single.eval_cp,
                pv_threats: Vec::new(),
                pv_branches: Vec::new(),
            };
        }

        let deep = self.analyze_top2(fen, self.config.depth_deep).await;
        let shallow = self.analyze_shallow(fen).await;
        let (is_critical, is_winning) = Self::critical_winning(&deep);
        let pv_full = Self::align_pv(
            deep.best_move_san.as_deref(),
            deep.pv_san.clone(),
            self.config.pv_max_plies,
        );
        let overestimated = self.cap_branching(Self::find_overestimated_moves(&deep, &shallow));
        debug!(
            fen,
            overestimated = overestimated.len(),
            critical = is_critical,
            "root dual-depth analysis done"
        );

        let threat_claim = threat::analyze_threat_at(self, fen, self.config.depth_deep).await;

        let mut root = ExplorationNode {
            fen: fen.to_string(),
            move_played_san: None,
            eval_deep_cp: deep.eval_cp,
            eval_shallow_cp: shallow.eval_cp,
            best_move_deep_san: deep.best_move_san.clone(),
            best_move_deep_eval_cp: deep.top_moves.first().and_then(|t| t.eval_cp),
            second_best_deep_san: deep.second_best_san.clone(),
            second_best_deep_eval_cp: deep.second_best_eval_cp,
            is_critical,
            is_winning,
            pv_full: pv_full.clone(),
            overestimated_moves: overestimated.clone(),
            threat_claim,
            ..ExplorationNode::default()
        };

        // Pre-order DFS over the overestimated moves, in discovery order.
        if let Some(pos) = parse_fen(fen) {
            let perspective = pos.turn();
            for move_san in &overestimated {
                let Some(m) = parse_san_lenient(&pos, move_san) else {
                    continue;
                };
                let mut child = pos.clone();
                child.play_unchecked(m);
                let child_fen = position_fen(&child);
                self.events.publish(ProgressEvent::MoveExplored {
                    move_san: move_san.clone(),
                    fen: child_fen.clone(),
                    eval_cp: deep.eval_cp,
                    depth: 0,
                });
                let branch = self
                    .explore_branch(
                        child_fen,
                        Some(move_san.clone()),
                        deep.eval_cp,
                        1,
                        self.config.branch_depth_limit,
                    )
                    .await;
                self.events.publish(ProgressEvent::BranchAdded {
                    move_san: move_san.clone(),
                    depth: 1,
                });
                root.branches.push(branch);
            }

            let (pv_threats, pv_branches) = self
                .explore_along_pv(&pos, &pv_full, perspective, deep.eval_cp)
                .await;
            return DualDepthOutcome {
                tree: root,
                top_moves_shallow: shallow.top_moves,
                eval_shallow_cp: shallow.eval_cp,
                pv_threats,
                pv_branches,
            };
        }

        DualDepthOutcome {
            tree: root,
            top_moves_shallow: shallow.top_moves,
            eval_shallow_cp: shallow.eval_cp,
            pv_threats: Vec::new(),
            pv_branches: Vec::new(),
        }
    }

    /// Walk the PV. At every interior node: threat analysis; at nodes where
    /// the perspective side is to move, a shallow sub-exploration over up
    /// to two overestimated moves. Refutations that only materialize
    /// mid-PV surface here.
    async fn explore_along_pv(
        &self,
        root_pos: &shakmaty::Chess,
        pv_full: &[String],
        perspective: shakmaty::Color,
        root_deep_eval_cp: Option<i32>,
    ) -> (Vec<PvThreat>, Vec<PvBranch>) {
        let mut threats = Vec::new();
        let mut branches = Vec::new();
        let mut board = root_pos.clone();

        for (move_idx, move_san) in pv_full.iter().enumerate() {
            if move_idx > 0 {
                let node_fen = position_fen(&board);

                if let Some(claim) =
                    threat::analyze_threat_at(self, &node_fen, self.config.depth_deep).await
                {
                    debug!(ply = move_idx, gap = claim.significance_cp, "threat along PV");
                    threats.push(PvThreat {
                        pv_move_index: move_idx,
                        pv_move_san: move_san.clone(),
                        claim,
                    });
                }

                if board.turn() == perspective {
                    let deep = self.analyze_cached(&node_fen, self.config.depth_deep).await;
                    let shallow = self.analyze_shallow(&node_fen).await;
                    let overestimated = Self::find_overestimated_moves(&deep, &shallow);
                    for over_move in overestimated.iter().take(PV_BRANCH_LIMIT) {
                        let Some(m) = parse_san_lenient(&board, over_move) else {
                            continue;
                        };
                        let mut child = board.clone();
                        child.play_unchecked(m);
                        let branch = self
                            .explore_branch(
                                position_fen(&child),
                                Some(over_move.clone()),
                                root_deep_eval_cp,
                                1,
                                PV_BRANCH_DEPTH_LIMIT,
                            )
                            .await;
                        branches.push(PvBranch {
                            pv_move_index: move_idx,
                            pv_move_san: move_san.clone(),
                            node: branch,
                        });
                    }
                }
            }

            let Some(m) = parse_san_lenient(&board, move_san) else {
                debug!(move_san = %move_san, "PV move not legal, stopping PV traversal");
                break;
            };
            board.play_unchecked(m);
        }

        (threats, branches)
    }

    /// Recursively explore one branch until a stop condition fires.
    fn explore_branch(
        &self,
        fen: String,
        move_played: Option<String>,
        root_deep_eval_cp: Option<i32>,
        current_depth: u32,
        depth_limit: u32,
    ) -> Pin<Box<dyn Future<Output = ExplorationNode> + Send + '_>> {
        Box::pin(async move {
            if current_depth >= depth_limit {
                let quick = self.analyze_cached(&fen, self.config.depth_deep).await;
                let pv = Self::align_pv(
                    quick.best_move_san.as_deref(),
                    quick.pv_san.clone(),
                    self.config.pv_max_plies,
                );
                return ExplorationNode {
                    fen,
                    move_played_san: move_played,
                    eval_deep_cp: quick.eval_cp,
                    best_move_deep_san: quick.best_move_san.clone(),
                    pv_full: pv,
                    stopped: true,
                    stop_reason: Some(StopReason::DepthLimit),
                    terminal_top_moves_deep: quick.top_moves.into_iter().take(1).collect(),
                    ..ExplorationNode::default()
                };
            }

            let deep = self.analyze_top2(&fen, self.config.depth_deep).await;
            let shallow = self.analyze_shallow(&fen).await;
            let (is_critical, is_winning) = Self::critical_winning(&deep);
            let pv_full = Self::align_pv(
                deep.best_move_san.as_deref(),
                deep.pv_san.clone(),
                self.config.pv_max_plies,
            );

            // The shallow engine has stopped believing in this line.
            if let (Some(shallow_cp), Some(root_cp)) = (shallow.eval_cp, root_deep_eval_cp) {
                if shallow_cp < root_cp {
                    debug!(
                        fen,
                        shallow_cp, root_cp, "branch stopped: shallow eval below deep baseline"
                    );
                    return ExplorationNode {
                        fen,
                        move_played_san: move_played,
                        eval_deep_cp: deep.eval_cp,
                        eval_shallow_cp: shallow.eval_cp,
                        best_move_deep_san: deep.best_move_san.clone(),
                        best_move_deep_eval_cp: deep.top_moves.first().and_then(|t| t.eval_cp),
                        second_best_deep_san: deep.second_best_san.clone(),
                        second_best_deep_eval_cp: deep.second_best_eval_cp,
                        is_critical,
                        is_winning,
                        pv_full,
                        stopped: true,
                        stop_reason: Some(StopReason::D2EvalBelowOriginal),
                        terminal_top_moves_deep: deep.top_moves.into_iter().take(1).collect(),
                        ..ExplorationNode::default()
                    };
                }
            }

            let threat_claim = threat::analyze_threat_at(self, &fen, self.config.depth_deep).await;
            let overestimated = self.cap_branching(Self::find_overestimated_moves(&deep, &shallow));

            if overestimated.is_empty() {
                return ExplorationNode {
                    fen,
                    move_played_san: move_played,
                    eval_deep_cp: deep.eval_cp,
                    eval_shallow_cp: shallow.eval_cp,
                    best_move_deep_san: deep.best_move_san.clone(),
                    best_move_deep_eval_cp: deep.top_moves.first().and_then(|t| t.eval_cp),
                    second_best_deep_san: deep.second_best_san.clone(),
                    second_best_deep_eval_cp: deep.second_best_eval_cp,
                    is_critical,
                    is_winning,
                    pv_full,
                    threat_claim,
                    stopped: true,
                    stop_reason: Some(StopReason::NoOverestimatedMoves),
                    terminal_top_moves_deep: deep.top_moves.into_iter().take(1).collect(),
                    ..ExplorationNode::default()
                };
            }

            let mut node = ExplorationNode {
                fen: fen.clone(),
                move_played_san: move_played,
                eval_deep_cp: deep.eval_cp,
                eval_shallow_cp: shallow.eval_cp,
                best_move_deep_san: deep.best_move_san.clone(),
                best_move_deep_eval_cp: deep.top_moves.first().and_then(|t| t.eval_cp),
                second_best_deep_san: deep.second_best_san.clone(),
                second_best_deep_eval_cp: deep.second_best_eval_cp,
                is_critical,
                is_winning,
                pv_full,
                overestimated_moves: overestimated.clone(),
                threat_claim,
                terminal_top_moves_deep: deep.top_moves.iter().take(1).cloned().collect(),
                ..ExplorationNode::default()
            };

            let Some(pos) = parse_fen(&fen) else {
                return node;
            };
            for move_san in &overestimated {
                let Some(m) = parse_san_lenient(&pos, move_san) else {
                    continue;
                };
                let mut child = pos.clone();
                child.play_unchecked(m);
                let child_fen = position_fen(&child);
                self.events.publish(ProgressEvent::MoveExplored {
                    move_san: move_san.clone(),
                    fen: child_fen.clone(),
                    eval_cp: deep.eval_cp,
                    depth: current_depth,
                });
                let branch = self
                    .explore_branch(
                        child_fen,
                        Some(move_san.clone()),
                        root_deep_eval_cp,
                        current_depth + 1,
                        depth_limit,
                    )
                    .await;
                self.events.publish(ProgressEvent::BranchAdded {
                    move_san: move_san.clone(),
                    depth: current_depth + 1,
                });
                node.branches.push(branch);
            }

            node
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AnalysisResult, TopMove};

    fn top(san: &str, eval_cp: i32, rank: u32) -> TopMove {
        TopMove {
            move_san: san.to_string(),
            move_uci: String::new(),
            eval_cp: Some(eval_cp),
            rank,
        }
    }

    fn deep_with_best(san: &str) -> AnalysisResult {
        AnalysisResult {
            best_move_san: Some(san.to_string()),
            top_moves: vec![top(san, 40, 1)],
            ..AnalysisResult::default()
        }
    }

    #[test]
    fn test_overestimated_moves_above_deep_best() {
        let deep = deep_with_best("Nf3");
        let shallow = AnalysisResult {
            top_moves: vec![top("Qxb7", 120, 1), top("Bc4", 60, 2), top("Nf3", 40, 3)],
            ..AnalysisResult::default()
        };
        assert_eq!(
            Investigator::find_overestimated_moves(&deep, &shallow),
            vec!["Qxb7", "Bc4"]
        );
    }

    #[test]
    fn test_overestimated_empty_when_shallow_agrees() {
        let deep = deep_with_best("Nf3");
        let shallow = AnalysisResult {
            top_moves: vec![top("Nf3", 40, 1), top("Bc4", 10, 2)],
            ..AnalysisResult::default()
        };
        assert!(Investigator::find_overestimated_moves(&deep, &shallow).is_empty());
    }

    #[test]
    fn test_overestimated_all_when_deep_best_missing() {
        let deep = deep_with_best("h3");
        let shallow = AnalysisResult {
            top_moves: vec![top("Qxb7", 120, 1), top("Bc4", 60, 2)],
            ..AnalysisResult::default()
        };
        assert_eq!(
            Investigator::find_overestimated_moves(&deep, &shallow),
            vec!["Qxb7", "Bc4"]
        );
    }

    #[test]
    fn test_overestimated_empty_without_deep_best() {
        let deep = AnalysisResult::default();
        let shallow = AnalysisResult {
            top_moves: vec![top("e4", 0, 1)],
            ..AnalysisResult::default()
        };
        assert!(Investigator::find_overestimated_moves(&deep, &shallow).is_empty());
    }

    #[test]
    fn test_critical_and_winning_flags() {
        let node = AnalysisResult {
            top_moves: vec![top("Qxh7", 320, 1), top("Nf3", -40, 2)],
            ..AnalysisResult::default()
        };
        let (critical, winning) = Investigator::critical_winning(&node);
        assert!(critical);
        assert!(winning);

        let quiet = AnalysisResult {
            top_moves: vec![top("e4", 30, 1), top("d4", 25, 2)],
            ..AnalysisResult::default()
        };
        let (critical, winning) = Investigator::critical_winning(&quiet);
        assert!(!critical);
        assert!(!winning);
    }

    #[test]
    fn test_critical_boundary_exact_gap_is_not_critical() {
        // The bar is "more than 50cp", so exactly 50 does not qualify.
        let node = AnalysisResult {
            top_moves: vec![top("e4", 80, 1), top("d4", 30, 2)],
            ..AnalysisResult::default()
        };
        let (critical, _) = Investigator::critical_winning(&node);
        assert!(!critical);
    }

    #[test]
    fn test_align_pv_rewrites_mismatch() {
        let pv = vec!["d4".to_string(), "d5".to_string()];
        let aligned = Investigator::align_pv(Some("Nf3"), pv, 32);
        assert_eq!(aligned, vec!["Nf3", "d4", "d5"]);
    }

    #[test]
    fn test_align_pv_keeps_aligned_pv() {
        let pv = vec!["Nf3".to_string(), "d5".to_string()];
        let aligned = Investigator::align_pv(Some("Nf3"), pv.clone(), 32);
        assert_eq!(aligned, pv);
    }

    #[test]
    fn test_align_pv_truncates() {
        let pv = vec!["a3".to_string(), "a6".to_string(), "b3".to_string()];
        let aligned = Investigator::align_pv(Some("a3"), pv, 2);
        assert_eq!(aligned.len(), 2);
    }

    #[test]
    fn test_mistake_bands() {
        assert_eq!(classify_mistake(20), MistakeSeverity::None);
        assert_eq!(classify_mistake(-80), MistakeSeverity::Inaccuracy);
        assert_eq!(classify_mistake(200), MistakeSeverity::Mistake);
        assert_eq!(classify_mistake(-450), MistakeSeverity::Blunder);
    }

    #[test]
    fn test_urgency_bands() {
        assert_eq!(classify_urgency(40), Urgency::Normal);
        assert_eq!(classify_urgency(-200), Urgency::High);
        assert_eq!(classify_urgency(500), Urgency::Critical);
    }

    #[test]
    fn test_minimal_result_has_phase_only() {
        let minimal = InvestigationResult::minimal("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
        assert!(minimal.game_phase.is_some());
        assert!(minimal.tree.is_none());
        assert!(minimal.evidence.is_none());

        let broken = InvestigationResult::minimal("garbage");
        assert!(broken.game_phase.is_none());
    }

    #[test]
    fn test_investigation_result_round_trips_through_json() {
        let mut result = InvestigationResult::minimal("8/4k3/8/8/8/8/4K3/8 w - - 0 1");
        result.overestimated_moves = vec!["Qxb7".to_string()];
        result.is_critical = true;
        let json = serde_json::to_string(&result).unwrap();
        let back: InvestigationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.overestimated_moves, result.overestimated_moves);
        assert!(back.is_critical);
        assert_eq!(back.game_phase, result.game_phase);
    }
}
