// src/goal/search.rs

//! Beam-pruned search over futures: does a policy-bounded line exist that
//! makes the compiled goal true? Witnesses are full SAN paths, ranked by
//! how quickly and convincingly they get there.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shakmaty::Position;
use tracing::{debug, info};

use crate::board::{parse_fen, parse_san_lenient, position_fen, san_of, Side};
use crate::constants::TARGET_NODE_LIMIT;
use crate::goal::{compile_goal, eval_goal, goal_progress, Goal, GoalContext, PathPly};
use crate::investigate::Investigator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpponentModel {
    Best,
    #[serde(rename = "topN")]
    TopN,
    Stochastic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetPolicy {
    pub max_depth: u32,
    pub beam_width: usize,
    pub branching_limit: usize,
    pub engine_depth_propose: u32,
    pub engine_depth_reply: u32,
    pub opponent_model: OpponentModel,
    pub top_k_witnesses: usize,
}

impl Default for TargetPolicy {
    fn default() -> Self {
        TargetPolicy {
            max_depth: 8,
            beam_width: 4,
            branching_limit: 8,
            engine_depth_propose: 2,
            engine_depth_reply: 8,
            opponent_model: OpponentModel::Best,
            top_k_witnesses: 1,
        }
    }
}

impl TargetPolicy {
    /// Clamp every bound into its contract range. Out-of-range inputs are
    /// not errors; each clamp is recorded as an assumption.
    pub fn clamp(mut self) -> (Self, Vec<String>) {
        let mut assumptions = Vec::new();
        let mut note = |name: &str, before: String, after: String| {
            if before != after {
                assumptions.push(format!("policy_clamp:{name}={before}->{after}"));
            }
        };

        let depth = self.max_depth.min(24);
        note("max_depth", self.max_depth.to_string(), depth.to_string());
        self.max_depth = depth;

        let beam = self.beam_width.clamp(1, 32);
        note("beam_width", self.beam_width.to_string(), beam.to_string());
        self.beam_width = beam;

        let branching = self.branching_limit.clamp(1, 24);
        note("branching_limit", self.branching_limit.to_string(), branching.to_string());
        self.branching_limit = branching;

        let propose = self.engine_depth_propose.clamp(1, 6);
        note(
            "engine_depth_propose",
            self.engine_depth_propose.to_string(),
            propose.to_string(),
        );
        self.engine_depth_propose = propose;

        let reply = self.engine_depth_reply.clamp(1, 16);
        note(
            "engine_depth_reply",
            self.engine_depth_reply.to_string(),
            reply.to_string(),
        );
        self.engine_depth_reply = reply;

        let top_k = self.top_k_witnesses.clamp(1, 10);
        note("top_k_witnesses", self.top_k_witnesses.to_string(), top_k.to_string());
        self.top_k_witnesses = top_k;

        if self.opponent_model != OpponentModel::Best {
            assumptions.push("opponent_model other than 'best' is untuned in v1".to_string());
        }

        (self, assumptions)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Witness {
    pub line_san: Vec<String>,
    pub plies: usize,
    pub depth: u32,
    pub score_cp: Option<i32>,
    /// Score from the root side's perspective.
    pub score_root: Option<i32>,
    pub progress: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Success,
    Failure,
    Uncertain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalSearchResult {
    pub status: GoalStatus,
    pub witness_line_san: Vec<String>,
    pub witnesses: Vec<Witness>,
    pub best_progress_reached: f64,
    pub nodes_explored: usize,
    pub depth_reached: u32,
    pub policy: TargetPolicy,
    pub assumptions: Vec<String>,
    pub pgn: String,
}

struct FrontierEntry {
    fen: String,
    path: Vec<PathPly>,
    last_eval_cp: Option<i32>,
}

struct WitnessBook {
    witnesses: Vec<Witness>,
    seen: std::collections::HashSet<Vec<String>>,
}

impl WitnessBook {
    fn new() -> Self {
        WitnessBook {
            witnesses: Vec::new(),
            seen: std::collections::HashSet::new(),
        }
    }

    fn record(
        &mut self,
        goal: &Goal,
        root: &shakmaty::Chess,
        ctx: &GoalContext,
        root_turn: Side,
        path: &[PathPly],
        depth: u32,
        score_cp: Option<i32>,
    ) {
        let line_san: Vec<String> = path.iter().map(|(_, san)| san.clone()).collect();
        if line_san.is_empty() || !self.seen.insert(line_san.clone()) {
            return;
        }
        let score_root = score_cp.map(|cp| match root_turn {
            Side::White => cp,
            Side::Black => -cp,
        });
        let progress = goal_progress(goal, root, path, ctx);
        self.witnesses.push(Witness {
            plies: line_san.len(),
            line_san,
            depth,
            score_cp,
            score_root,
            progress,
        });
    }
}

fn rank_witnesses(mut witnesses: Vec<Witness>, top_k: usize) -> Vec<Witness> {
    witnesses.sort_by(|a, b| {
        a.depth
            .cmp(&b.depth)
            .then(a.plies.cmp(&b.plies))
            .then(
                b.progress
                    .partial_cmp(&a.progress)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(b.score_root.unwrap_or(i32::MIN).cmp(&a.score_root.unwrap_or(i32::MIN)))
            .then(a.line_san.join(" ").cmp(&b.line_san.join(" ")))
    });
    witnesses.truncate(top_k);
    witnesses
}

fn best_progress(witnesses: &[Witness]) -> f64 {
    witnesses.iter().map(|w| w.progress).fold(0.0, f64::max)
}

/// Candidate first moves for the side to move, best first in that side's
/// preference order. Falls back to raw legal moves when the engine call
/// comes back empty.
async fn propose_candidates(
    inv: &Investigator,
    fen: &str,
    depth: u32,
    multipv: usize,
) -> Vec<(String, Option<i32>)> {
    let analysis = inv.engine().analyze(fen, depth, multipv as u32).await;
    let mut candidates: Vec<(String, Option<i32>)> = analysis
        .top_moves
        .iter()
        .map(|m| (m.move_san.clone(), m.eval_cp))
        .collect();
    if candidates.is_empty() {
        if let Some(pos) = parse_fen(fen) {
            for m in pos.legal_moves().into_iter().take(multipv.min(6)) {
                candidates.push((san_of(&pos, m), None));
            }
        }
    }
    candidates
}

/// The opponent's best reply. Only the `best` model plays a reply ply;
/// `topN` and `stochastic` are accepted but untuned, and the frontier
/// advances straight from the candidate move under them.
async fn opponent_best_reply(inv: &Investigator, fen: &str, policy: &TargetPolicy) -> Option<String> {
    let analysis = inv
        .engine()
        .analyze(fen, policy.engine_depth_reply, 1)
        .await;
    analysis.top_moves.first().map(|m| m.move_san.clone())
}

pub async fn run_target_search(
    inv: &Investigator,
    fen: &str,
    goal_value: &Value,
    policy: TargetPolicy,
) -> GoalSearchResult {
    let (policy, mut assumptions) = policy.clamp();
    let goal = compile_goal(goal_value);

    let Some(root) = parse_fen(fen) else {
        return GoalSearchResult {
            status: GoalStatus::Failure,
            witness_line_san: Vec::new(),
            witnesses: Vec::new(),
            best_progress_reached: 0.0,
            nodes_explored: 0,
            depth_reached: 0,
            policy,
            assumptions: vec!["malformed_fen".to_string()],
            pgn: String::new(),
        };
    };
    let ctx = GoalContext::from_root(&root);
    let root_turn = ctx.root_turn;

    // Goal already true: empty witness at depth zero.
    if eval_goal(&goal, &root, &[], &ctx) {
        info!(fen, "goal satisfied at root");
        return GoalSearchResult {
            status: GoalStatus::Success,
            witness_line_san: Vec::new(),
            witnesses: Vec::new(),
            best_progress_reached: 1.0,
            nodes_explored: 0,
            depth_reached: 0,
            policy,
            assumptions,
            pgn: String::new(),
        };
    }

    let mut frontier = vec![FrontierEntry {
        fen: fen.to_string(),
        path: Vec::new(),
        last_eval_cp: None,
    }];
    let mut visited: std::collections::HashSet<String> = std::collections::HashSet::new();
    visited.insert(fen.to_string());
    let mut nodes_explored = 0usize;
    let mut book = WitnessBook::new();
    let mut depth_reached = 0;
    let mut node_limit_hit = false;

    'depths: for depth in 1..=policy.max_depth {
        depth_reached = depth;
        let mut next_frontier: Vec<FrontierEntry> = Vec::new();

        for entry in &frontier {
            if nodes_explored > TARGET_NODE_LIMIT {
                if !node_limit_hit {
                    assumptions.push("node_limit_reached".to_string());
                    node_limit_hit = true;
                }
                break 'depths;
            }
            let Some(cur_board) = parse_fen(&entry.fen) else {
                continue;
            };
            let side_to_move = Side::from(cur_board.turn());

            let candidates = propose_candidates(
                inv,
                &entry.fen,
                policy.engine_depth_propose,
                policy.branching_limit,
            )
            .await;

            for (san, eval_cp) in candidates.into_iter().take(policy.beam_width) {
                let Some(m) = parse_san_lenient(&cur_board, &san) else {
                    continue;
                };
                let mut child_board = cur_board.clone();
                let canonical = san_of(&cur_board, m);
                child_board.play_unchecked(m);
                nodes_explored += 1;

                let mut child_path = entry.path.clone();
                child_path.push((side_to_move, canonical));

                if eval_goal(&goal, &child_board, &child_path, &ctx) {
                    book.record(&goal, &root, &ctx, root_turn, &child_path, depth, eval_cp);
                    if policy.top_k_witnesses == 1 {
                        let witnesses = rank_witnesses(book.witnesses, 1);
                        let best_line = witnesses[0].line_san.clone();
                        return finish_success(
                            fen, witnesses, best_line, nodes_explored, depth, policy, assumptions,
                        );
                    }
                    continue;
                }

                // Opponent model: under `best`, apply the best reply
                // before testing again. Other models insert no reply ply.
                let reply_san = if policy.opponent_model == OpponentModel::Best {
                    opponent_best_reply(inv, &position_fen(&child_board), &policy).await
                } else {
                    None
                };
                if let Some(reply) = reply_san {
                    if let Some(reply_move) = parse_san_lenient(&child_board, &reply) {
                        let opp_side = Side::from(child_board.turn());
                        let canonical_reply = san_of(&child_board, reply_move);
                        child_board.play_unchecked(reply_move);
                        child_path.push((opp_side, canonical_reply));

                        if eval_goal(&goal, &child_board, &child_path, &ctx) {
                            book.record(
                                &goal, &root, &ctx, root_turn, &child_path, depth, eval_cp,
                            );
                            if policy.top_k_witnesses == 1 {
                                let witnesses = rank_witnesses(book.witnesses, 1);
                                let best_line = witnesses[0].line_san.clone();
                                return finish_success(
                                    fen,
                                    witnesses,
                                    best_line,
                                    nodes_explored,
                                    depth,
                                    policy,
                                    assumptions,
                                );
                            }
                            continue;
                        }
                    }
                }

                // Transpositions are only tracked at frontier boundaries.
                let child_fen = position_fen(&child_board);
                if !visited.insert(child_fen.clone()) {
                    continue;
                }
                next_frontier.push(FrontierEntry {
                    fen: child_fen,
                    path: child_path,
                    last_eval_cp: eval_cp,
                });
            }
        }

        if next_frontier.is_empty() {
            break;
        }
        if book.witnesses.len() >= policy.top_k_witnesses {
            break;
        }

        // Global pruning: keep the most promising entries from the root
        // side's point of view.
        next_frontier.sort_by_key(|entry| {
            let eval = entry.last_eval_cp.unwrap_or(i32::MIN / 2);
            let preference = match root_turn {
                Side::White => eval,
                Side::Black => -eval,
            };
            std::cmp::Reverse(preference)
        });
        next_frontier.truncate(policy.beam_width);
        frontier = next_frontier;
        debug!(depth, frontier = frontier.len(), nodes_explored, "target search depth done");
    }

    if !book.witnesses.is_empty() {
        let witnesses = rank_witnesses(book.witnesses, policy.top_k_witnesses);
        let best_line = witnesses[0].line_san.clone();
        return finish_success(
            fen,
            witnesses,
            best_line,
            nodes_explored,
            depth_reached,
            policy,
            assumptions,
        );
    }

    let status = if policy.max_depth == 0 {
        GoalStatus::Failure
    } else {
        GoalStatus::Uncertain
    };
    GoalSearchResult {
        status,
        witness_line_san: Vec::new(),
        witnesses: Vec::new(),
        best_progress_reached: 0.0,
        nodes_explored,
        depth_reached,
        policy,
        assumptions,
        pgn: String::new(),
    }
}

#[allow(clippy::too_many_arguments)]
fn finish_success(
    fen: &str,
    witnesses: Vec<Witness>,
    best_line: Vec<String>,
    nodes_explored: usize,
    depth: u32,
    policy: TargetPolicy,
    assumptions: Vec<String>,
) -> GoalSearchResult {
    let pgn = crate::pgn::build_witness_pgn(fen, &best_line);
    GoalSearchResult {
        status: GoalStatus::Success,
        best_progress_reached: best_progress(&witnesses),
        witness_line_san: best_line,
        witnesses,
        nodes_explored,
        depth_reached: depth,
        policy,
        assumptions,
        pgn,
    }
}
