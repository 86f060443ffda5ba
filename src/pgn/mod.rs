// src/pgn/mod.rs

//! PGN assembly for exploration trees and goal witnesses.
//!
//! The assembler is best-effort by contract: any move that is not legal on
//! the board it is about to be written from truncates that line and never
//! aborts the whole PGN. PGN-derived metrics are therefore not a source of
//! truth; the precomputed deltas on the InvestigationResult are canonical.

use std::collections::HashMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;

use pgn_reader::{Reader, SanPlus, Visitor};
use shakmaty::{Chess, Position};
use tracing::debug;

use crate::analysis::{scan_position, PositionScan};
use crate::board::{parse_fen, parse_san_lenient, position_fen, san_of};
use crate::investigate::tree::ExplorationNode;
use crate::investigate::{InvestigationResult, Investigator};

const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
const VARIATION_MAX_PLIES: usize = 6;

fn headers(event: &str, fen: &str) -> String {
    let mut out = format!("[Event \"{event}\"]\n");
    if fen != START_FEN {
        out.push_str(&format!("[FEN \"{fen}\"]\n[SetUp \"1\"]\n"));
    }
    out.push('\n');
    out
}

fn move_number_token(board: &Chess) -> String {
    let number = u32::from(board.fullmoves());
    if board.turn() == shakmaty::Color::White {
        format!("{number}. ")
    } else {
        format!("{number}... ")
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// The game-level comment consumers parse for the starting state.
fn starting_comment(scan: &PositionScan) -> String {
    let tags: Vec<String> = scan.tags.iter().take(20).map(|t| t.name.clone()).collect();
    let roles: Vec<String> = scan.roles.iter().take(40).map(|r| r.key()).collect();
    let mut blocks = String::new();
    if !tags.is_empty() {
        blocks.push_str(&format!("[Starting tags: {}]", tags.join(", ")));
    }
    if !roles.is_empty() {
        blocks.push_str(&format!("[Starting roles: {}]", roles.join(", ")));
    }
    if blocks.is_empty() {
        String::new()
    } else {
        format!("{{{blocks}}}\n")
    }
}

/// Inline annotation for one played move: eval in pawns, themes, and the
/// tag/role delta block.
fn move_comment(
    eval_cp: Option<i32>,
    before: &PositionScan,
    after: &PositionScan,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(cp) = eval_cp {
        parts.push(format!("[%eval {:+.2}]", f64::from(cp) / 100.0));
    }
    if !after.top_themes.is_empty() {
        parts.push(format!("[%theme \"{}\"]", after.top_themes.join("; ")));
    }

    let before_names: std::collections::HashSet<&str> =
        before.tags.iter().map(|t| t.name.as_str()).collect();
    let after_names: std::collections::HashSet<&str> =
        after.tags.iter().map(|t| t.name.as_str()).collect();
    let mut gained: Vec<String> = after_names
        .difference(&before_names)
        .map(|n| n.to_string())
        .collect();
    let mut lost: Vec<String> = before_names
        .difference(&after_names)
        .map(|n| n.to_string())
        .collect();
    gained.sort();
    lost.sort();

    let before_roles: std::collections::HashSet<String> =
        before.roles.iter().map(|r| r.key()).collect();
    let after_roles: std::collections::HashSet<String> =
        after.roles.iter().map(|r| r.key()).collect();
    let mut roles_gained: Vec<String> = after_roles.difference(&before_roles).cloned().collect();
    let mut roles_lost: Vec<String> = before_roles.difference(&after_roles).cloned().collect();
    roles_gained.sort();
    roles_lost.sort();

    let threats: Vec<String> = gained
        .iter()
        .filter(|n| n.starts_with("tag.threat."))
        .cloned()
        .collect();

    parts.push(format!(
        "[gained: {}], [lost: {}], [roles_gained: {}], [roles_lost: {}], [threats: {}]",
        list_or_none(&gained),
        list_or_none(&lost),
        list_or_none(&roles_gained),
        list_or_none(&roles_lost),
        list_or_none(&threats),
    ));

    parts.join(" ")
}

/// Write a SAN line from `board`, attaching the given variations after the
/// move at their index. Returns the emitted movetext.
fn write_line<'a>(
    inv: &'a Investigator,
    board: Chess,
    moves: Vec<String>,
    attach: HashMap<usize, Vec<ExplorationNode>>,
    first_move_eval_cp: Option<i32>,
) -> Pin<Box<dyn Future<Output = String> + Send + 'a>> {
    Box::pin(async move {
        let mut out = String::new();
        let mut board = board;
        let mut before_scan = scan_position(&board);

        for (idx, san) in moves.iter().enumerate() {
            // Board-state validation before insertion: stop this line on
            // the first illegal move.
            let Some(m) = parse_san_lenient(&board, san) else {
                debug!(san = %san, "illegal move while assembling PGN, truncating line");
                break;
            };
            let board_before = board.clone();
            let token = format!("{}{}", move_number_token(&board), san_of(&board, m));
            board.play_unchecked(m);
            let after_scan = scan_position(&board);

            let eval_cp = if idx == 0 && first_move_eval_cp.is_some() {
                first_move_eval_cp
            } else {
                inv.analyze_cached(&position_fen(&board), inv.config().depth_shallow)
                    .await
                    .eval_cp
            };

            out.push_str(&token);
            out.push_str(&format!(" {{{}}} ", move_comment(eval_cp, &before_scan, &after_scan)));

            if let Some(variations) = attach.get(&idx) {
                for node in variations {
                    let rendered = write_branch(inv, board_before.clone(), node.clone()).await;
                    if !rendered.is_empty() {
                        out.push_str(&format!("({rendered}) "));
                    }
                }
            }

            before_scan = after_scan;
        }

        out.trim_end().to_string()
    })
}

/// Render one exploration branch as a variation: the refuted move, its PV
/// continuation, and nested sub-branches.
async fn write_branch(inv: &Investigator, board: Chess, node: ExplorationNode) -> String {
    let Some(move_played) = node.move_played_san.clone() else {
        return String::new();
    };
    let mut line = vec![move_played];
    line.extend(node.pv_full.iter().take(VARIATION_MAX_PLIES - 1).cloned());

    let mut attach = HashMap::new();
    if !node.branches.is_empty() {
        // Sub-branches alternate to the first PV reply inside this line.
        attach.insert(1usize, node.branches.clone());
    }
    write_line(inv, board, line, attach, node.eval_deep_cp).await
}

/// Assemble the exploration PGN: headers, starting tags/roles comment,
/// main line from the root PV, branch variations, per-move annotations.
pub async fn build_exploration_pgn(inv: &Investigator, result: &InvestigationResult) -> String {
    let start_fen = result.original_fen.clone().unwrap_or_else(|| result.fen.clone());
    let Some(start_pos) = parse_fen(&start_fen) else {
        return String::new();
    };
    let Some(tree) = &result.tree else {
        return String::new();
    };

    let mut main_moves: Vec<String> = Vec::new();
    let mut branch_index = 0usize;
    if let Some(player_move) = &result.player_move_san {
        main_moves.push(player_move.clone());
        branch_index = 1;
    }
    main_moves.extend(tree.pv_full.iter().cloned());
    if main_moves.is_empty() {
        return String::new();
    }

    // Overestimated branches alternate to the PV move at the investigated
    // position; mid-PV sub-explorations attach at their own ply.
    let mut attach: HashMap<usize, Vec<ExplorationNode>> = HashMap::new();
    if !tree.branches.is_empty() {
        attach.insert(branch_index, tree.branches.clone());
    }
    for pv_branch in &result.pv_branches {
        attach
            .entry(pv_branch.pv_move_index + branch_index)
            .or_default()
            .push(pv_branch.node.clone());
    }

    let scan = scan_position(&start_pos);
    let mut pgn = headers("Investigation", &start_fen);
    pgn.push_str(&starting_comment(&scan));

    let body = write_line(
        inv,
        start_pos,
        main_moves,
        attach,
        result.eval_before_cp.or(result.eval_deep_cp),
    )
    .await;
    pgn.push_str(&body);
    pgn.push_str(" *");

    truncate_pgn(pgn, inv.config().pgn_max_chars)
}

/// Witness lines get a plain PGN without annotations.
pub fn build_witness_pgn(fen: &str, moves_san: &[String]) -> String {
    let Some(mut board) = parse_fen(fen) else {
        return String::new();
    };
    if moves_san.is_empty() {
        return String::new();
    }
    let mut pgn = headers("Investigation (Target)", fen);
    for (idx, san) in moves_san.iter().enumerate() {
        let Some(m) = parse_san_lenient(&board, san) else {
            break;
        };
        // Black move numbers only appear when Black opens the line.
        if board.turn() == shakmaty::Color::White || idx == 0 {
            pgn.push_str(&move_number_token(&board));
        }
        pgn.push_str(&san_of(&board, m));
        pgn.push(' ');
        board.play_unchecked(m);
    }
    pgn.push('*');
    pgn
}

/// Soft size cap: cut at a token boundary and close the game.
fn truncate_pgn(pgn: String, max_chars: usize) -> String {
    if max_chars == 0 || pgn.len() <= max_chars {
        return pgn;
    }
    let cut = pgn[..max_chars].rfind(' ').unwrap_or(max_chars);
    format!("{} *", &pgn[..cut])
}

struct MainLineVisitor {
    moves: Vec<String>,
}

impl Visitor for MainLineVisitor {
    type Tags = ();
    type Movetext = ();
    type Output = Vec<String>;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, _tags: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue(())
    }

    fn san(&mut self, _movetext: &mut Self::Movetext, san_plus: SanPlus) -> ControlFlow<Self::Output> {
        self.moves.push(san_plus.to_string());
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, _movetext: Self::Movetext) -> Self::Output {
        std::mem::take(&mut self.moves)
    }
}

/// Main-line SAN moves of the first game in `pgn`. Variations are skipped;
/// used by round-trip checks and evidence validation.
pub fn main_line(pgn: &str) -> Vec<String> {
    let mut visitor = MainLineVisitor { moves: Vec::new() };
    let mut reader = Reader::new(pgn.as_bytes());
    match reader.read_game(&mut visitor) {
        Ok(Some(moves)) => moves,
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_include_fen_for_nonstandard_start() {
        let fen = "4k3/8/8/8/8/8/8/4K2R w K - 0 1";
        let pgn = build_witness_pgn(fen, &["O-O".to_string()]);
        assert!(pgn.contains("[FEN \"4k3/8/8/8/8/8/8/4K2R w K - 0 1\"]"));
        assert!(pgn.contains("[SetUp \"1\"]"));
        assert!(pgn.contains("1. O-O"));
    }

    #[test]
    fn test_witness_pgn_standard_start_has_no_fen_header() {
        let pgn = build_witness_pgn(START_FEN, &["e4".to_string(), "e5".to_string()]);
        assert!(!pgn.contains("[FEN"));
        assert!(pgn.contains("1. e4 e5"));
    }

    #[test]
    fn test_witness_pgn_truncates_on_illegal_move() {
        let pgn = build_witness_pgn(START_FEN, &["e4".to_string(), "Qh5".to_string()]);
        assert!(pgn.contains("1. e4"));
        assert!(!pgn.contains("Qh5"));
    }

    #[test]
    fn test_main_line_round_trip() {
        let pgn = build_witness_pgn(START_FEN, &["e4".to_string(), "e5".to_string(), "Nf3".to_string()]);
        assert_eq!(main_line(&pgn), vec!["e4", "e5", "Nf3"]);
    }

    #[test]
    fn test_main_line_skips_variations() {
        let pgn = "1. e4 (1. d4 d5) 1... e5 *";
        assert_eq!(main_line(pgn), vec!["e4", "e5"]);
    }

    #[test]
    fn test_truncate_pgn_cuts_at_token_boundary() {
        let pgn = "1. e4 {a comment} 1... e5 *".to_string();
        let cut = truncate_pgn(pgn, 12);
        assert!(cut.len() <= 14);
        assert!(cut.ends_with('*'));
    }

    #[test]
    fn test_move_comment_contains_delta_block() {
        let before = scan_position(&parse_fen("4k3/8/8/8/8/8/8/R3K3 w - - 0 1").unwrap());
        let after = scan_position(&parse_fen("4k3/R7/8/8/8/8/8/4K3 b - - 0 1").unwrap());
        let comment = move_comment(Some(150), &before, &after);
        assert!(comment.contains("[%eval +1.50]"));
        assert!(comment.contains("[gained:"));
        assert!(comment.contains("tag.rook.seventh"));
        assert!(comment.contains("[threats:"));
    }
}
