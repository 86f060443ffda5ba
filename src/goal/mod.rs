// src/goal/mod.rs

//! Logical goals over board futures. A goal is a boolean combination of
//! predicates compiled from JSON; evaluation is a flat match on a tagged
//! enum, short-circuiting through the composites. Unknown or malformed
//! predicates evaluate to `false`, never an error.

pub mod search;

use regex::Regex;
use serde_json::Value;
use shakmaty::{Chess, Color, Move, Position, Role, Square};

use crate::board::{material_balance_cp, position_fen, Side};

/// One ply of the path walked so far: who moved, and the SAN they played.
pub type PathPly = (Side, String);

#[derive(Debug, Clone)]
pub enum Goal {
    And(Vec<Goal>),
    Or(Vec<Goal>),
    Not(Box<Goal>),
    Predicate(Predicate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastleMode {
    AlreadyCastled,
    CanCastleNext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveBy {
    SideToMove,
    White,
    Black,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquareShade {
    Light,
    Dark,
}

#[derive(Debug, Clone)]
pub enum Predicate {
    Castle {
        side: Side,
        mode: CastleMode,
    },
    PlayMove {
        move_san: String,
        by: MoveBy,
    },
    PieceOnSquare {
        piece: Role,
        side: Side,
        square: Square,
    },
    PieceOnColor {
        piece: Role,
        side: Side,
        shade: SquareShade,
    },
    MaterialDeltaAtLeast {
        side: Side,
        pawns: f64,
    },
    FenContains {
        pattern: String,
    },
    FenRegex {
        regex: Option<Regex>,
    },
    /// Unrecognized predicate type; always false.
    Unknown,
}

/// Root-position facts every predicate evaluation may need.
#[derive(Debug, Clone, Copy)]
pub struct GoalContext {
    pub root_turn: Side,
    pub root_material_cp: i32,
}

impl GoalContext {
    pub fn from_root(pos: &Chess) -> Self {
        GoalContext {
            root_turn: Side::from(pos.turn()),
            root_material_cp: material_balance_cp(pos),
        }
    }
}

/// Compile a JSON goal AST. Anything unrecognized compiles to a node that
/// evaluates to `false`.
pub fn compile_goal(value: &Value) -> Goal {
    let Some(node) = value.as_object() else {
        return Goal::Predicate(Predicate::Unknown);
    };
    match node.get("op").and_then(Value::as_str) {
        Some("and") | Some("or") => {
            let args: Vec<Goal> = node
                .get("args")
                .and_then(Value::as_array)
                .map(|args| args.iter().map(compile_goal).collect())
                .unwrap_or_default();
            if node.get("op").and_then(Value::as_str) == Some("and") {
                Goal::And(args)
            } else {
                Goal::Or(args)
            }
        }
        Some("not") => {
            let inner = node
                .get("args")
                .and_then(Value::as_array)
                .and_then(|args| args.first())
                .map(compile_goal)
                .unwrap_or(Goal::Predicate(Predicate::Unknown));
            Goal::Not(Box::new(inner))
        }
        _ => {
            // Either an explicit predicate node or shorthand where the node
            // itself carries the "type" field.
            let pred_value = node
                .get("predicate")
                .and_then(Value::as_object)
                .map(|obj| Value::Object(obj.clone()))
                .unwrap_or_else(|| {
                    if node.contains_key("type") {
                        value.clone()
                    } else {
                        Value::Null
                    }
                });
            Goal::Predicate(compile_predicate(&pred_value))
        }
    }
}

fn parse_side(params: &Value, key: &str) -> Side {
    match params.get(key).and_then(Value::as_str) {
        Some("black") => Side::Black,
        _ => Side::White,
    }
}

fn parse_piece_letter(params: &Value) -> Option<Role> {
    let letter = params.get("piece").and_then(Value::as_str)?;
    match letter.to_ascii_uppercase().as_str() {
        "P" => Some(Role::Pawn),
        "N" => Some(Role::Knight),
        "B" => Some(Role::Bishop),
        "R" => Some(Role::Rook),
        "Q" => Some(Role::Queen),
        "K" => Some(Role::King),
        _ => None,
    }
}

fn compile_predicate(value: &Value) -> Predicate {
    let Some(node) = value.as_object() else {
        return Predicate::Unknown;
    };
    let p_type = node.get("type").and_then(Value::as_str).unwrap_or("");
    let empty = Value::Object(serde_json::Map::new());
    let params = node.get("params").unwrap_or(&empty);

    match p_type {
        "castle" => Predicate::Castle {
            side: parse_side(params, "side"),
            mode: match params.get("mode").and_then(Value::as_str) {
                Some("can_castle_next") => CastleMode::CanCastleNext,
                _ => CastleMode::AlreadyCastled,
            },
        },
        "play_move" => {
            let Some(move_san) = params.get("move_san").and_then(Value::as_str) else {
                return Predicate::Unknown;
            };
            Predicate::PlayMove {
                move_san: move_san.to_string(),
                by: match params.get("by").and_then(Value::as_str) {
                    Some("white") => MoveBy::White,
                    Some("black") => MoveBy::Black,
                    _ => MoveBy::SideToMove,
                },
            }
        }
        "piece_on_square" => {
            let Some(piece) = parse_piece_letter(params) else {
                return Predicate::Unknown;
            };
            let Some(square) = params
                .get("square")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<Square>().ok())
            else {
                return Predicate::Unknown;
            };
            Predicate::PieceOnSquare {
                piece,
                side: parse_side(params, "side"),
                square,
            }
        }
        "piece_on_color" => {
            let Some(piece) = parse_piece_letter(params) else {
                return Predicate::Unknown;
            };
            Predicate::PieceOnColor {
                piece,
                side: parse_side(params, "side"),
                shade: match params.get("color").and_then(Value::as_str) {
                    Some("dark") => SquareShade::Dark,
                    _ => SquareShade::Light,
                },
            }
        }
        "material_delta_at_least" => Predicate::MaterialDeltaAtLeast {
            side: parse_side(params, "side"),
            pawns: params.get("pawns").and_then(Value::as_f64).unwrap_or(0.0),
        },
        "fen_contains" => {
            let pattern = params
                .get("pattern")
                .or_else(|| params.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("");
            Predicate::FenContains {
                pattern: pattern.to_string(),
            }
        }
        "fen_regex" => {
            let pattern = params.get("pattern").and_then(Value::as_str).unwrap_or("");
            Predicate::FenRegex {
                regex: Regex::new(pattern).ok().filter(|_| !pattern.is_empty()),
            }
        }
        _ => Predicate::Unknown,
    }
}

/// Evaluate a compiled goal. Composites short-circuit.
pub fn eval_goal(goal: &Goal, board: &Chess, path: &[PathPly], ctx: &GoalContext) -> bool {
    match goal {
        Goal::And(args) => args.iter().all(|g| eval_goal(g, board, path, ctx)),
        Goal::Or(args) => args.iter().any(|g| eval_goal(g, board, path, ctx)),
        Goal::Not(inner) => !eval_goal(inner, board, path, ctx),
        Goal::Predicate(pred) => eval_predicate(pred, board, path, ctx),
    }
}

fn is_light_square(square: Square) -> bool {
    // a1 is dark.
    (square.file() as u32 + square.rank() as u32) % 2 == 1
}

fn castled_king_square(board: &Chess, side: Side) -> bool {
    let Some(king) = board.board().king_of(Color::from(side)) else {
        return false;
    };
    match side {
        Side::White => king == Square::G1 || king == Square::C1,
        Side::Black => king == Square::G8 || king == Square::C8,
    }
}

fn castling_legal_now(board: &Chess, side: Side) -> bool {
    if Side::from(board.turn()) != side {
        return false;
    }
    board
        .legal_moves()
        .into_iter()
        .any(|m| matches!(m, Move::Castle { .. }))
}

fn eval_predicate(pred: &Predicate, board: &Chess, path: &[PathPly], ctx: &GoalContext) -> bool {
    match pred {
        Predicate::Castle { side, mode } => match mode {
            CastleMode::AlreadyCastled => castled_king_square(board, *side),
            // Only meaningful when it is that side to move.
            CastleMode::CanCastleNext => castling_legal_now(board, *side),
        },
        Predicate::PlayMove { move_san, by } => {
            let by_side = match by {
                MoveBy::SideToMove => ctx.root_turn,
                MoveBy::White => Side::White,
                MoveBy::Black => Side::Black,
            };
            let wanted = crate::board::clean_san(move_san);
            path.iter().any(|(side, san)| {
                *side == by_side && crate::board::clean_san(san) == wanted
            })
        }
        Predicate::PieceOnSquare { piece, side, square } => {
            match board.board().piece_at(*square) {
                Some(found) => found.role == *piece && Side::from(found.color) == *side,
                None => false,
            }
        }
        Predicate::PieceOnColor { piece, side, shade } => {
            let want_light = *shade == SquareShade::Light;
            let targets = board.board().by_piece(shakmaty::Piece {
                role: *piece,
                color: Color::from(*side),
            });
            targets.into_iter().any(|sq| is_light_square(sq) == want_light)
        }
        Predicate::MaterialDeltaAtLeast { side, pawns } => {
            let delta_white_cp = material_balance_cp(board) - ctx.root_material_cp;
            let delta_cp = match side {
                Side::White => delta_white_cp,
                Side::Black => -delta_white_cp,
            };
            f64::from(delta_cp) >= pawns * 100.0
        }
        Predicate::FenContains { pattern } => {
            !pattern.is_empty() && position_fen(board).contains(pattern)
        }
        Predicate::FenRegex { regex } => match regex {
            Some(re) => re.is_match(&position_fen(board)),
            None => false,
        },
        Predicate::Unknown => false,
    }
}

/// Best-effort partial progress in [0,1]: 1 iff satisfied, otherwise a
/// predicate-specific heuristic for single-predicate goals, 0 for anything
/// the heuristics cannot judge.
pub fn goal_progress(goal: &Goal, root: &Chess, path: &[PathPly], ctx: &GoalContext) -> f64 {
    let Some(board) = crate::board::apply_san_line(
        root,
        &path.iter().map(|(_, san)| san.clone()).collect::<Vec<_>>(),
    ) else {
        return 0.0;
    };
    if eval_goal(goal, &board, path, ctx) {
        return 1.0;
    }

    let Goal::Predicate(pred) = goal else {
        return 0.0;
    };
    match pred {
        Predicate::PieceOnSquare { piece, side, square } => {
            let targets = board.board().by_piece(shakmaty::Piece {
                role: *piece,
                color: Color::from(*side),
            });
            let mut best: Option<i32> = None;
            for sq in targets {
                let df = (sq.file() as i32 - square.file() as i32).abs();
                let dr = (sq.rank() as i32 - square.rank() as i32).abs();
                let chebyshev = df.max(dr);
                best = Some(best.map_or(chebyshev, |b| b.min(chebyshev)));
            }
            match best {
                Some(distance) => (1.0 - f64::from(distance) / 8.0).max(0.0),
                None => 0.0,
            }
        }
        Predicate::MaterialDeltaAtLeast { side, pawns } => {
            let delta_white_cp = material_balance_cp(&board) - ctx.root_material_cp;
            let delta_cp = match side {
                Side::White => delta_white_cp,
                Side::Black => -delta_white_cp,
            };
            if *pawns <= 0.0 {
                return if delta_cp >= 0 { 1.0 } else { 0.0 };
            }
            (f64::from(delta_cp) / (pawns * 100.0)).clamp(0.0, 1.0)
        }
        Predicate::Castle { side, .. } => {
            if castled_king_square(&board, *side) {
                1.0
            } else if castling_legal_now(&board, *side) {
                0.5
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::parse_fen;
    use serde_json::json;

    fn ctx_for(fen: &str) -> (Chess, GoalContext) {
        let pos = parse_fen(fen).unwrap();
        let ctx = GoalContext::from_root(&pos);
        (pos, ctx)
    }

    const CASTLING_FEN: &str = "r1bqk2r/pppp1ppp/2n2n2/2b1p3/2B1P3/2N2N2/PPPP1PPP/R1BQK2R w KQkq - 6 5";

    #[test]
    fn test_castle_can_castle_next() {
        let (pos, ctx) = ctx_for(CASTLING_FEN);
        let goal = compile_goal(&json!({
            "op": "predicate",
            "predicate": {"type": "castle", "params": {"side": "white", "mode": "can_castle_next"}}
        }));
        assert!(eval_goal(&goal, &pos, &[], &ctx));
        // Not black's move, so black cannot castle "next".
        let black = compile_goal(&json!({
            "type": "castle", "params": {"side": "black", "mode": "can_castle_next"}
        }));
        assert!(!eval_goal(&black, &pos, &[], &ctx));
    }

    #[test]
    fn test_castle_already_castled() {
        // Black has castled short; White's king is still on e1.
        let (pos, ctx) = ctx_for("r1bq1rk1/pppp1ppp/2n2n2/2b1p3/2B1P3/2N2N2/PPPP1PPP/R1BQK2R w KQ - 8 6");
        let white = compile_goal(&json!({"type": "castle", "params": {"side": "white"}}));
        let black = compile_goal(&json!({"type": "castle", "params": {"side": "black"}}));
        assert!(!eval_goal(&white, &pos, &[], &ctx));
        assert!(eval_goal(&black, &pos, &[], &ctx));
    }

    #[test]
    fn test_play_move_checks_path_and_side() {
        let (pos, ctx) = ctx_for(CASTLING_FEN);
        let goal = compile_goal(&json!({
            "type": "play_move", "params": {"move_san": "O-O", "by": "side_to_move"}
        }));
        assert!(!eval_goal(&goal, &pos, &[], &ctx));
        let path = vec![(Side::White, "O-O".to_string())];
        assert!(eval_goal(&goal, &pos, &path, &ctx));
        let wrong_side = vec![(Side::Black, "O-O".to_string())];
        assert!(!eval_goal(&goal, &pos, &wrong_side, &ctx));
    }

    #[test]
    fn test_piece_on_square() {
        let (pos, ctx) = ctx_for(CASTLING_FEN);
        let hit = compile_goal(&json!({
            "type": "piece_on_square", "params": {"piece": "N", "side": "white", "square": "f3"}
        }));
        let miss = compile_goal(&json!({
            "type": "piece_on_square", "params": {"piece": "N", "side": "white", "square": "h8"}
        }));
        assert!(eval_goal(&hit, &pos, &[], &ctx));
        assert!(!eval_goal(&miss, &pos, &[], &ctx));
    }

    #[test]
    fn test_piece_on_color() {
        // White light-squared bishop on c4.
        let (pos, ctx) = ctx_for(CASTLING_FEN);
        let light = compile_goal(&json!({
            "type": "piece_on_color", "params": {"piece": "B", "side": "white", "color": "light"}
        }));
        assert!(eval_goal(&light, &pos, &[], &ctx));
    }

    #[test]
    fn test_material_delta_measured_from_root() {
        let (root, ctx) = ctx_for("4k3/8/8/3q4/8/8/8/3QK3 w - - 0 1");
        // Same balance as root: no gain yet.
        let goal = compile_goal(&json!({
            "type": "material_delta_at_least", "params": {"side": "white", "pawns": 5}
        }));
        assert!(!eval_goal(&goal, &root, &[], &ctx));
        // After white wins the queen the delta is +9 pawns.
        let after = parse_fen("4k3/8/8/3Q4/8/8/8/4K3 b - - 0 1").unwrap();
        assert!(eval_goal(&goal, &after, &[], &ctx));
    }

    #[test]
    fn test_fen_contains_and_regex() {
        let (pos, ctx) = ctx_for(CASTLING_FEN);
        let contains = compile_goal(&json!({
            "type": "fen_contains", "params": {"pattern": "2B1P3"}
        }));
        assert!(eval_goal(&contains, &pos, &[], &ctx));
        let regex = compile_goal(&json!({
            "type": "fen_regex", "params": {"pattern": " w KQkq "}
        }));
        assert!(eval_goal(&regex, &pos, &[], &ctx));
        let bad_regex = compile_goal(&json!({
            "type": "fen_regex", "params": {"pattern": "("}
        }));
        assert!(!eval_goal(&bad_regex, &pos, &[], &ctx));
    }

    #[test]
    fn test_composites_short_circuit_and_unknown_is_false() {
        let (pos, ctx) = ctx_for(CASTLING_FEN);
        let unknown = compile_goal(&json!({"type": "teleport_king", "params": {}}));
        assert!(!eval_goal(&unknown, &pos, &[], &ctx));

        let not_unknown = compile_goal(&json!({"op": "not", "args": [{"type": "teleport_king"}]}));
        assert!(eval_goal(&not_unknown, &pos, &[], &ctx));

        let or_goal = compile_goal(&json!({
            "op": "or",
            "args": [
                {"type": "teleport_king"},
                {"type": "piece_on_square", "params": {"piece": "N", "side": "white", "square": "f3"}}
            ]
        }));
        assert!(eval_goal(&or_goal, &pos, &[], &ctx));

        let and_goal = compile_goal(&json!({
            "op": "and",
            "args": [
                {"type": "teleport_king"},
                {"type": "piece_on_square", "params": {"piece": "N", "side": "white", "square": "f3"}}
            ]
        }));
        assert!(!eval_goal(&and_goal, &pos, &[], &ctx));
    }

    #[test]
    fn test_progress_satisfied_is_one() {
        let (pos, ctx) = ctx_for(CASTLING_FEN);
        let goal = compile_goal(&json!({
            "type": "piece_on_square", "params": {"piece": "N", "side": "white", "square": "f3"}
        }));
        assert_eq!(goal_progress(&goal, &pos, &[], &ctx), 1.0);
    }

    #[test]
    fn test_progress_piece_on_square_uses_chebyshev() {
        let (pos, ctx) = ctx_for("4k3/8/8/8/8/8/8/N3K3 w - - 0 1");
        // Knight on a1, target h8: Chebyshev distance 7.
        let goal = compile_goal(&json!({
            "type": "piece_on_square", "params": {"piece": "N", "side": "white", "square": "h8"}
        }));
        let progress = goal_progress(&goal, &pos, &[], &ctx);
        assert!((progress - (1.0 - 7.0 / 8.0)).abs() < 1e-9);
    }

    #[test]
    fn test_progress_castle_half_when_legal() {
        let (pos, ctx) = ctx_for(CASTLING_FEN);
        let goal = compile_goal(&json!({
            "type": "castle", "params": {"side": "white", "mode": "already_castled"}
        }));
        assert_eq!(goal_progress(&goal, &pos, &[], &ctx), 0.5);
    }

    #[test]
    fn test_progress_material_partial() {
        let (pos, ctx) = ctx_for("4k3/8/8/8/8/8/8/4K3 w - - 0 1");
        let goal = compile_goal(&json!({
            "type": "material_delta_at_least", "params": {"side": "white", "pawns": 2}
        }));
        // Nothing captured yet along an empty path.
        assert_eq!(goal_progress(&goal, &pos, &[], &ctx), 0.0);
    }
}
