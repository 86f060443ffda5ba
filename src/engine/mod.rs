// src/engine/mod.rs

//! Adapter over an external UCI engine.
//!
//! The contract is one operation: `analyze(fen, depth, multipv)`. Scores are
//! always normalized to White's point of view before they leave this module.
//! Failures never cross the boundary as errors: callers receive an empty
//! `AnalysisResult` with every field unset.

pub mod pool;
pub mod uci;

use serde::{Deserialize, Serialize};
use shakmaty::{Chess, Color, Position};
use thiserror::Error;

use crate::board::{parse_fen, san_of, uci_of};
use crate::constants::MATE_SCORE_CP;

pub use pool::EngineHandle;
pub use uci::UciEngine;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn engine process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine protocol error: {0}")]
    Protocol(String),
    #[error("engine timed out")]
    Timeout,
}

/// Score as reported by the engine, from the side-to-move's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawScore {
    Cp(i32),
    Mate(i32),
}

impl RawScore {
    /// Normalize to White's perspective. Mate scores collapse to the ±10000
    /// sentinel; the ply distance is returned separately (positive = White
    /// delivers mate).
    pub fn to_white_cp(self, turn: Color) -> (i32, Option<i32>) {
        let sign = if turn == Color::White { 1 } else { -1 };
        match self {
            RawScore::Cp(cp) => (sign * cp, None),
            RawScore::Mate(moves) => {
                // `mate 0` means the side to move is already checkmated.
                let winning = (moves > 0) == (turn == Color::White);
                let cp = if winning { MATE_SCORE_CP } else { -MATE_SCORE_CP };
                (cp, Some(sign * moves))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopMove {
    pub move_san: String,
    pub move_uci: String,
    pub eval_cp: Option<i32>,
    pub rank: u32,
}

/// Result of one engine call. `pv` holds only legal moves played in
/// sequence from `fen`, and `pv[0]` is always the best move.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub fen: String,
    pub depth: u32,
    pub multipv: u32,
    pub eval_cp: Option<i32>,
    pub mate_in: Option<i32>,
    pub best_move_uci: Option<String>,
    pub best_move_san: Option<String>,
    pub pv_uci: Vec<String>,
    pub pv_san: Vec<String>,
    pub top_moves: Vec<TopMove>,
    pub second_best_san: Option<String>,
    pub second_best_eval_cp: Option<i32>,
}

impl AnalysisResult {
    pub fn empty(fen: &str, depth: u32, multipv: u32) -> Self {
        AnalysisResult {
            fen: fen.to_string(),
            depth,
            multipv,
            ..AnalysisResult::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.best_move_san.is_none()
    }
}

/// One `info` line worth of engine output, still unconverted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfoLine {
    pub multipv: u32,
    pub depth: u32,
    pub score: Option<RawScore>,
    pub pv_uci: Vec<String>,
}

/// Parse a single UCI `info` line. Lines without a score or PV are not
/// interesting to the adapter and return `None`.
pub fn parse_info_line(line: &str) -> Option<InfoLine> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != "info" {
        return None;
    }
    let mut info = InfoLine {
        multipv: 1,
        ..InfoLine::default()
    };
    while let Some(token) = tokens.next() {
        match token {
            "depth" => {
                info.depth = tokens.next()?.parse().ok()?;
            }
            "multipv" => {
                info.multipv = tokens.next()?.parse().ok()?;
            }
            "score" => match tokens.next()? {
                "cp" => info.score = Some(RawScore::Cp(tokens.next()?.parse().ok()?)),
                "mate" => info.score = Some(RawScore::Mate(tokens.next()?.parse().ok()?)),
                _ => return None,
            },
            "pv" => {
                info.pv_uci = tokens.map(str::to_string).collect();
                break;
            }
            _ => {}
        }
    }
    if info.score.is_none() && info.pv_uci.is_empty() {
        return None;
    }
    Some(info)
}

/// Convert the last `info` per multipv index into an `AnalysisResult`.
/// PV moves are validated against the position; conversion stops at the
/// first illegal move so the invariant on `pv` holds by construction.
pub fn build_result(fen: &str, depth: u32, multipv: u32, lines: &[InfoLine]) -> AnalysisResult {
    let mut result = AnalysisResult::empty(fen, depth, multipv);
    let Some(pos) = parse_fen(fen) else {
        return result;
    };
    let turn = pos.turn();

    let mut ranked: Vec<&InfoLine> = lines.iter().filter(|l| !l.pv_uci.is_empty()).collect();
    ranked.sort_by_key(|l| l.multipv);
    ranked.dedup_by_key(|l| l.multipv);

    for line in &ranked {
        let rank = line.multipv;
        let Some((san, uci_str, pv_san, pv_uci)) = convert_pv(&pos, &line.pv_uci) else {
            continue;
        };
        let (eval_cp, mate_in) = match line.score {
            Some(score) => {
                let (cp, mate) = score.to_white_cp(turn);
                (Some(cp), mate)
            }
            None => (None, None),
        };

        if rank == 1 {
            result.eval_cp = eval_cp;
            result.mate_in = mate_in;
            result.best_move_san = Some(san.clone());
            result.best_move_uci = Some(uci_str.clone());
            result.pv_san = pv_san;
            result.pv_uci = pv_uci;
        } else if rank == 2 {
            result.second_best_san = Some(san.clone());
            result.second_best_eval_cp = eval_cp;
        }
        result.top_moves.push(TopMove {
            move_san: san,
            move_uci: uci_str,
            eval_cp,
            rank,
        });
    }

    result
}

fn convert_pv(pos: &Chess, pv: &[String]) -> Option<(String, String, Vec<String>, Vec<String>)> {
    let mut board = pos.clone();
    let mut pv_san = Vec::new();
    let mut pv_uci = Vec::new();
    for token in pv {
        let Ok(uci) = token.parse::<shakmaty::uci::UciMove>() else {
            break;
        };
        let Ok(m) = uci.to_move(&board) else {
            break;
        };
        pv_san.push(san_of(&board, m));
        pv_uci.push(uci_of(&board, m));
        board.play_unchecked(m);
    }
    let first_san = pv_san.first()?.clone();
    let first_uci = pv_uci.first()?.clone();
    Some((first_san, first_uci, pv_san, pv_uci))
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn test_parse_info_line_cp() {
        let line = "info depth 16 seldepth 24 multipv 1 score cp 34 nodes 100 nps 1 pv e2e4 e7e5";
        let info = parse_info_line(line).unwrap();
        assert_eq!(info.depth, 16);
        assert_eq!(info.multipv, 1);
        assert_eq!(info.score, Some(RawScore::Cp(34)));
        assert_eq!(info.pv_uci, vec!["e2e4", "e7e5"]);
    }

    #[test]
    fn test_parse_info_line_mate() {
        let info = parse_info_line("info depth 10 score mate -3 pv h7h8q").unwrap();
        assert_eq!(info.score, Some(RawScore::Mate(-3)));
    }

    #[test]
    fn test_parse_info_line_defaults_multipv_to_one() {
        let info = parse_info_line("info depth 2 score cp -15 pv g8f6").unwrap();
        assert_eq!(info.multipv, 1);
    }

    #[test]
    fn test_parse_info_line_ignores_chatter() {
        assert!(parse_info_line("info string NNUE evaluation enabled").is_none());
        assert!(parse_info_line("bestmove e2e4").is_none());
    }

    #[test]
    fn test_score_normalization_black_to_move() {
        // +50 for the side to move is -50 for White when Black moves.
        assert_eq!(RawScore::Cp(50).to_white_cp(Color::Black), (-50, None));
        assert_eq!(RawScore::Cp(50).to_white_cp(Color::White), (50, None));
    }

    #[test]
    fn test_mate_sentinels() {
        // White to move, mate in 2 for White.
        assert_eq!(RawScore::Mate(2).to_white_cp(Color::White), (10_000, Some(2)));
        // Black to move, mate in 2 for Black.
        assert_eq!(RawScore::Mate(2).to_white_cp(Color::Black), (-10_000, Some(-2)));
        // Black to move, Black gets mated in 3.
        assert_eq!(RawScore::Mate(-3).to_white_cp(Color::Black), (10_000, Some(3)));
    }

    #[test]
    fn test_build_result_keeps_last_info_per_rank() {
        let lines = vec![
            parse_info_line("info depth 8 multipv 1 score cp 10 pv e2e4").unwrap(),
            parse_info_line("info depth 16 multipv 1 score cp 34 pv e2e4 e7e5").unwrap(),
            parse_info_line("info depth 16 multipv 2 score cp 20 pv d2d4").unwrap(),
        ];
        // Callers keep the last per index; simulate that here.
        let last: Vec<InfoLine> = vec![lines[1].clone(), lines[2].clone()];
        let result = build_result(START_FEN, 16, 2, &last);
        assert_eq!(result.eval_cp, Some(34));
        assert_eq!(result.best_move_san.as_deref(), Some("e4"));
        assert_eq!(result.pv_san, vec!["e4", "e5"]);
        assert_eq!(result.pv_san[0], result.best_move_san.clone().unwrap());
        assert_eq!(result.second_best_san.as_deref(), Some("d4"));
        assert_eq!(result.second_best_eval_cp, Some(20));
        assert_eq!(result.top_moves.len(), 2);
        assert_eq!(result.top_moves[0].rank, 1);
    }

    #[test]
    fn test_build_result_truncates_illegal_pv() {
        let lines = vec![parse_info_line("info depth 4 multipv 1 score cp 0 pv e2e4 e2e4").unwrap()];
        let result = build_result(START_FEN, 4, 1, &lines);
        // The second e2e4 is illegal for Black and is dropped.
        assert_eq!(result.pv_san, vec!["e4"]);
    }

    #[test]
    fn test_build_result_malformed_fen_is_empty() {
        let lines = vec![parse_info_line("info depth 4 score cp 0 pv e2e4").unwrap()];
        let result = build_result("garbage", 4, 1, &lines);
        assert!(result.is_empty());
        assert!(result.eval_cp.is_none());
    }

    #[test]
    fn test_empty_result_round_trips_through_json() {
        let result = AnalysisResult::empty(START_FEN, 16, 2);
        let json = serde_json::to_string(&result).unwrap();
        let back: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result, back);
    }
}
