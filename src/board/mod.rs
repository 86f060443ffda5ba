// src/board/mod.rs

//! Position primitives shared by the whole pipeline: FEN round-trips,
//! lenient SAN handling, and static material accounting.
//!
//! Boards flow by value through the stack; nothing in here keeps state.

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position, Role};

use crate::constants::{
    BISHOP_PHASE_VAL, BISHOP_VALUE, KNIGHT_PHASE_VAL, KNIGHT_VALUE, PAWN_VALUE, QUEEN_PHASE_VAL,
    QUEEN_VALUE, ROOK_PHASE_VAL, ROOK_VALUE, TOTAL_PHASE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        if color == Color::White {
            Side::White
        } else {
            Side::Black
        }
    }
}

impl From<Side> for Color {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::White => write!(f, "white"),
            Side::Black => write!(f, "black"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Opening,
    Middlegame,
    Endgame,
}

/// Parse a 6-field FEN into a position. The FEN must round-trip bit-exactly,
/// so castling rights and the en-passant square are taken at face value.
pub fn parse_fen(fen: &str) -> Option<Chess> {
    let parsed: Fen = fen.parse().ok()?;
    parsed.into_position(CastlingMode::Standard).ok()
}

pub fn position_fen(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

/// Strip trailing annotation punctuation from a SAN token. Check and mate
/// markers stay; `!`, `?` and their combinations go.
pub fn clean_san(san: &str) -> &str {
    san.trim().trim_end_matches(['!', '?'])
}

/// Lenient SAN parse. Tries a strict `SanPlus` parse first (which tolerates
/// `+` and `#`), then falls back to matching the SAN of each legal move
/// after normalization. Returns `None` for moves that are not legal here.
pub fn parse_san_lenient(pos: &Chess, san: &str) -> Option<Move> {
    let cleaned = clean_san(san);
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(parsed) = cleaned.parse::<SanPlus>() {
        if let Ok(m) = parsed.san.to_move(pos) {
            return Some(m);
        }
    }
    // Fallback: compare against the canonical SAN of every legal move with
    // suffixes stripped on both sides.
    let wanted = cleaned.trim_end_matches(['+', '#']);
    for m in pos.legal_moves() {
        let legal_san = San::from_move(pos, m).to_string();
        if legal_san.trim_end_matches(['+', '#']) == wanted {
            return Some(m);
        }
    }
    None
}

/// Canonical SAN (with check/mate suffix) for a legal move.
pub fn san_of(pos: &Chess, m: Move) -> String {
    SanPlus::from_move(pos.clone(), m).to_string()
}

pub fn uci_of(pos: &Chess, m: Move) -> String {
    m.to_uci(pos.castles().mode()).to_string()
}

/// Apply a SAN line to a position. Returns the end position, or `None` as
/// soon as a move fails to parse or is illegal.
pub fn apply_san_line(pos: &Chess, moves_san: &[String]) -> Option<Chess> {
    let mut current = pos.clone();
    for san in moves_san {
        let m = parse_san_lenient(&current, san)?;
        current.play_unchecked(m);
    }
    Some(current)
}

pub fn piece_value(role: Role) -> i32 {
    match role {
        Role::Pawn => PAWN_VALUE,
        Role::Knight => KNIGHT_VALUE,
        Role::Bishop => BISHOP_VALUE,
        Role::Rook => ROOK_VALUE,
        Role::Queen => QUEEN_VALUE,
        Role::King => 0,
    }
}

/// Static material balance in centipawns, White minus Black.
pub fn material_balance_cp(pos: &Chess) -> i32 {
    let board = pos.board();
    let mut balance = 0;
    for &color in &Color::ALL {
        for &role in &Role::ALL {
            let count = board.by_piece(shakmaty::Piece { role, color }).count() as i32;
            let value = count * piece_value(role);
            if color == Color::White {
                balance += value;
            } else {
                balance -= value;
            }
        }
    }
    balance
}

pub fn material_balance_cp_from_fen(fen: &str) -> Option<i32> {
    parse_fen(fen).map(|pos| material_balance_cp(&pos))
}

fn phase_value(pos: &Chess) -> i32 {
    let board = pos.board();
    let mut value = 0;
    for &role in &[Role::Knight, Role::Bishop, Role::Rook, Role::Queen] {
        let count = board.by_role(role).count() as i32;
        value += count
            * match role {
                Role::Queen => QUEEN_PHASE_VAL,
                Role::Rook => ROOK_PHASE_VAL,
                Role::Bishop => BISHOP_PHASE_VAL,
                Role::Knight => KNIGHT_PHASE_VAL,
                _ => 0,
            };
    }
    value.min(TOTAL_PHASE)
}

/// Coarse game phase from remaining material and move count.
pub fn game_phase(pos: &Chess) -> GamePhase {
    let phase = phase_value(pos);
    let fullmoves = u32::from(pos.fullmoves());
    if phase <= TOTAL_PHASE / 4 {
        GamePhase::Endgame
    } else if fullmoves <= 10 && phase >= TOTAL_PHASE - 2 {
        GamePhase::Opening
    } else {
        GamePhase::Middlegame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::Chess;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn test_fen_round_trip_is_bit_exact() {
        let fens = [
            START_FEN,
            "r1bqk2r/ppp2ppp/2np1n2/2b1p3/2B1P3/2NP1N2/PPP2PPP/R1BQK2R w KQkq - 0 6",
            "8/4k3/8/2Pp4/8/8/4K3/8 w - d6 0 41",
        ];
        for fen in fens {
            let pos = parse_fen(fen).unwrap();
            assert_eq!(position_fen(&pos), fen);
        }
    }

    #[test]
    fn test_parse_fen_rejects_garbage() {
        assert!(parse_fen("not a fen").is_none());
        assert!(parse_fen("").is_none());
    }

    #[test]
    fn test_lenient_san_strips_annotations() {
        let pos = parse_fen(START_FEN).unwrap();
        for san in ["Nf3", "Nf3!", "Nf3!?", "Nf3??"] {
            let m = parse_san_lenient(&pos, san).expect(san);
            assert_eq!(san_of(&pos, m), "Nf3");
        }
    }

    #[test]
    fn test_lenient_san_accepts_check_suffix_mismatch() {
        // Qh5 gives no check here, but a sloppy producer may still write "+".
        let pos = parse_fen("rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2").unwrap();
        let m = parse_san_lenient(&pos, "Qh5+").unwrap();
        assert_eq!(san_of(&pos, m), "Qh5");
    }

    #[test]
    fn test_san_round_trip() {
        let pos = parse_fen(START_FEN).unwrap();
        for m in pos.legal_moves() {
            let san = san_of(&pos, m);
            let reparsed = parse_san_lenient(&pos, &san).unwrap();
            assert_eq!(san_of(&pos, reparsed), san);
        }
    }

    #[test]
    fn test_illegal_san_is_none() {
        let pos = parse_fen(START_FEN).unwrap();
        assert!(parse_san_lenient(&pos, "Qh5").is_none());
        assert!(parse_san_lenient(&pos, "zz").is_none());
    }

    #[test]
    fn test_material_balance_start_is_zero() {
        let pos = Chess::default();
        assert_eq!(material_balance_cp(&pos), 0);
    }

    #[test]
    fn test_material_balance_extra_queen() {
        let pos = parse_fen("4k3/8/8/8/8/8/8/4K2Q w - - 0 1").unwrap();
        assert_eq!(material_balance_cp(&pos), 900);
    }

    #[test]
    fn test_game_phase_classification() {
        assert_eq!(game_phase(&Chess::default()), GamePhase::Opening);
        let endgame = parse_fen("8/4k3/8/8/8/8/4K3/8 w - - 0 50").unwrap();
        assert_eq!(game_phase(&endgame), GamePhase::Endgame);
        let middlegame =
            parse_fen("r1bq1rk1/ppp2ppp/2np1n2/4p3/2B1P3/2NP1N2/PPP2PPP/R1BQ1RK1 w - - 4 15")
                .unwrap();
        assert_eq!(game_phase(&middlegame), GamePhase::Middlegame);
    }

    #[test]
    fn test_apply_san_line() {
        let pos = parse_fen(START_FEN).unwrap();
        let line = vec!["e4".to_string(), "e5".to_string(), "Nf3".to_string()];
        let end = apply_san_line(&pos, &line).unwrap();
        assert_eq!(
            position_fen(&end),
            "rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2"
        );
        let bad = vec!["e4".to_string(), "e4".to_string()];
        assert!(apply_san_line(&pos, &bad).is_none());
    }

    #[test]
    fn test_castling_mode_round_trip() {
        let pos = parse_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQK2R w KQkq - 0 1").unwrap();
        let m = parse_san_lenient(&pos, "O-O").unwrap();
        assert_eq!(san_of(&pos, m), "O-O");
        assert_eq!(uci_of(&pos, m), "e1g1");
    }
}
