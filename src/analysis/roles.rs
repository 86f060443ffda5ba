// src/analysis/roles.rs

use serde::{Deserialize, Serialize};
use shakmaty::{Bitboard, Chess, Color, Piece, Position, Role, Square};

use crate::analysis::tags::{attackers, is_passed};
use crate::analysis::piece_id;
use crate::board::piece_value;

pub const ROLE_PINNED: &str = "role.tactical.pinned";
pub const ROLE_OVERWORKED: &str = "role.defending.overworked";
pub const ROLE_DEFENDER: &str = "role.defending.defender";
pub const ROLE_ATTACKER: &str = "role.attacking.attacker";
pub const ROLE_BLOCKADER: &str = "role.blockading.blockader";

/// A functional descriptor attached to one concrete piece instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceRole {
    pub piece_id: String,
    pub role: String,
}

impl PieceRole {
    pub fn new(color: Color, role: Role, square: Square, role_name: &str) -> Self {
        PieceRole {
            piece_id: piece_id(color, role, square),
            role: role_name.to_string(),
        }
    }

    /// Identity used for diffing: `white_knight_g1:role.tactical.pinned`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.piece_id, self.role)
    }
}

pub fn collect(pos: &Chess, color: Color, out: &mut Vec<PieceRole>) {
    pinned_pieces(pos, color, out);
    defenders(pos, color, out);
    attackers_of_material(pos, color, out);
    blockaders(pos, color, out);
}

/// Absolutely pinned pieces: removing the piece from the board exposes the
/// king to a new slider attack.
fn pinned_pieces(pos: &Chess, color: Color, out: &mut Vec<PieceRole>) {
    let board = pos.board();
    let Some(king_square) = board.king_of(color) else {
        return;
    };
    let occupied = board.occupied();
    let attackers_now = board.attacks_to(king_square, !color, occupied);

    for square in board.by_color(color) {
        let Some(piece) = board.piece_at(square) else { continue };
        if piece.role == Role::King {
            continue;
        }
        let without = occupied ^ Bitboard::from_square(square);
        let attackers_without = board.attacks_to(king_square, !color, without);
        if !(attackers_without & !attackers_now & board.by_color(!color)).is_empty() {
            out.push(PieceRole::new(color, piece.role, square, ROLE_PINNED));
        }
    }
}

/// Defenders of attacked friendly material; sole guards of two or more such
/// pieces are additionally overworked.
fn defenders(pos: &Chess, color: Color, out: &mut Vec<PieceRole>) {
    let board = pos.board();

    for defender_square in board.by_color(color) {
        let Some(defender) = board.piece_at(defender_square) else { continue };
        let covers = board.attacks_from(defender_square);
        let mut guarded_attacked = 0usize;
        let mut sole_guarded = 0usize;
        for target_square in board.by_color(color) {
            if target_square == defender_square
                || (covers & Bitboard::from_square(target_square)).is_empty()
            {
                continue;
            }
            if attackers(pos, !color, target_square).is_empty() {
                continue;
            }
            guarded_attacked += 1;
            let others =
                attackers(pos, color, target_square) & !Bitboard::from_square(defender_square);
            if others.is_empty() {
                sole_guarded += 1;
            }
        }
        if guarded_attacked >= 1 {
            out.push(PieceRole::new(color, defender.role, defender_square, ROLE_DEFENDER));
        }
        if sole_guarded >= 2 {
            out.push(PieceRole::new(color, defender.role, defender_square, ROLE_OVERWORKED));
        }
    }
}

/// Pieces pressuring enemy material: attacking something undefended, or
/// something worth at least as much as themselves.
fn attackers_of_material(pos: &Chess, color: Color, out: &mut Vec<PieceRole>) {
    let board = pos.board();

    for attacker_square in board.by_color(color) {
        let Some(attacker) = board.piece_at(attacker_square) else { continue };
        if attacker.role == Role::King {
            continue;
        }
        let reach = board.attacks_from(attacker_square);
        let mut is_attacker = false;
        for target_square in board.by_color(!color) {
            if (reach & Bitboard::from_square(target_square)).is_empty() {
                continue;
            }
            let Some(target) = board.piece_at(target_square) else { continue };
            if target.role == Role::King {
                continue;
            }
            let undefended = attackers(pos, !color, target_square).is_empty();
            if undefended || piece_value(target.role) >= piece_value(attacker.role) {
                is_attacker = true;
                break;
            }
        }
        if is_attacker {
            out.push(PieceRole::new(color, attacker.role, attacker_square, ROLE_ATTACKER));
        }
    }
}

/// Pieces parked directly in front of an enemy passed pawn.
fn blockaders(pos: &Chess, color: Color, out: &mut Vec<PieceRole>) {
    let board = pos.board();
    let their_pawns = board.by_piece(Piece { role: Role::Pawn, color: !color });
    let our_pawns = board.by_piece(Piece { role: Role::Pawn, color });

    for pawn_square in their_pawns {
        if !is_passed(!color, pawn_square, our_pawns) {
            continue;
        }
        let rank_idx = pawn_square.rank() as i32;
        // The pawn belongs to the opponent, so "in front" is toward our side.
        let stop_rank = if color == Color::White { rank_idx - 1 } else { rank_idx + 1 };
        if !(0..8).contains(&stop_rank) {
            continue;
        }
        let stop_square =
            Square::from_coords(pawn_square.file(), shakmaty::Rank::new(stop_rank as u32));
        if let Some(piece) = board.piece_at(stop_square) {
            if piece.color == color {
                out.push(PieceRole::new(color, piece.role, stop_square, ROLE_BLOCKADER));
            }
        }
    }
}
