// src/analysis/tags.rs

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use shakmaty::{Bitboard, Chess, Color, File, Piece, Position, Rank, Role, Square};

use crate::analysis::piece_id;
use crate::board::Side;

/// Tags whose diff identity collapses to (name, side). These describe a
/// side-level condition, so a piece changing squares must not produce
/// gained/lost churn. Treated as configuration, not ontology.
static STABLE_INSTANCE_TAGS: Lazy<Vec<&'static str>> = Lazy::new(|| vec!["tag.bishop.pair"]);

pub fn is_stable_instance(name: &str) -> bool {
    STABLE_INSTANCE_TAGS.iter().any(|t| *t == name)
}

/// A structural or tactical property of the position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub side: Side,
    #[serde(default)]
    pub squares: Vec<String>,
    #[serde(default)]
    pub pieces: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl Tag {
    pub fn new(name: &str, side: Side) -> Self {
        Tag {
            name: name.to_string(),
            side,
            squares: Vec::new(),
            pieces: Vec::new(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_square(mut self, square: Square) -> Self {
        self.squares.push(square.to_string());
        self
    }

    pub fn with_piece(mut self, color: Color, role: Role, square: Square) -> Self {
        self.pieces.push(piece_id(color, role, square));
        self
    }

    /// Identity used for diffing. Stable-instance tags collapse their
    /// square/piece details so relocations do not churn.
    pub fn instance_key(&self) -> String {
        if is_stable_instance(&self.name) {
            return format!("{}|{}", self.name, self.side);
        }
        let mut squares = self.squares.clone();
        squares.sort();
        let mut pieces = self.pieces.clone();
        pieces.sort();
        format!(
            "{}|{}|{}|{}",
            self.name,
            self.side,
            squares.join(","),
            pieces.join(",")
        )
    }

    /// Squares of the pieces this tag records as defended (overworked tags).
    pub fn defended_squares(&self) -> Vec<String> {
        self.details
            .get("defended")
            .map(|s| s.split(' ').filter(|x| !x.is_empty()).map(str::to_string).collect())
            .unwrap_or_default()
    }
}

pub fn collect(pos: &Chess, color: Color, out: &mut Vec<Tag>) {
    pawn_tags(pos, color, out);
    bishop_pair(pos, color, out);
    rook_tags(pos, color, out);
    knight_outposts(pos, color, out);
    king_exposure(pos, color, out);
    hanging_pieces(pos, color, out);
    overworked_defenders(pos, color, out);
}

/// Bitboard of `color` pieces attacking `square`.
pub fn attackers(pos: &Chess, color: Color, square: Square) -> Bitboard {
    let board = pos.board();
    board.attacks_to(square, color, board.occupied()) & board.by_color(color)
}

fn pawn_tags(pos: &Chess, color: Color, out: &mut Vec<Tag>) {
    let board = pos.board();
    let side = Side::from(color);
    let our_pawns = board.by_piece(Piece { role: Role::Pawn, color });
    let their_pawns = board.by_piece(Piece { role: Role::Pawn, color: !color });

    for file in File::ALL {
        let on_file = (our_pawns & Bitboard::from_file(file)).count();
        if on_file > 1 {
            let mut tag = Tag::new("tag.pawn.doubled", side);
            for sq in our_pawns & Bitboard::from_file(file) {
                tag = tag.with_square(sq).with_piece(color, Role::Pawn, sq);
            }
            out.push(tag);
        }
    }

    for pawn_square in our_pawns {
        let file_idx = pawn_square.file() as i32;
        let mut isolated = true;
        for adjacent in [file_idx - 1, file_idx + 1] {
            if (0..8).contains(&adjacent)
                && !(our_pawns & Bitboard::from_file(File::new(adjacent as u32))).is_empty()
            {
                isolated = false;
            }
        }
        if isolated {
            out.push(
                Tag::new("tag.pawn.isolated", side)
                    .with_square(pawn_square)
                    .with_piece(color, Role::Pawn, pawn_square),
            );
        }

        if is_passed(color, pawn_square, their_pawns) {
            out.push(
                Tag::new("tag.pawn.passed", side)
                    .with_square(pawn_square)
                    .with_piece(color, Role::Pawn, pawn_square),
            );
        }
    }
}

/// A pawn is passed when no enemy pawn on the same or an adjacent file can
/// ever block or capture it.
pub fn is_passed(color: Color, pawn_square: Square, their_pawns: Bitboard) -> bool {
    let file_idx = pawn_square.file() as i32;
    let rank_idx = pawn_square.rank() as i32;
    for enemy in their_pawns {
        let enemy_file = enemy.file() as i32;
        if (enemy_file - file_idx).abs() > 1 {
            continue;
        }
        let enemy_rank = enemy.rank() as i32;
        let ahead = if color == Color::White {
            enemy_rank > rank_idx
        } else {
            enemy_rank < rank_idx
        };
        if ahead {
            return false;
        }
    }
    true
}

fn bishop_pair(pos: &Chess, color: Color, out: &mut Vec<Tag>) {
    let board = pos.board();
    let bishops = board.by_piece(Piece { role: Role::Bishop, color });
    if bishops.count() >= 2 {
        let mut tag = Tag::new("tag.bishop.pair", Side::from(color));
        for sq in bishops {
            tag = tag.with_square(sq).with_piece(color, Role::Bishop, sq);
        }
        out.push(tag);
    }
}

fn rook_tags(pos: &Chess, color: Color, out: &mut Vec<Tag>) {
    let board = pos.board();
    let side = Side::from(color);
    let rooks = board.by_piece(Piece { role: Role::Rook, color });
    let all_pawns = board.pawns();
    let seventh = if color == Color::White { Rank::Seventh } else { Rank::Second };

    for rook_square in rooks {
        let file_mask = Bitboard::from_file(rook_square.file());
        if (all_pawns & file_mask).is_empty() {
            out.push(
                Tag::new("tag.rook.open_file", side)
                    .with_square(rook_square)
                    .with_piece(color, Role::Rook, rook_square),
            );
        }
        if rook_square.rank() == seventh {
            out.push(
                Tag::new("tag.rook.seventh", side)
                    .with_square(rook_square)
                    .with_piece(color, Role::Rook, rook_square),
            );
        }
    }
}

fn knight_outposts(pos: &Chess, color: Color, out: &mut Vec<Tag>) {
    let board = pos.board();
    let side = Side::from(color);
    let knights = board.by_piece(Piece { role: Role::Knight, color });
    let our_pawns = board.by_piece(Piece { role: Role::Pawn, color });
    let their_pawns = board.by_piece(Piece { role: Role::Pawn, color: !color });

    for knight_square in knights {
        let rank_idx = knight_square.rank() as i32;
        let advanced = if color == Color::White {
            (3..=5).contains(&rank_idx)
        } else {
            (2..=4).contains(&rank_idx)
        };
        if !advanced {
            continue;
        }
        if !pawn_supported(color, knight_square, our_pawns) {
            continue;
        }
        if attackable_by_enemy_pawn(color, knight_square, their_pawns) {
            continue;
        }
        out.push(
            Tag::new("tag.knight.outpost", side)
                .with_square(knight_square)
                .with_piece(color, Role::Knight, knight_square),
        );
    }
}

fn pawn_supported(color: Color, square: Square, our_pawns: Bitboard) -> bool {
    let file_idx = square.file() as i32;
    let rank_idx = square.rank() as i32;
    let support_rank = if color == Color::White { rank_idx - 1 } else { rank_idx + 1 };
    if !(0..8).contains(&support_rank) {
        return false;
    }
    for adjacent in [file_idx - 1, file_idx + 1] {
        if !(0..8).contains(&adjacent) {
            continue;
        }
        let support = Square::from_coords(File::new(adjacent as u32), Rank::new(support_rank as u32));
        if !(our_pawns & Bitboard::from_square(support)).is_empty() {
            return true;
        }
    }
    false
}

fn attackable_by_enemy_pawn(color: Color, square: Square, their_pawns: Bitboard) -> bool {
    let file_idx = square.file() as i32;
    let rank_idx = square.rank() as i32;
    for enemy in their_pawns {
        let enemy_file = enemy.file() as i32;
        if (enemy_file - file_idx).abs() != 1 {
            continue;
        }
        let enemy_rank = enemy.rank() as i32;
        let can_reach = if color == Color::White {
            enemy_rank > rank_idx
        } else {
            enemy_rank < rank_idx
        };
        if can_reach {
            return true;
        }
    }
    false
}

fn king_exposure(pos: &Chess, color: Color, out: &mut Vec<Tag>) {
    let board = pos.board();
    let Some(king_square) = board.king_of(color) else {
        return;
    };
    let our_pawns = board.by_piece(Piece { role: Role::Pawn, color });
    let file_idx = king_square.file() as i32;
    let rank_idx = king_square.rank() as i32;
    let shield_rank = if color == Color::White { rank_idx + 1 } else { rank_idx - 1 };
    if !(0..8).contains(&shield_rank) {
        return;
    }
    let mut shield_pawns = 0;
    for f in [file_idx - 1, file_idx, file_idx + 1] {
        if !(0..8).contains(&f) {
            continue;
        }
        let sq = Square::from_coords(File::new(f as u32), Rank::new(shield_rank as u32));
        if !(our_pawns & Bitboard::from_square(sq)).is_empty() {
            shield_pawns += 1;
        }
    }
    if shield_pawns == 0 {
        out.push(
            Tag::new("tag.king.exposed", Side::from(color))
                .with_square(king_square)
                .with_piece(color, Role::King, king_square),
        );
    }
}

fn hanging_pieces(pos: &Chess, color: Color, out: &mut Vec<Tag>) {
    let board = pos.board();
    let side = Side::from(color);
    for square in board.by_color(color) {
        let Some(piece) = board.piece_at(square) else { continue };
        if piece.role == Role::King {
            continue;
        }
        let attacked = !attackers(pos, !color, square).is_empty();
        let defended = !attackers(pos, color, square).is_empty();
        if attacked && !defended {
            out.push(
                Tag::new("tag.piece.hanging", side)
                    .with_square(square)
                    .with_piece(color, piece.role, square),
            );
        }
    }
}

/// A defender is overworked when it is the sole guard of two or more
/// friendly pieces that are currently attacked. The tag name carries the
/// defender square so each instance stays distinct across the board.
fn overworked_defenders(pos: &Chess, color: Color, out: &mut Vec<Tag>) {
    let board = pos.board();
    let side = Side::from(color);

    for defender_square in board.by_color(color) {
        let Some(defender) = board.piece_at(defender_square) else { continue };
        if defender.role == Role::Pawn {
            continue;
        }
        let defends = board.attacks_from(defender_square);

        let mut burdens: Vec<Square> = Vec::new();
        for target_square in board.by_color(color) {
            if target_square == defender_square {
                continue;
            }
            if (defends & Bitboard::from_square(target_square)).is_empty() {
                continue;
            }
            if attackers(pos, !color, target_square).is_empty() {
                continue;
            }
            // Sole guard: no other friendly piece covers the target.
            let other_defenders =
                attackers(pos, color, target_square) & !Bitboard::from_square(defender_square);
            if other_defenders.is_empty() {
                burdens.push(target_square);
            }
        }

        if burdens.len() >= 2 {
            let mut tag = Tag::new(&format!("tag.piece.overworked.{defender_square}"), side)
                .with_square(defender_square)
                .with_piece(color, defender.role, defender_square);
            let defended = burdens
                .iter()
                .map(|sq| sq.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            tag.details.insert("defended".to_string(), defended);
            out.push(tag);
        }
    }
}

/// Build the synthetic tag the exploitation detector injects when an
/// overworked defender disappears and a formerly covered piece is left
/// attacked with zero defenders.
pub fn undefended_capture_tag(pos: &Chess, target_square: Square) -> Option<Tag> {
    let board = pos.board();
    let piece = board.piece_at(target_square)?;
    if piece.role == Role::King {
        return None;
    }
    let attacker_color = !piece.color;
    let attacking = attackers(pos, attacker_color, target_square);
    if attacking.is_empty() || !attackers(pos, piece.color, target_square).is_empty() {
        return None;
    }
    let mut tag = Tag::new("tag.threat.capture.undefended", Side::from(attacker_color))
        .with_square(target_square)
        .with_piece(piece.color, piece.role, target_square);
    let attacker_list = attacking
        .into_iter()
        .map(|sq| sq.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    tag.details.insert("attackers".to_string(), attacker_list);
    Some(tag)
}
