//! Structural analysis of a single position: tags and piece roles.
//!
//! Tags describe board-level facts (`tag.pawn.passed`, `tag.rook.open_file`);
//! roles describe what an individual piece is doing (`role.tactical.pinned`).
//! Both are classifiers, not evaluation terms: the engine adapter remains the
//! only source of evaluation numbers.

pub mod delta;
pub mod roles;
pub mod tags;

use serde::{Deserialize, Serialize};
use shakmaty::{Chess, Color, Role, Square};

use crate::board::{parse_fen, Side};
use roles::PieceRole;
use tags::Tag;

/// Snapshot of everything the tag/role analyzer knows about one FEN.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionScan {
    pub fen: String,
    pub tags: Vec<Tag>,
    pub roles: Vec<PieceRole>,
    pub top_themes: Vec<String>,
}

/// Stable identifier for a piece instance: `white_knight_g1`.
pub fn piece_id(color: Color, role: Role, square: Square) -> String {
    let side = Side::from(color);
    format!("{side}_{}_{square}", role_name(role))
}

pub fn role_name(role: Role) -> &'static str {
    match role {
        Role::Pawn => "pawn",
        Role::Knight => "knight",
        Role::Bishop => "bishop",
        Role::Rook => "rook",
        Role::Queen => "queen",
        Role::King => "king",
    }
}

/// Convert a structured tag identifier into a short human phrase,
/// e.g. `tag.pawn.passed` -> "pawn passed".
pub fn humanize_tag(tag_name: &str) -> Option<String> {
    let cleaned = tag_name
        .trim()
        .trim_start_matches("tag.")
        .replace(['.', '_'], " ");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

pub fn scan_position(pos: &Chess) -> PositionScan {
    let mut scan = PositionScan {
        fen: crate::board::position_fen(pos),
        tags: Vec::new(),
        roles: Vec::new(),
        top_themes: Vec::new(),
    };

    for &color in &Color::ALL {
        tags::collect(pos, color, &mut scan.tags);
        roles::collect(pos, color, &mut scan.roles);
    }

    for tag in &scan.tags {
        if let Some(label) = humanize_tag(&tag.name) {
            if !scan.top_themes.contains(&label) {
                scan.top_themes.push(label);
            }
        }
        if scan.top_themes.len() >= 3 {
            break;
        }
    }

    scan
}

/// FEN convenience wrapper; a malformed FEN yields an empty scan.
pub fn scan_fen(fen: &str) -> PositionScan {
    match parse_fen(fen) {
        Some(pos) => scan_position(&pos),
        None => PositionScan {
            fen: fen.to_string(),
            ..PositionScan::default()
        },
    }
}

#[cfg(test)]
pub mod tests;
