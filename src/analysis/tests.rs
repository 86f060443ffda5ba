//! Unit tests for the tag/role analyzer and the delta engine.

use super::delta::compute_line_deltas;
use super::roles::{ROLE_BLOCKADER, ROLE_OVERWORKED, ROLE_PINNED};
use super::tags::{is_stable_instance, Tag};
use super::*;
use crate::board::{parse_fen, Side};

fn scan(fen: &str) -> PositionScan {
    scan_position(&parse_fen(fen).unwrap())
}

fn has_tag(scan: &PositionScan, name: &str, side: Side) -> bool {
    scan.tags.iter().any(|t| t.name == name && t.side == side)
}

#[test]
fn test_passed_pawn_detected() {
    // White pawn on f5 has no black pawn in front or on adjacent files.
    let s = scan("4k3/8/8/5P2/8/8/8/4K3 w - - 0 1");
    assert!(has_tag(&s, "tag.pawn.passed", Side::White));
}

#[test]
fn test_blocked_pawn_not_passed() {
    let s = scan("4k3/5p2/8/5P2/8/8/8/4K3 w - - 0 1");
    assert!(!has_tag(&s, "tag.pawn.passed", Side::White));
    // The black f-pawn faces a white pawn on its own file: not passed either.
    assert!(!has_tag(&s, "tag.pawn.passed", Side::Black));
}

#[test]
fn test_doubled_and_isolated_pawns() {
    // White: doubled pawns on b-file, isolated pawn on d-file.
    let s = scan("4k3/8/8/8/3P4/1P6/1P6/4K3 w - - 0 1");
    assert!(has_tag(&s, "tag.pawn.doubled", Side::White));
    assert!(has_tag(&s, "tag.pawn.isolated", Side::White));
}

#[test]
fn test_bishop_pair_tag() {
    let s = scan("4k3/8/8/8/8/8/B7/B3K3 w - - 0 1");
    assert!(has_tag(&s, "tag.bishop.pair", Side::White));
    assert!(!has_tag(&s, "tag.bishop.pair", Side::Black));
}

#[test]
fn test_bishop_pair_is_stable_instance() {
    assert!(is_stable_instance("tag.bishop.pair"));
    assert!(!is_stable_instance("tag.pawn.passed"));

    let mut a = Tag::new("tag.bishop.pair", Side::White);
    a.squares = vec!["a1".into(), "a2".into()];
    let mut b = Tag::new("tag.bishop.pair", Side::White);
    b.squares = vec!["c4".into(), "d5".into()];
    // Relocating the bishops must not change the diff identity.
    assert_eq!(a.instance_key(), b.instance_key());
}

#[test]
fn test_rook_open_file_and_seventh() {
    let s = scan("4k3/7R/8/8/8/8/8/4K3 w - - 0 1");
    assert!(has_tag(&s, "tag.rook.open_file", Side::White));
    assert!(has_tag(&s, "tag.rook.seventh", Side::White));
}

#[test]
fn test_rook_file_with_pawn_not_open() {
    let s = scan("4k3/8/8/8/8/7p/8/4K2R w K - 0 1");
    assert!(!has_tag(&s, "tag.rook.open_file", Side::White));
}

#[test]
fn test_knight_outpost() {
    // Knight on d5 supported by the c4 pawn, no black pawn can evict it.
    let s = scan("4k3/8/8/3N4/2P5/8/8/4K3 w - - 0 1");
    assert!(has_tag(&s, "tag.knight.outpost", Side::White));
}

#[test]
fn test_hanging_piece() {
    // Black knight on d5 attacked by the c3 pawn... use a rook instead:
    // white rook attacks the undefended black knight on d5.
    let s = scan("4k3/8/8/3n4/8/8/8/3RK3 w - - 0 1");
    assert!(has_tag(&s, "tag.piece.hanging", Side::Black));
}

#[test]
fn test_overworked_defender() {
    // The black king on e8 is the sole defender of both rooks on d8 and f8,
    // each attacked by a white queen.
    let s = scan("3rkr2/8/8/8/8/8/3Q1Q2/4K3 b - - 0 1");
    assert!(s
        .tags
        .iter()
        .any(|t| t.name.starts_with("tag.piece.overworked.") && t.side == Side::Black));
    assert!(s
        .roles
        .iter()
        .any(|r| r.role == ROLE_OVERWORKED && r.piece_id.starts_with("black_king")));
}

#[test]
fn test_pinned_role() {
    // Black knight on e5 pinned against the e8 king by the white rook on e1.
    let s = scan("4k3/8/8/4n3/8/8/8/4RK2 b - - 0 1");
    assert!(s
        .roles
        .iter()
        .any(|r| r.role == ROLE_PINNED && r.piece_id == "black_knight_e5"));
}

#[test]
fn test_blockader_role() {
    // White knight on d4 blockades the black passed pawn on d5.
    let s = scan("4k3/8/8/3p4/3N4/8/8/4K3 w - - 0 1");
    assert!(s
        .roles
        .iter()
        .any(|r| r.role == ROLE_BLOCKADER && r.piece_id == "white_knight_d4"));
}

#[test]
fn test_piece_id_format() {
    use shakmaty::{Color, Role, Square};
    assert_eq!(piece_id(Color::White, Role::Knight, Square::G1), "white_knight_g1");
    assert_eq!(piece_id(Color::Black, Role::Queen, Square::D8), "black_queen_d8");
}

#[test]
fn test_humanize_tag() {
    assert_eq!(humanize_tag("tag.pawn.passed").unwrap(), "pawn passed");
    assert_eq!(
        humanize_tag("tag.threat.capture.undefended").unwrap(),
        "threat capture undefended"
    );
    assert!(humanize_tag("").is_none());
}

#[test]
fn test_scan_fen_malformed_is_empty() {
    let s = scan_fen("definitely not a fen");
    assert!(s.tags.is_empty());
    assert!(s.roles.is_empty());
}

// --- delta engine ---

#[test]
fn test_delta_gained_then_lost_cancels() {
    // 1. Rh7 gains the seventh-rank tag, 2. ... (rook returns) loses it;
    // the net lists must not contain it.
    let fen = "4k3/8/8/8/8/8/8/R3K3 w - - 0 1";
    let line = vec!["Ra7".to_string(), "Kf8".to_string(), "Ra1".to_string()];
    let deltas = compute_line_deltas(fen, &line);
    assert_eq!(deltas.per_move.len(), 3);
    assert!(deltas.per_move[0]
        .tags_gained
        .contains(&"tag.rook.seventh".to_string()));
    assert!(!deltas
        .tags_gained_net
        .contains(&"tag.rook.seventh".to_string()));
    assert!(!deltas.tags_lost_net.contains(&"tag.rook.seventh".to_string()));
}

#[test]
fn test_delta_single_ply_net() {
    let fen = "4k3/8/8/8/8/8/8/R3K3 w - - 0 1";
    let line = vec!["Ra7".to_string()];
    let deltas = compute_line_deltas(fen, &line);
    assert!(deltas
        .tags_gained_net
        .contains(&"tag.rook.seventh".to_string()));
    // The open-file instance relocated a1 -> a7, so the name shows on both
    // sides of the net. Locked behavior: users see the instance change.
    assert!(deltas
        .tags_gained_net
        .contains(&"tag.rook.open_file".to_string()));
    assert!(deltas
        .tags_lost_net
        .contains(&"tag.rook.open_file".to_string()));
    assert!(!deltas.tags_lost_net.contains(&"tag.rook.seventh".to_string()));
}

#[test]
fn test_delta_instance_change_reports_both_sides() {
    // The passed f-pawn advances f5-f6: the f5 instance is lost, the f6
    // instance is gained. Both directions must surface in the string nets.
    let fen = "4k3/8/8/5P2/8/8/8/4K3 w - - 0 1";
    let line = vec!["f6".to_string()];
    let deltas = compute_line_deltas(fen, &line);
    assert!(deltas
        .tags_gained_net
        .contains(&"tag.pawn.passed".to_string()));
    assert!(deltas.tags_lost_net.contains(&"tag.pawn.passed".to_string()));
    let gained: Vec<_> = deltas
        .tags_gained_net_structured
        .iter()
        .filter(|t| t.name == "tag.pawn.passed")
        .collect();
    let lost: Vec<_> = deltas
        .tags_lost_net_structured
        .iter()
        .filter(|t| t.name == "tag.pawn.passed")
        .collect();
    assert_eq!(gained.len(), 1);
    assert_eq!(lost.len(), 1);
    assert_eq!(gained[0].squares, vec!["f6"]);
    assert_eq!(lost[0].squares, vec!["f5"]);
}

#[test]
fn test_delta_stable_instance_does_not_churn() {
    // Moving one bishop keeps the bishop pair; the stable-instance identity
    // must keep the net lists quiet.
    let fen = "4k3/8/8/8/8/8/B7/B3K3 w - - 0 1";
    let line = vec!["Bb3".to_string()];
    let deltas = compute_line_deltas(fen, &line);
    assert!(!deltas.tags_gained_net.contains(&"tag.bishop.pair".to_string()));
    assert!(!deltas.tags_lost_net.contains(&"tag.bishop.pair".to_string()));
}

#[test]
fn test_delta_illegal_move_skipped() {
    let fen = "4k3/8/8/8/8/8/8/R3K3 w - - 0 1";
    let line = vec!["Qh5".to_string(), "Ra7".to_string()];
    let deltas = compute_line_deltas(fen, &line);
    // The illegal queen move is skipped; the rook move still lands.
    assert_eq!(deltas.per_move.len(), 1);
    assert_eq!(deltas.per_move[0].move_san, "Ra7");
}

#[test]
fn test_delta_roles_track_pins() {
    // After Re2 the black knight on e5 becomes pinned against the e8 king.
    let fen = "4k3/8/8/4n3/8/8/R7/4K3 w - - 0 1";
    let line = vec!["Re2".to_string()];
    let deltas = compute_line_deltas(fen, &line);
    assert!(deltas
        .roles_gained_net
        .iter()
        .any(|r| r == "black_knight_e5:role.tactical.pinned"));
}
