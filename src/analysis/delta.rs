// src/analysis/delta.rs

//! Per-ply tag/role diffing for a concrete SAN line, plus the counting-based
//! net aggregation consumed by the claim binder.
//!
//! Net semantics: a tag gained on one ply and lost on a later ply cancels.
//! A tag whose instance moves (same name, different squares) reports as both
//! lost and gained; only stable-instance tags collapse that churn.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use shakmaty::{Chess, Position};
use tracing::debug;

use crate::analysis::tags::{undefended_capture_tag, Tag};
use crate::analysis::{scan_position, PositionScan};
use crate::board::{parse_fen, parse_san_lenient, position_fen};

/// Net tag-name prefixes hidden from the public lists. The raw lists keep
/// everything for deep consumers.
const CLUTTER_PREFIXES: [&str; 3] = ["tag.diagonal.", "tag.key.", "tag.color.hole."];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerMoveDelta {
    pub ply: usize,
    pub move_san: String,
    pub fen_before: String,
    pub fen_after: String,
    pub tags_gained: Vec<String>,
    pub tags_lost: Vec<String>,
    pub tags_gained_structured: Vec<Tag>,
    pub tags_lost_structured: Vec<Tag>,
    pub roles_gained: Vec<String>,
    pub roles_lost: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineDeltas {
    pub per_move: Vec<PerMoveDelta>,
    pub tags_gained_net: Vec<String>,
    pub tags_lost_net: Vec<String>,
    pub tags_gained_net_raw: Vec<String>,
    pub tags_lost_net_raw: Vec<String>,
    pub tags_gained_net_structured: Vec<Tag>,
    pub tags_lost_net_structured: Vec<Tag>,
    pub roles_gained_net: Vec<String>,
    pub roles_lost_net: Vec<String>,
}

fn tag_names(scan: &PositionScan) -> HashSet<String> {
    scan.tags.iter().map(|t| t.name.clone()).collect()
}

fn tag_map(scan: &PositionScan) -> BTreeMap<String, Tag> {
    let mut map = BTreeMap::new();
    for tag in &scan.tags {
        // Keep the first occurrence for determinism.
        map.entry(tag.instance_key()).or_insert_with(|| tag.clone());
    }
    map
}

fn role_set(scan: &PositionScan) -> HashSet<String> {
    scan.roles.iter().map(|r| r.key()).collect()
}

fn bump(counts: &mut BTreeMap<String, i32>, opposite: &mut BTreeMap<String, i32>, key: &str) {
    *counts.entry(key.to_string()).or_insert(0) += 1;
    if let Some(count) = opposite.get_mut(key) {
        *count -= 1;
        if *count <= 0 {
            opposite.remove(key);
        }
    }
}

fn live_keys(counts: &BTreeMap<String, i32>) -> Vec<String> {
    counts
        .iter()
        .filter(|(_, c)| **c > 0)
        .map(|(k, _)| k.clone())
        .collect()
}

fn is_clutter(name: &str) -> bool {
    CLUTTER_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Walk `moves_san` from `starting_fen`, diffing the scan before and after
/// every ply. Illegal moves are skipped, not fatal.
pub fn compute_line_deltas(starting_fen: &str, moves_san: &[String]) -> LineDeltas {
    let Some(mut board) = parse_fen(starting_fen) else {
        return LineDeltas::default();
    };

    let before_scan = scan_position(&board);
    let mut before_names = tag_names(&before_scan);
    let mut before_map = tag_map(&before_scan);
    let mut before_roles = role_set(&before_scan);

    let mut out = LineDeltas::default();
    let mut tags_gained_counts: BTreeMap<String, i32> = BTreeMap::new();
    let mut tags_lost_counts: BTreeMap<String, i32> = BTreeMap::new();
    let mut struct_gained_counts: BTreeMap<String, i32> = BTreeMap::new();
    let mut struct_lost_counts: BTreeMap<String, i32> = BTreeMap::new();
    let mut roles_gained_counts: BTreeMap<String, i32> = BTreeMap::new();
    let mut roles_lost_counts: BTreeMap<String, i32> = BTreeMap::new();
    let mut key_to_tag: HashMap<String, Tag> = before_map
        .iter()
        .map(|(k, t)| (k.clone(), t.clone()))
        .collect();

    for (idx, san) in moves_san.iter().enumerate() {
        let Some(m) = parse_san_lenient(&board, san) else {
            debug!(san = %san, ply = idx + 1, "skipping illegal move in delta line");
            continue;
        };
        let fen_before = position_fen(&board);
        board.play_unchecked(m);
        let fen_after = position_fen(&board);

        let after_scan = scan_position(&board);
        let mut after_names = tag_names(&after_scan);
        let mut after_map = tag_map(&after_scan);
        let after_roles = role_set(&after_scan);

        inject_exploited_overworked(&board, &before_map, &mut after_map, &mut after_names);

        let mut tags_gained: Vec<String> = after_names.difference(&before_names).cloned().collect();
        let mut tags_lost: Vec<String> = before_names.difference(&after_names).cloned().collect();
        tags_gained.sort();
        tags_lost.sort();

        let before_keys: HashSet<String> = before_map.keys().cloned().collect();
        let after_keys: HashSet<String> = after_map.keys().cloned().collect();
        let mut gained_keys: Vec<String> = after_keys.difference(&before_keys).cloned().collect();
        let mut lost_keys: Vec<String> = before_keys.difference(&after_keys).cloned().collect();
        gained_keys.sort();
        lost_keys.sort();

        let mut roles_gained: Vec<String> = after_roles.difference(&before_roles).cloned().collect();
        let mut roles_lost: Vec<String> = before_roles.difference(&after_roles).cloned().collect();
        roles_gained.sort();
        roles_lost.sort();

        for key in &gained_keys {
            if let Some(tag) = after_map.get(key) {
                key_to_tag.insert(key.clone(), tag.clone());
            }
            bump(&mut struct_gained_counts, &mut struct_lost_counts, key);
        }
        for key in &lost_keys {
            if let Some(tag) = before_map.get(key) {
                key_to_tag.insert(key.clone(), tag.clone());
            }
            bump(&mut struct_lost_counts, &mut struct_gained_counts, key);
        }
        for name in &tags_gained {
            bump(&mut tags_gained_counts, &mut tags_lost_counts, name);
        }
        for name in &tags_lost {
            bump(&mut tags_lost_counts, &mut tags_gained_counts, name);
        }
        for role in &roles_gained {
            bump(&mut roles_gained_counts, &mut roles_lost_counts, role);
        }
        for role in &roles_lost {
            bump(&mut roles_lost_counts, &mut roles_gained_counts, role);
        }

        out.per_move.push(PerMoveDelta {
            ply: idx + 1,
            move_san: san.clone(),
            fen_before,
            fen_after,
            tags_gained,
            tags_lost,
            tags_gained_structured: gained_keys
                .iter()
                .filter_map(|k| after_map.get(k).cloned())
                .collect(),
            tags_lost_structured: lost_keys
                .iter()
                .filter_map(|k| before_map.get(k).cloned())
                .collect(),
            roles_gained,
            roles_lost,
        });

        before_names = after_names;
        before_map = after_map;
        before_roles = after_roles;
    }

    out.tags_gained_net_structured = struct_gained_counts
        .iter()
        .filter(|(_, c)| **c > 0)
        .filter_map(|(k, _)| key_to_tag.get(k).cloned())
        .collect();
    out.tags_lost_net_structured = struct_lost_counts
        .iter()
        .filter(|(_, c)| **c > 0)
        .filter_map(|(k, _)| key_to_tag.get(k).cloned())
        .collect();

    // Instance-change post-pass: when an instance of a name was lost and a
    // different-square instance of the same name was gained, surface the
    // name on BOTH string lists. Users see the relocation, not a no-op.
    reconcile_instance_changes(
        &out.tags_lost_net_structured,
        &out.tags_gained_net_structured,
        &mut tags_lost_counts,
        &mut tags_gained_counts,
    );
    reconcile_instance_changes(
        &out.tags_gained_net_structured,
        &out.tags_lost_net_structured,
        &mut tags_gained_counts,
        &mut tags_lost_counts,
    );

    out.tags_gained_net_raw = live_keys(&tags_gained_counts);
    out.tags_lost_net_raw = live_keys(&tags_lost_counts);
    out.tags_gained_net = out
        .tags_gained_net_raw
        .iter()
        .filter(|n| !is_clutter(n))
        .cloned()
        .collect();
    out.tags_lost_net = out
        .tags_lost_net_raw
        .iter()
        .filter(|n| !is_clutter(n))
        .cloned()
        .collect();
    out.roles_gained_net = live_keys(&roles_gained_counts);
    out.roles_lost_net = live_keys(&roles_lost_counts);

    out
}

/// The only post-hoc tag injection permitted: when an overworked-defender
/// instance vanishes on this ply, any piece it was recorded as defending
/// that is now attacked with zero defenders becomes an undefended-capture
/// threat on the after-board.
fn inject_exploited_overworked(
    board: &Chess,
    before_map: &BTreeMap<String, Tag>,
    after_map: &mut BTreeMap<String, Tag>,
    after_names: &mut HashSet<String>,
) {
    let after_overworked: HashSet<String> = after_map
        .iter()
        .filter(|(_, t)| t.name.starts_with("tag.piece.overworked."))
        .map(|(k, _)| k.clone())
        .collect();

    for (key, tag) in before_map {
        if !tag.name.starts_with("tag.piece.overworked.") || after_overworked.contains(key) {
            continue;
        }
        for square_name in tag.defended_squares() {
            let Ok(square) = square_name.parse::<shakmaty::Square>() else {
                continue;
            };
            let Some(piece) = board.board().piece_at(square) else {
                continue;
            };
            if crate::board::Side::from(piece.color) != tag.side {
                continue;
            }
            if let Some(threat) = undefended_capture_tag(board, square) {
                let threat_key = threat.instance_key();
                if !after_map.contains_key(&threat_key) {
                    after_names.insert(threat.name.clone());
                    after_map.insert(threat_key, threat);
                }
            }
        }
    }
}

fn reconcile_instance_changes(
    side_a: &[Tag],
    side_b: &[Tag],
    counts_a: &mut BTreeMap<String, i32>,
    counts_b: &mut BTreeMap<String, i32>,
) {
    for tag in side_a {
        let squares_a: HashSet<&String> = tag.squares.iter().collect();
        let changed_instance = side_b.iter().any(|other| {
            other.name == tag.name && other.squares.iter().collect::<HashSet<_>>() != squares_a
        });
        if counts_a.get(&tag.name).copied().unwrap_or(0) <= 0 {
            *counts_a.entry(tag.name.clone()).or_insert(0) += 1;
            // Same-square pairs still cancel; relocations keep both sides.
            if !changed_instance {
                if let Some(count) = counts_b.get_mut(&tag.name) {
                    *count -= 1;
                    if *count <= 0 {
                        counts_b.remove(&tag.name);
                    }
                }
            }
        }
    }
}
