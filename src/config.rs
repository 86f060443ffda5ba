// src/config.rs

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BRANCH_DEPTH_LIMIT, DEFAULT_DEPTH_DEEP, DEFAULT_DEPTH_SHALLOW,
    DEFAULT_EVIDENCE_PLIES_BASE, DEFAULT_EVIDENCE_PLIES_MAX, DEFAULT_PV_MAX_PLIES,
    LEAF_CACHE_SIZE, RESULT_CACHE_SIZE,
};

const PROFILES_DIR: &str = "profiles";

/// Tunables for one investigation pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvestigatorConfig {
    pub depth_deep: u32,
    pub depth_shallow: u32,
    pub evidence_plies_base: usize,
    pub evidence_plies_max: usize,
    /// `None` means unbounded; `Some(0)` disables branching entirely.
    pub branching_limit: Option<usize>,
    pub branch_depth_limit: u32,
    pub pv_max_plies: usize,
    /// 0 means unbounded.
    pub pgn_max_chars: usize,
    pub leaf_cache_size: usize,
    pub result_cache_size: usize,
}

impl Default for InvestigatorConfig {
    fn default() -> Self {
        Self {
            depth_deep: DEFAULT_DEPTH_DEEP,
            depth_shallow: DEFAULT_DEPTH_SHALLOW,
            evidence_plies_base: DEFAULT_EVIDENCE_PLIES_BASE,
            evidence_plies_max: DEFAULT_EVIDENCE_PLIES_MAX,
            branching_limit: None,
            branch_depth_limit: DEFAULT_BRANCH_DEPTH_LIMIT,
            pv_max_plies: DEFAULT_PV_MAX_PLIES,
            pgn_max_chars: 0,
            leaf_cache_size: LEAF_CACHE_SIZE,
            result_cache_size: RESULT_CACHE_SIZE,
        }
    }
}

impl InvestigatorConfig {
    /// Variant tag for the result cache; two investigations with different
    /// depth or evidence settings must never collide.
    pub fn variant_tag(&self) -> String {
        format!(
            "d16{}|d2{}|ev{}-{}",
            self.depth_deep, self.depth_shallow, self.evidence_plies_base, self.evidence_plies_max
        )
    }
}

pub fn save_profile(name: &str, config: &InvestigatorConfig) -> io::Result<()> {
    fs::create_dir_all(PROFILES_DIR)?;
    let path = Path::new(PROFILES_DIR).join(format!("{}.json", name));
    let json = serde_json::to_string_pretty(config)?;
    fs::File::create(path)?.write_all(json.as_bytes())
}

pub fn load_profile(name: &str) -> io::Result<InvestigatorConfig> {
    let path = Path::new(PROFILES_DIR).join(format!("{}.json", name));
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(io::Error::from)
}

pub fn get_profiles() -> io::Result<Vec<String>> {
    let mut profiles = Vec::new();
    for entry in fs::read_dir(PROFILES_DIR)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() {
            if let Some(stem) = path.file_stem() {
                if let Some(name) = stem.to_str() {
                    profiles.push(name.to_string());
                }
            }
        }
    }
    Ok(profiles)
}
