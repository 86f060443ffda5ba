// Eval frame: centipawns, White's point of view.
pub const MATE_SCORE_CP: i32 = 10_000;

// A node is critical when the deep best and second-best moves differ by
// more than this many centipawns.
pub const CRITICAL_GAP_CP: i32 = 50;

// Threat analysis
pub const THREAT_SIGNIFICANCE_CP: i32 = 60;

// Dual-depth defaults
pub const DEFAULT_DEPTH_DEEP: u32 = 16;
pub const DEFAULT_DEPTH_SHALLOW: u32 = 2;
pub const DEFAULT_BRANCH_DEPTH_LIMIT: u32 = 5;
pub const DEFAULT_PV_MAX_PLIES: usize = 32;

// How many shallow candidate moves to request when hunting for
// overestimated moves.
pub const SHALLOW_MULTIPV: u32 = 5;

// Evidence line
pub const DEFAULT_EVIDENCE_PLIES_BASE: usize = 4;
pub const DEFAULT_EVIDENCE_PLIES_MAX: usize = 8;
pub const EVIDENCE_END_EVAL_DEPTH: u32 = 6;
pub const EVIDENCE_STATS_MAX_PLIES: usize = 16;

// Mid-PV sub-exploration is kept shallow on purpose.
pub const PV_BRANCH_LIMIT: usize = 2;
pub const PV_BRANCH_DEPTH_LIMIT: u32 = 2;

// Caches
pub const LEAF_CACHE_SIZE: usize = 1024;
pub const RESULT_CACHE_SIZE: usize = 512;

// Target search
pub const TARGET_NODE_LIMIT: usize = 5000;

// --- Piece values (pawn units x100) ---
pub const PAWN_VALUE: i32 = 100;
pub const KNIGHT_VALUE: i32 = 300;
pub const BISHOP_VALUE: i32 = 300;
pub const ROOK_VALUE: i32 = 500;
pub const QUEEN_VALUE: i32 = 900;

// Constants for game phase calculation
pub const QUEEN_PHASE_VAL: i32 = 4;
pub const ROOK_PHASE_VAL: i32 = 2;
pub const BISHOP_PHASE_VAL: i32 = 1;
pub const KNIGHT_PHASE_VAL: i32 = 1;
pub const TOTAL_PHASE: i32 =
    (QUEEN_PHASE_VAL * 2) + (ROOK_PHASE_VAL * 4) + (BISHOP_PHASE_VAL * 4) + (KNIGHT_PHASE_VAL * 4);

// Claim binding
pub const CLAIM_EVIDENCE_MAX_PLIES: usize = 4;
pub const CONSEQUENCE_EVIDENCE_MAX_PLIES: usize = 6;
