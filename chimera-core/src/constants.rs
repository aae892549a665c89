//! Constants for Chimera generation
//!
//! Defaults for every tunable value live here; configuration structs fall
//! back to these when the corresponding environment variable is unset.

// ============================================================================
// WAITING ON IN-FLIGHT GENERATIONS
// ============================================================================

/// Interval between ledger status polls while waiting (1 second)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Poll attempts before a waiter gives up (30 x 1s = 30s ceiling)
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 30;

// ============================================================================
// LEDGER SWEEP
// ============================================================================

/// Non-terminal records older than this are reclaimed (1 hour)
pub const DEFAULT_STALE_AFTER_SECS: u64 = 3600;

/// How often the sweep runs (1 minute)
pub const DEFAULT_SWEEP_CHECK_INTERVAL_SECS: u64 = 60;

// ============================================================================
// CACHE LIFETIMES
// ============================================================================

/// Active style bundle cache lifetime (5 minutes)
pub const DEFAULT_STYLE_CACHE_TTL_SECS: u64 = 300;

/// Generated image lifetime (30 days)
pub const DEFAULT_IMAGE_TTL_SECS: u64 = 30 * 24 * 3600;

/// Generated text lifetime (7 days)
pub const DEFAULT_TEXT_TTL_SECS: u64 = 7 * 24 * 3600;

// ============================================================================
// REQUEST LIMITS
// ============================================================================

/// Largest accepted image edge in pixels
pub const MAX_IMAGE_DIMENSION: u32 = 2048;

/// Characters of prompt kept in fallback events
pub const PROMPT_PREVIEW_CHARS: usize = 200;
