//! Seed drawing for job requests.
//!
//! Every request gets a fresh seed so the engine never answers a new
//! prompt from its execution cache.

use rand::Rng;

/// Largest seed drawn (inclusive).
pub const MAX_SEED: u64 = 1_000_000_000_000_000_000;

/// Draw a uniformly random seed in `[0, MAX_SEED]`.
pub fn random_seed() -> u64 {
    rand::rng().random_range(0..=MAX_SEED)
}
