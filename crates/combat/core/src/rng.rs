//! Deterministic random rolls for critical hits.
//!
//! Rolls are a pure function of a seed so a world created with the same seed
//! and fed the same requests resolves every critical strike identically.

/// Random number oracle.
///
/// Implementations must be deterministic: the same seed yields the same value.
pub trait RngOracle: Send + Sync {
    /// Generate a random u32 value from a seed.
    fn next_u32(&self, seed: u64) -> u32;

    /// Uniform value in `[0, 1)`.
    fn unit(&self, seed: u64) -> f64 {
        f64::from(self.next_u32(seed)) / (f64::from(u32::MAX) + 1.0)
    }

    /// Returns true with probability `percent / 100`.
    ///
    /// Percentages at or below zero never succeed; at or above 100 always do.
    fn roll_percent(&self, seed: u64, percent: f64) -> bool {
        if percent <= 0.0 {
            return false;
        }
        if percent >= 100.0 {
            return true;
        }
        self.unit(seed) * 100.0 < percent
    }
}

/// PCG-XSH-RR generator: 64-bit state, 32-bit output.
#[derive(Clone, Copy, Debug, Default)]
pub struct PcgRng;

impl PcgRng {
    const MULTIPLIER: u64 = 6364136223846793005;
    const INCREMENT: u64 = 1442695040888963407;

    #[inline]
    fn step(state: u64) -> u64 {
        state
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::INCREMENT)
    }

    #[inline]
    fn output(state: u64) -> u32 {
        let xorshifted = (((state >> 18) ^ state) >> 27) as u32;
        let rot = (state >> 59) as u32;
        xorshifted.rotate_right(rot)
    }
}

impl RngOracle for PcgRng {
    fn next_u32(&self, seed: u64) -> u32 {
        Self::output(Self::step(seed))
    }
}

/// Mixes the world seed with per-roll context into a roll seed.
///
/// * `world_seed` - seed fixed at world creation
/// * `nonce` - monotonically increasing roll counter
/// * `entity` - entity the roll is made for
/// * `context` - distinguishes independent rolls in one resolution
pub fn compute_seed(world_seed: u64, nonce: u64, entity: u32, context: u32) -> u64 {
    let mut hash = world_seed;
    hash ^= nonce.wrapping_mul(0x9e3779b97f4a7c15);
    hash ^= u64::from(entity).wrapping_mul(0x517cc1b727220a95);
    hash ^= u64::from(context).wrapping_mul(0x85ebca6b);

    // SplitMix64 finalizer
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xff51afd7ed558ccd);
    hash ^= hash >> 33;
    hash
}
