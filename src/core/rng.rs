//! Deterministic Random Number Generator
//!
//! Xorshift128+ with SplitMix64 seeding. Given the same seed the sequence is
//! identical on every platform, which is all lockstep needs.
//!
//! Gameplay code never constructs an RNG from wall-clock entropy. AI systems
//! reseed from the current tick via [`DeterministicRng::for_tick`], so a
//! stochastic choice made on tick N is the same choice on every peer.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::fixed::Fixed;

/// Multiplier for per-tick reseeding (golden-ratio constant).
const TICK_SEED_MUL: u64 = 0x9E3779B97F4A7C15;

/// Deterministic PRNG using Xorshift128+.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// SplitMix64 expands the seed so weak seeds (0, 1, 2...) still produce
    /// well-distributed state: one mixing round per state word.
    pub fn new(seed: u64) -> Self {
        let mut rng = Self { state: [0; 2] };
        let mut counter = seed;
        for word in rng.state.iter_mut() {
            counter = counter.wrapping_add(TICK_SEED_MUL);
            let mut z = counter;
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
            *word = z ^ (z >> 31);
        }
        // Xorshift state must never be all zeros.
        if rng.state == [0; 2] {
            rng.state[1] = TICK_SEED_MUL;
        }
        rng
    }

    /// RNG for one tick's stochastic decisions: `base ^ (tick * K + offset)`.
    ///
    /// Each (system, tick) pair gets an independent stream via `offset`, and
    /// every peer derives the identical stream.
    pub fn for_tick(base_seed: u64, tick: u32, offset: u64) -> Self {
        let mixed = base_seed ^ (tick as u64).wrapping_mul(TICK_SEED_MUL).wrapping_add(offset);
        Self::new(mixed)
    }

    /// Next 64-bit value (xorshift128+ step).
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let [a, b] = self.state;
        let mut t = a;
        t ^= t << 23;
        t ^= t >> 17;
        t ^= b ^ (b >> 26);
        self.state = [b, t];
        t.wrapping_add(b)
    }

    /// Next u32.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    /// Random integer in `[0, max)`. `max == 0` returns 0.
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        (self.next_u64() % max as u64) as u32
    }

    /// Random integer in `[min, max]`.
    #[inline]
    pub fn next_int_range(&mut self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        let range = (max - min + 1) as u32;
        min + self.next_int(range) as i32
    }

    /// Random Fixed in `[0, max)`.
    #[inline]
    pub fn next_fixed(&mut self, max: Fixed) -> Fixed {
        if max <= 0 {
            return 0;
        }
        let raw = (self.next_u64() >> 32) as u32;
        ((raw as i64 * max as i64) >> 32) as Fixed
    }

    /// Random cell coordinate on a `width × height` grid.
    #[inline]
    pub fn next_cell(&mut self, width: u32, height: u32) -> (i32, i32) {
        let x = self.next_int(width) as i32;
        let y = self.next_int(height) as i32;
        (x, y)
    }

    /// Random boolean with probability `num / denom`.
    #[inline]
    pub fn chance(&mut self, num: u32, denom: u32) -> bool {
        if denom == 0 {
            return false;
        }
        self.next_int(denom) < num
    }

    /// Select a random element from a slice.
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let idx = self.next_int(slice.len() as u32) as usize;
            Some(&slice[idx])
        }
    }

    /// Fisher-Yates shuffle in place.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        let len = slice.len();
        for i in (1..len).rev() {
            let j = self.next_int((i + 1) as u32) as usize;
            slice.swap(i, j);
        }
    }

    /// Current state, for snapshot/restore.
    pub fn state(&self) -> [u64; 2] {
        self.state
    }

    /// Restore a saved state.
    pub fn set_state(&mut self, state: [u64; 2]) {
        self.state = state;
    }
}

/// Derive a match seed from the blueprint id and the sorted player slots.
///
/// Both peers must feed identical parameters; the SHA-256 fold means nobody
/// can steer the seed by picking a pathological map name.
pub fn derive_match_seed(blueprint_id: &str, player_slots: &[u8]) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(b"ASHFALL_SEED_V1");
    hasher.update(blueprint_id.as_bytes());
    for slot in player_slots {
        hasher.update([*slot]);
    }
    let hash = hasher.finalize();
    u64::from_le_bytes(hash[0..8].try_into().unwrap())
}

// =============================================================================
// TESTS
// =============================================================================
