//! State Hashing
//!
//! Two hash layers with different jobs:
//!
//! - [`ChecksumHasher`]: the cheap 32-bit fold exchanged between peers every
//!   checksum interval, and the combiner for Merkle tree nodes. Boost-style
//!   `h ^= v + 0x9e3779b9 + (h << 6) + (h >> 2)` - deterministic, stable
//!   across builds, fast enough to walk every entity every few ticks.
//! - SHA-256 helpers: snapshot integrity digests and seed derivation, where
//!   collision resistance matters and cost does not.
//!
//! Update order is part of the hash definition. Callers walk state in
//! canonical (ascending id) order and quantize every value first; an
//! unquantized float must never reach these functions.

use sha2::{Digest, Sha256};

use super::fixed::{quantize_amount, quantize_pos, Fixed};
use super::vec2::FixedVec2;

/// 32-bit state checksum exchanged between peers.
pub type Checksum = u32;

/// 256-bit digest for snapshots and seeds.
pub type Digest256 = [u8; 32];

/// Golden-ratio constant for the fold combiner.
pub const HASH_COMBINE_CONST: u32 = 0x9e37_79b9;

/// Fold one value into a running checksum.
#[inline]
pub fn combine(h: Checksum, v: u32) -> Checksum {
    h ^ v
        .wrapping_add(HASH_COMBINE_CONST)
        .wrapping_add(h << 6)
        .wrapping_add(h >> 2)
}

/// Incremental 32-bit checksum over canonical state walks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChecksumHasher {
    h: Checksum,
}

impl ChecksumHasher {
    /// Start a fresh checksum.
    pub fn new() -> Self {
        Self { h: 0 }
    }

    /// Start from an existing value (Merkle node folding).
    pub fn seeded(h: Checksum) -> Self {
        Self { h }
    }

    /// Fold a raw u32.
    #[inline]
    pub fn write_u32(&mut self, v: u32) {
        self.h = combine(self.h, v);
    }

    /// Fold an i32 (bit pattern, not value-mapped).
    #[inline]
    pub fn write_i32(&mut self, v: i32) {
        self.write_u32(v as u32);
    }

    /// Fold a u64 as two words, low first.
    #[inline]
    pub fn write_u64(&mut self, v: u64) {
        self.write_u32(v as u32);
        self.write_u32((v >> 32) as u32);
    }

    /// Fold a u8.
    #[inline]
    pub fn write_u8(&mut self, v: u8) {
        self.write_u32(v as u32);
    }

    /// Fold a bool.
    #[inline]
    pub fn write_bool(&mut self, v: bool) {
        self.write_u32(v as u32);
    }

    /// Fold a position coordinate, quantized.
    #[inline]
    pub fn write_pos(&mut self, v: Fixed) {
        self.write_i32(quantize_pos(v));
    }

    /// Fold a position vector, quantized, x then y.
    #[inline]
    pub fn write_vec2(&mut self, v: FixedVec2) {
        self.write_pos(v.x);
        self.write_pos(v.y);
    }

    /// Fold a health/damage/amount value, quantized.
    #[inline]
    pub fn write_amount(&mut self, v: Fixed) {
        self.write_i32(quantize_amount(v));
    }

    /// Final checksum.
    #[inline]
    pub fn finish(self) -> Checksum {
        self.h
    }
}

/// Fold a sorted list of child hashes into a parent hash.
///
/// Callers must sort children first; the fold is order-sensitive by design.
pub fn fold_children(children: &[Checksum]) -> Checksum {
    let mut h = ChecksumHasher::new();
    for c in children {
        h.write_u32(*c);
    }
    h.finish()
}

// =============================================================================
// SHA-256 DIGESTS (snapshots, never per-tick)
// =============================================================================

/// Hash bytes with a domain separator.
pub fn digest_with_domain(domain: &[u8], data: &[u8]) -> Digest256 {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

/// Integrity digest over an encoded snapshot.
pub fn snapshot_digest(encoded: &[u8]) -> Digest256 {
    digest_with_domain(b"ASHFALL_SNAPSHOT_V1", encoded)
}

// =============================================================================
// TESTS
// =============================================================================
