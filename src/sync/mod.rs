//! State Verification
//!
//! The canonical checksum walk, the Merkle tree built over the same
//! quantized records, the desync detector that reconciles peer digests,
//! and snapshot capture for after-the-fact analysis.

pub mod checksum;
pub mod desync;
pub mod merkle;
pub mod snapshot;
