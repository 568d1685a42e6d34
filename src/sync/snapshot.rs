//! Snapshots
//!
//! Versioned, serializable captures of the quantized world: the ground
//! truth for desync forensics, emitted on request and automatically when a
//! desync is detected. A snapshot carries the per-entity records, the
//! per-player economies and the tail of recent command history, plus an
//! integrity digest over the encoded payload.
//!
//! The wall-clock timestamp is telemetry only - it never participates in
//! any hash.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::hash::{snapshot_digest, Checksum, Digest256};
use crate::game::command::{CommandQueue, GameCommand};
use crate::world::{MatchOutcome, PlayerEconomy, World};

use super::checksum::{walk_records, world_checksum, EntityRecord};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Ticks of command history embedded in a snapshot.
pub const COMMAND_TAIL_TICKS: u32 = 10;

/// Snapshot failures.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Unknown or future format version.
    #[error("unsupported snapshot version {0}")]
    BadVersion(u32),
    /// Binary decode failure.
    #[error("snapshot decode failed: {0}")]
    Decode(#[from] bincode::Error),
    /// JSON encode failure.
    #[error("snapshot json encode failed: {0}")]
    Json(#[from] serde_json::Error),
    /// Payload digest does not match the recorded digest.
    #[error("snapshot integrity digest mismatch")]
    DigestMismatch,
}

/// A full quantized state capture.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version.
    pub version: u32,
    /// Unique capture id (telemetry/correlation only, never hashed).
    pub capture_id: uuid::Uuid,
    /// Capture tick.
    pub tick: u32,
    /// Wall-clock capture time (telemetry only, never hashed).
    pub timestamp: DateTime<Utc>,
    /// World checksum at capture.
    pub checksum: Checksum,
    /// Match RNG seed.
    pub base_seed: u64,
    /// Final result, when the match has ended.
    pub outcome: Option<MatchOutcome>,
    /// Per-player economies, keyed by slot.
    pub economies: BTreeMap<u8, PlayerEconomy>,
    /// Per-entity quantized records, ascending id order.
    pub entities: Vec<EntityRecord>,
    /// Commands scheduled in the trailing window.
    pub command_tail: Vec<GameCommand>,
}

/// Snapshot plus its integrity digest, as written to disk/wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealedSnapshot {
    /// The capture.
    pub snapshot: Snapshot,
    /// SHA-256 over the bincode-encoded capture.
    pub digest: Digest256,
}

impl Snapshot {
    /// Capture the current world and the recent command tail.
    pub fn capture(world: &World, queue: &CommandQueue) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            capture_id: uuid::Uuid::new_v4(),
            tick: world.tick,
            timestamp: Utc::now(),
            checksum: world_checksum(world),
            base_seed: world.base_seed,
            outcome: world.outcome,
            economies: world
                .players
                .iter()
                .map(|(p, e)| (p.0, e.clone()))
                .collect(),
            entities: walk_records(world),
            command_tail: queue.history_tail(world.tick, COMMAND_TAIL_TICKS),
        }
    }

    /// Recompute the checksum from the embedded records plus header state.
    ///
    /// Equal to `checksum` by construction; serialization round-trips must
    /// preserve that equality.
    pub fn recompute_checksum(&self) -> Checksum {
        use crate::core::hash::ChecksumHasher;
        let mut h = ChecksumHasher::new();
        h.write_u32(self.tick);
        h.write_u64(self.base_seed);
        for (player, economy) in &self.economies {
            h.write_u8(*player);
            h.write_u32(economy.minerals);
            h.write_u32(economy.vespene);
            h.write_u32(economy.supply_used as u32);
            h.write_u32(economy.supply_cap as u32);
            h.write_u32(economy.research.len() as u32);
        }
        h.write_bool(self.outcome.is_some());
        if let Some(outcome) = self.outcome {
            h.write_u8(outcome.winner.map(|p| p.0).unwrap_or(u8::MAX));
        }
        for record in &self.entities {
            h.write_u32(record.checksum());
        }
        h.finish()
    }

    /// Seal with an integrity digest.
    pub fn seal(self) -> Result<SealedSnapshot, SnapshotError> {
        let encoded = bincode::serialize(&self)?;
        Ok(SealedSnapshot {
            digest: snapshot_digest(&encoded),
            snapshot: self,
        })
    }
}

impl SealedSnapshot {
    /// Binary encoding for disk/wire.
    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode and verify version and integrity digest.
    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let sealed: SealedSnapshot = bincode::deserialize(bytes)?;
        if sealed.snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::BadVersion(sealed.snapshot.version));
        }
        let payload = bincode::serialize(&sealed.snapshot)?;
        if snapshot_digest(&payload) != sealed.digest {
            return Err(SnapshotError::DigestMismatch);
        }
        Ok(sealed)
    }

    /// Human-readable JSON for debugging dumps.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
