//! Desync Detection
//!
//! Reconciles local checksums against digests received from peers. Ticks
//! whose digests agree advance the comparison cursor and are retired; the
//! first disagreement is terminal - the detector descends the Merkle tree
//! to localize the divergence, produces a structured report, and the match
//! ends. There is no rollback and no re-sync handshake: a diverged
//! simulation never realigns.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::core::hash::Checksum;
use crate::world::entity::PlayerId;

use super::merkle::{
    locate_divergence, locate_divergence_compact, CompactMerkle, Divergence, MerkleTree,
};

/// Why the match desynchronized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesyncReason {
    /// Local and remote checksums disagree for the same tick.
    ChecksumMismatch,
    /// A command arrived for a tick that already executed.
    StaleCommands,
}

/// The terminal report surfaced to the UI and embedded in desync dumps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesyncReport {
    /// Tick at which divergence was established.
    pub tick: u32,
    /// Reason.
    pub reason: DesyncReason,
    /// Local digest for that tick (0 for stale-command desyncs).
    pub local_checksum: Checksum,
    /// Remote digest for that tick.
    pub remote_checksum: Checksum,
    /// Peer whose digest disagreed.
    pub peer: Option<PlayerId>,
    /// Path of the first divergent Merkle branch.
    pub divergent_path: Vec<String>,
    /// Divergent entity ids, when full-tree comparison was possible.
    pub divergent_entities: Vec<u32>,
}

impl DesyncReport {
    /// Report for a stale-command failure (no digests involved).
    pub fn stale_commands(tick: u32, command_tick: u32) -> Self {
        Self {
            tick,
            reason: DesyncReason::StaleCommands,
            local_checksum: 0,
            remote_checksum: 0,
            peer: None,
            divergent_path: vec![format!("command_tick:{}", command_tick)],
            divergent_entities: Vec::new(),
        }
    }
}

/// A peer's digest for one tick, as received off the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDigest {
    /// Digest tick.
    pub tick: u32,
    /// Scalar checksum.
    pub checksum: Checksum,
    /// Sending peer.
    pub peer: PlayerId,
    /// Optional compact tree for localization.
    pub merkle: Option<CompactMerkle>,
}

/// Detector lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorState {
    /// Comparing normally.
    Active,
    /// Transport trouble; comparison suspended, ticks should not advance.
    Paused,
    /// Divergence established; terminal.
    Desynced,
}

/// Local digest bookkeeping plus peer reconciliation.
pub struct DesyncDetector {
    state: DetectorState,
    /// Local digests by tick, with the full tree kept for localization.
    local: BTreeMap<u32, (Checksum, MerkleTree)>,
    /// Remote digests that arrived before their local counterpart.
    pending_remote: Vec<RemoteDigest>,
    /// Highest tick whose digests agreed.
    agreed_tick: Option<u32>,
}

impl DesyncDetector {
    /// Fresh detector.
    pub fn new() -> Self {
        Self {
            state: DetectorState::Active,
            local: BTreeMap::new(),
            pending_remote: Vec::new(),
            agreed_tick: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Highest tick with confirmed agreement.
    pub fn agreed_tick(&self) -> Option<u32> {
        self.agreed_tick
    }

    /// Suspend comparison (transport error). Ticks must not advance while
    /// paused; reconciliation resumes when the transport recovers.
    pub fn pause(&mut self) {
        if self.state == DetectorState::Active {
            warn!("desync detector paused");
            self.state = DetectorState::Paused;
        }
    }

    /// Resume after transport recovery.
    pub fn resume(&mut self) {
        if self.state == DetectorState::Paused {
            self.state = DetectorState::Active;
        }
    }

    /// Record the local digest for a tick.
    pub fn record_local(&mut self, tick: u32, checksum: Checksum, tree: MerkleTree) {
        self.local.insert(tick, (checksum, tree));
    }

    /// Record a peer digest and reconcile. Returns a report on divergence.
    pub fn record_remote(&mut self, digest: RemoteDigest) -> Option<DesyncReport> {
        if self.state == DetectorState::Desynced {
            return None;
        }
        self.pending_remote.push(digest);
        self.reconcile()
    }

    /// Compare every pending remote digest that has a local counterpart.
    fn reconcile(&mut self) -> Option<DesyncReport> {
        if self.state != DetectorState::Active {
            return None;
        }

        let mut still_pending = Vec::new();
        let mut report = None;

        for remote in std::mem::take(&mut self.pending_remote) {
            if report.is_some() {
                still_pending.push(remote);
                continue;
            }
            let Some((local_checksum, local_tree)) = self.local.get(&remote.tick) else {
                still_pending.push(remote);
                continue;
            };

            if *local_checksum == remote.checksum {
                self.agreed_tick = Some(
                    self.agreed_tick
                        .map_or(remote.tick, |t| t.max(remote.tick)),
                );
                continue;
            }

            error!(
                tick = remote.tick,
                local = format_args!("{:08x}", local_checksum),
                remote = format_args!("{:08x}", remote.checksum),
                peer = %remote.peer,
                "checksum mismatch"
            );

            let divergence = match &remote.merkle {
                Some(compact) => locate_divergence_compact(local_tree, compact),
                None => None,
            }
            .unwrap_or_else(|| Divergence {
                path: vec!["root".to_string()],
                entities: Vec::new(),
                comparisons: 1,
            });

            report = Some(DesyncReport {
                tick: remote.tick,
                reason: DesyncReason::ChecksumMismatch,
                local_checksum: *local_checksum,
                remote_checksum: remote.checksum,
                peer: Some(remote.peer),
                divergent_path: divergence.path,
                divergent_entities: divergence.entities,
            });
        }

        self.pending_remote = still_pending;

        if report.is_some() {
            self.state = DetectorState::Desynced;
        } else {
            // Retire local digests at or below the agreement cursor; they
            // can never be questioned again.
            if let Some(agreed) = self.agreed_tick {
                self.local.retain(|&t, _| t > agreed);
            }
        }
        report
    }

    /// Full-tree localization against a remote tree obtained out-of-band
    /// (desync dump exchange). Sharpens a report to entity granularity.
    pub fn localize_with_remote_tree(
        &self,
        tick: u32,
        remote_tree: &MerkleTree,
    ) -> Option<Divergence> {
        let (_, local_tree) = self.local.get(&tick)?;
        locate_divergence(local_tree, remote_tree)
    }

    /// Number of local digests awaiting confirmation.
    pub fn unconfirmed(&self) -> usize {
        self.local.len()
    }
}

impl Default for DesyncDetector {
    fn default() -> Self {
        Self::new()
    }
}
