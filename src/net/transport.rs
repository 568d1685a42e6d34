//! Transport Port
//!
//! The one channel through which external data enters the simulation. The
//! core depends only on this abstract port - send a message, register a
//! handler, unregister a handler - and any reliable, ordered,
//! exactly-once channel (in-process bus, WebRTC data channel, TCP stream)
//! satisfies it.
//!
//! Inbound messages are queued by the transport and delivered to handlers
//! from [`Transport::pump`], which the simulation thread calls between
//! ticks. Nothing is ever delivered re-entrantly mid-tick.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::core::hash::Checksum;
use crate::game::command::GameCommand;
use crate::sync::merkle::CompactMerkle;
use crate::world::entity::PlayerId;

/// A command on the wire, with its optional signature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// The command.
    pub payload: GameCommand,
    /// Base64 signature over the canonical JSON form (signed matches).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Compatibility form some older peers emit: `{ commandType, data }`.
/// Accepted on receive, never emitted.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyCommandEnvelope {
    /// Legacy type tag (matches the command's bus topic suffix).
    pub command_type: String,
    /// The command record.
    pub data: GameCommand,
}

/// Per-tick digest exchanged between peers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChecksumMessage {
    /// Digest tick.
    pub tick: u32,
    /// 32-bit world checksum.
    pub checksum: Checksum,
    /// Unit count (coarse cross-check shown in desync logs).
    pub unit_count: u32,
    /// Building count.
    pub building_count: u32,
    /// Sum of remaining resource amounts.
    pub resource_sum: u64,
    /// Sending peer.
    pub peer_id: PlayerId,
    /// Optional compact Merkle digest for localization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merkle: Option<CompactMerkle>,
}

/// Everything that crosses the port.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// A scheduled command.
    Command(CommandEnvelope),
    /// A legacy-form command (compatibility only).
    LegacyCommand(LegacyCommandEnvelope),
    /// A state digest.
    Checksum(ChecksumMessage),
    /// A peer is leaving.
    Quit {
        /// Leaving player.
        player_id: PlayerId,
    },
}

impl WireMessage {
    /// Extract the command from either envelope form.
    pub fn as_command(&self) -> Option<(&GameCommand, Option<&str>)> {
        match self {
            WireMessage::Command(env) => Some((&env.payload, env.signature.as_deref())),
            WireMessage::LegacyCommand(env) => Some((&env.data, None)),
            _ => None,
        }
    }
}

/// Transport failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer channel is gone.
    #[error("transport channel closed")]
    Closed,
    /// Wire encoding failed.
    #[error("wire encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Inbound message handler: corroborated sender plus the message.
pub type MessageHandler = Box<dyn FnMut(PlayerId, &WireMessage)>;

/// Opaque handler registration token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandlerToken(usize);

/// The abstract port.
pub trait Transport {
    /// Send a message to all remote peers. Reliable, ordered, exactly once.
    fn send(&mut self, message: &WireMessage) -> Result<(), TransportError>;

    /// Register an inbound handler.
    fn register_handler(&mut self, handler: MessageHandler) -> HandlerToken;

    /// Unregister a handler. Unknown tokens are ignored.
    fn unregister_handler(&mut self, token: HandlerToken);

    /// Deliver queued inbound messages to registered handlers. Called from
    /// the simulation thread between ticks.
    fn pump(&mut self) -> Result<(), TransportError>;
}

// =============================================================================
// LOOPBACK TRANSPORT
// =============================================================================

/// In-process transport pair. Messages are serialized to JSON on send and
/// parsed on receipt, so the loopback path exercises the same wire format a
/// network transport would.
pub struct LoopbackTransport {
    remote_peer: PlayerId,
    outbound: Sender<String>,
    inbound: Receiver<String>,
    handlers: Vec<(usize, MessageHandler)>,
    next_token: usize,
    queue: VecDeque<WireMessage>,
}

impl LoopbackTransport {
    /// Connected pair: what one side sends, the other receives. Each side
    /// is told the identity of its remote peer; that identity is the
    /// anti-spoof corroboration for everything it delivers.
    pub fn pair(peer_a: PlayerId, peer_b: PlayerId) -> (Self, Self) {
        let (tx_ab, rx_ab) = mpsc::channel();
        let (tx_ba, rx_ba) = mpsc::channel();
        (
            Self {
                remote_peer: peer_b,
                outbound: tx_ab,
                inbound: rx_ba,
                handlers: Vec::new(),
                next_token: 0,
                queue: VecDeque::new(),
            },
            Self {
                remote_peer: peer_a,
                outbound: tx_ba,
                inbound: rx_ab,
                handlers: Vec::new(),
                next_token: 0,
                queue: VecDeque::new(),
            },
        )
    }

    /// Identity of the peer on the other end.
    pub fn remote_peer(&self) -> PlayerId {
        self.remote_peer
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, message: &WireMessage) -> Result<(), TransportError> {
        let encoded = serde_json::to_string(message)?;
        self.outbound.send(encoded).map_err(|_| TransportError::Closed)
    }

    fn register_handler(&mut self, handler: MessageHandler) -> HandlerToken {
        let token = self.next_token;
        self.next_token += 1;
        self.handlers.push((token, handler));
        HandlerToken(token)
    }

    fn unregister_handler(&mut self, token: HandlerToken) {
        self.handlers.retain(|(t, _)| *t != token.0);
    }

    fn pump(&mut self) -> Result<(), TransportError> {
        // Drain the channel first so handler dispatch order matches arrival
        // order even if a handler sends replies.
        loop {
            match self.inbound.try_recv() {
                Ok(encoded) => match serde_json::from_str::<WireMessage>(&encoded) {
                    Ok(message) => self.queue.push_back(message),
                    Err(err) => warn!(%err, "dropping malformed wire message"),
                },
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    if self.queue.is_empty() {
                        return Err(TransportError::Closed);
                    }
                    break;
                }
            }
        }

        while let Some(message) = self.queue.pop_front() {
            for (_, handler) in &mut self.handlers {
                handler(self.remote_peer, &message);
            }
        }
        Ok(())
    }
}
