//! Event Bus and Gameplay Events
//!
//! Synchronous, single-threaded fan-out. When [`EventBus::emit`] returns,
//! every interested handler has run - there is no async dispatch and no
//! cross-tick deferral. Handlers are plain functions over the simulation
//! context; the bus owns the `(topic, handler)` registry and nothing else.
//!
//! Because `emit` holds `&mut self`, handler registration during an emission
//! is impossible by construction, which is exactly the contract: a handler
//! registered in response to an event never observes that event.

use serde::Serialize;

use crate::core::hash::Checksum;
use crate::sync::desync::DesyncReport;
use crate::world::entity::{EntityId, PlayerId};
use crate::world::kinds::{BuildingKind, ResearchId, UnitKind};

use super::command::{CommandRejection, GameCommand};
use super::SimCtx;

/// Events flowing through the bus within a tick. Serializable for desync
/// dumps and structured logs; events never cross the wire themselves.
#[derive(Clone, Debug, Serialize)]
pub enum GameEvent {
    /// A validated command, dispatched at its scheduled tick.
    Command(GameCommand),
    /// A command was refused; carries the audit reason.
    SecurityAudit {
        /// Why it was refused.
        rejection: CommandRejection,
        /// Transport-corroborated sender.
        sender: PlayerId,
    },
    /// A unit finished spawning.
    UnitSpawned {
        /// New entity.
        id: EntityId,
        /// Catalog kind.
        kind: UnitKind,
        /// Owner.
        player: PlayerId,
    },
    /// A unit died.
    UnitDied {
        /// Dead entity.
        id: EntityId,
        /// Killing entity, when attributable.
        killer: Option<EntityId>,
    },
    /// A building finished construction.
    BuildingCompleted {
        /// Building entity.
        id: EntityId,
        /// Catalog kind.
        kind: BuildingKind,
        /// Owner.
        player: PlayerId,
    },
    /// A building was destroyed.
    BuildingDestroyed {
        /// Building entity.
        id: EntityId,
    },
    /// A resource node ran dry and was removed.
    ResourceDepleted {
        /// Node entity.
        id: EntityId,
    },
    /// A production queue head completed.
    ProductionCompleted {
        /// Producing building.
        building: EntityId,
        /// Trained unit kind.
        kind: UnitKind,
    },
    /// A research project completed.
    ResearchCompleted {
        /// Researching player.
        player: PlayerId,
        /// Finished project.
        research: ResearchId,
    },
    /// The checksum system produced a digest this tick.
    ChecksumComputed {
        /// Digest tick.
        tick: u32,
        /// 32-bit state checksum.
        checksum: Checksum,
    },
    /// Peers diverged; the match is over.
    Desync(DesyncReport),
    /// The match ended normally.
    MatchEnded {
        /// Winning player, if not a draw.
        winner: Option<PlayerId>,
    },
    /// A system reported a non-fatal failure instead of panicking.
    SystemFailure {
        /// Reporting system.
        system: &'static str,
        /// Human-readable detail.
        detail: String,
    },
}

impl GameEvent {
    /// Topic string handlers subscribe on.
    pub fn topic(&self) -> &'static str {
        match self {
            GameEvent::Command(c) => c.kind.topic(),
            GameEvent::SecurityAudit { rejection, .. } => match rejection {
                CommandRejection::SpoofedPlayerId { .. } => "security:spoofedPlayerId",
                CommandRejection::TickOutOfRange { .. } => "security:tickOutOfRange",
                CommandRejection::OwnershipMismatch { .. } => "security:ownershipMismatch",
                CommandRejection::BadSignature => "security:badSignature",
            },
            GameEvent::UnitSpawned { .. } => "unit:spawned",
            GameEvent::UnitDied { .. } => "unit:died",
            GameEvent::BuildingCompleted { .. } => "building:completed",
            GameEvent::BuildingDestroyed { .. } => "building:destroyed",
            GameEvent::ResourceDepleted { .. } => "resource:depleted",
            GameEvent::ProductionCompleted { .. } => "production:completed",
            GameEvent::ResearchCompleted { .. } => "research:completed",
            GameEvent::ChecksumComputed { .. } => "sync:checksum",
            GameEvent::Desync(_) => "sync:desync",
            GameEvent::MatchEnded { .. } => "match:ended",
            GameEvent::SystemFailure { .. } => "system:failure",
        }
    }
}

/// Handler signature: simulation context plus the event.
pub type Handler = Box<dyn FnMut(&mut SimCtx<'_>, &GameEvent)>;

/// Stable handle for unregistering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandlerId(usize);

struct Registration {
    id: usize,
    topic: &'static str,
    handler: Handler,
    once: bool,
    dead: bool,
}

/// The event bus. See module docs for the dispatch contract.
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<Registration>,
    next_id: usize,
}

impl EventBus {
    /// Empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a topic. `"*"` receives everything.
    pub fn on(
        &mut self,
        topic: &'static str,
        handler: impl FnMut(&mut SimCtx<'_>, &GameEvent) + 'static,
    ) -> HandlerId {
        let id = self.next_id;
        self.next_id += 1;
        self.handlers.push(Registration {
            id,
            topic,
            handler: Box::new(handler),
            once: false,
            dead: false,
        });
        HandlerId(id)
    }

    /// Register a handler that self-removes after its first invocation.
    pub fn once(
        &mut self,
        topic: &'static str,
        handler: impl FnMut(&mut SimCtx<'_>, &GameEvent) + 'static,
    ) -> HandlerId {
        let id = self.on(topic, handler);
        if let Some(reg) = self.handlers.last_mut() {
            reg.once = true;
        }
        id
    }

    /// Unregister by handle. Unknown handles are ignored.
    pub fn off(&mut self, id: HandlerId) {
        if let Some(reg) = self.handlers.iter_mut().find(|r| r.id == id.0) {
            reg.dead = true;
        }
        self.sweep();
    }

    /// Synchronously deliver an event to every live handler registered for
    /// its topic, in registration order.
    pub fn emit(&mut self, ctx: &mut SimCtx<'_>, event: &GameEvent) {
        let topic = event.topic();
        // Snapshot the length: anything appended mid-emission (impossible
        // today, cheap to guarantee anyway) would not see this event.
        let len = self.handlers.len();
        for i in 0..len {
            let reg = &mut self.handlers[i];
            if reg.dead || (reg.topic != "*" && reg.topic != topic) {
                continue;
            }
            (reg.handler)(ctx, event);
            if reg.once {
                reg.dead = true;
            }
        }
        self.sweep();
    }

    /// Number of live handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.iter().filter(|r| !r.dead).count()
    }

    /// Remove every handler. Called at match end so a restarted match never
    /// inherits stale subscriptions.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    fn sweep(&mut self) {
        self.handlers.retain(|r| !r.dead);
    }
}
