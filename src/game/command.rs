//! Lockstep Command Queue
//!
//! Every player order is stamped for a future tick, transmitted to peers,
//! and executed by all peers on that tick in a deterministic sort order:
//! issuing player first, then command type tag, then first referenced
//! entity id. Nothing else may influence dispatch order.
//!
//! Inbound commands are authorized against the world before they reach the
//! bucket: sender identity, tick window, and ownership of every referenced
//! entity. A command that arrives for a tick already executed is not a
//! routine drop - it means lockstep has failed, and the caller must raise a
//! desync.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::vec2::FixedVec2;
use crate::world::entity::{EntityId, PlayerId};
use crate::world::kinds::{AbilityId, BuildingKind, ResearchId, UnitKind};
use crate::world::World;

/// How far in the future a command tick may be scheduled, in ticks.
pub const MAX_FUTURE_TICKS: u32 = 100;

/// Attack order target: a specific entity or a ground point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackTarget {
    /// Chase and engage one entity.
    Entity(EntityId),
    /// Attack-move toward a point.
    Ground(FixedVec2),
}

/// Command payload variants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandKind {
    /// Move units to a point.
    Move {
        /// Ordered unit set.
        units: Vec<EntityId>,
        /// Destination.
        target: FixedVec2,
    },
    /// Attack an entity or attack-move to a point.
    Attack {
        /// Ordered unit set.
        units: Vec<EntityId>,
        /// Target.
        target: AttackTarget,
    },
    /// Halt and clear orders.
    Stop {
        /// Ordered unit set.
        units: Vec<EntityId>,
    },
    /// Patrol between current position and a point.
    Patrol {
        /// Ordered unit set.
        units: Vec<EntityId>,
        /// Far end of the patrol leg.
        target: FixedVec2,
    },
    /// Send workers to gather a resource node.
    Gather {
        /// Worker set.
        units: Vec<EntityId>,
        /// Mineral patch or extractor geyser.
        resource: EntityId,
    },
    /// Start construction at a footprint cell.
    Build {
        /// Constructing worker.
        worker: EntityId,
        /// What to build.
        building: BuildingKind,
        /// Footprint origin cell.
        cell: (i32, i32),
    },
    /// Set a production rally point.
    Rally {
        /// Producing building.
        building: EntityId,
        /// Rally target.
        target: FixedVec2,
    },
    /// Lift a building off its footprint.
    LiftOff {
        /// Building to lift.
        building: EntityId,
    },
    /// Land a flying building on a new footprint.
    Land {
        /// Flying building.
        building: EntityId,
        /// Footprint origin cell.
        cell: (i32, i32),
    },
    /// Enqueue unit production.
    Train {
        /// Producing building.
        building: EntityId,
        /// Unit to train.
        unit: UnitKind,
    },
    /// Remove a production queue entry (resources refunded).
    CancelProduction {
        /// Producing building.
        building: EntityId,
        /// Queue index to remove.
        index: u8,
    },
    /// Move a production queue entry to a new slot.
    ReorderProduction {
        /// Producing building.
        building: EntityId,
        /// Source index.
        from: u8,
        /// Destination index.
        to: u8,
    },
    /// Toggle a building's auto-engage behavior.
    ToggleAutocast {
        /// Building to toggle.
        building: EntityId,
    },
    /// Start a research project.
    Research {
        /// Researching building (forge).
        building: EntityId,
        /// Project.
        research: ResearchId,
    },
    /// Trigger a unit ability.
    UseAbility {
        /// Casting unit.
        unit: EntityId,
        /// Ability.
        ability: AbilityId,
        /// Ground target, for targeted abilities.
        target: Option<FixedVec2>,
    },
    /// No-op presence marker; registers the peer on a tick.
    Heartbeat,
}

impl CommandKind {
    /// Stable numeric tag, secondary dispatch sort key.
    pub fn type_tag(&self) -> u8 {
        match self {
            CommandKind::Move { .. } => 0,
            CommandKind::Attack { .. } => 1,
            CommandKind::Stop { .. } => 2,
            CommandKind::Patrol { .. } => 3,
            CommandKind::Gather { .. } => 4,
            CommandKind::Build { .. } => 5,
            CommandKind::Rally { .. } => 6,
            CommandKind::LiftOff { .. } => 7,
            CommandKind::Land { .. } => 8,
            CommandKind::Train { .. } => 9,
            CommandKind::CancelProduction { .. } => 10,
            CommandKind::ReorderProduction { .. } => 11,
            CommandKind::ToggleAutocast { .. } => 12,
            CommandKind::Research { .. } => 13,
            CommandKind::UseAbility { .. } => 14,
            CommandKind::Heartbeat => 255,
        }
    }

    /// Event bus topic this command dispatches on.
    pub fn topic(&self) -> &'static str {
        match self {
            CommandKind::Move { .. } => "command:move",
            CommandKind::Attack { .. } => "command:attack",
            CommandKind::Stop { .. } => "command:stop",
            CommandKind::Patrol { .. } => "command:patrol",
            CommandKind::Gather { .. } => "command:gather",
            CommandKind::Build { .. } => "command:build",
            CommandKind::Rally { .. } => "command:rally",
            CommandKind::LiftOff { .. } => "command:liftoff",
            CommandKind::Land { .. } => "command:land",
            CommandKind::Train { .. } => "command:train",
            CommandKind::CancelProduction { .. } => "command:cancel",
            CommandKind::ReorderProduction { .. } => "command:reorder",
            CommandKind::ToggleAutocast { .. } => "command:autocast",
            CommandKind::Research { .. } => "command:research",
            CommandKind::UseAbility { .. } => "command:ability",
            CommandKind::Heartbeat => "command:heartbeat",
        }
    }

    /// Entity ids whose ownership the issuer must hold.
    ///
    /// Position-only commands (build-at-cell, heartbeat) reference no
    /// entities and are exempt.
    pub fn owned_entities(&self) -> Vec<EntityId> {
        match self {
            CommandKind::Move { units, .. }
            | CommandKind::Attack { units, .. }
            | CommandKind::Stop { units }
            | CommandKind::Patrol { units, .. }
            | CommandKind::Gather { units, .. } => units.clone(),
            CommandKind::Build { worker, .. } => vec![*worker],
            CommandKind::Rally { building, .. }
            | CommandKind::LiftOff { building }
            | CommandKind::Land { building, .. }
            | CommandKind::Train { building, .. }
            | CommandKind::CancelProduction { building, .. }
            | CommandKind::ReorderProduction { building, .. }
            | CommandKind::ToggleAutocast { building }
            | CommandKind::Research { building, .. } => vec![*building],
            CommandKind::UseAbility { unit, .. } => vec![*unit],
            CommandKind::Heartbeat => Vec::new(),
        }
    }

    /// First referenced entity id, tertiary dispatch sort key.
    pub fn first_entity(&self) -> Option<EntityId> {
        self.owned_entities().first().copied().or(match self {
            // Attack/gather targets count when the unit list is empty.
            CommandKind::Attack {
                target: AttackTarget::Entity(id),
                ..
            } => Some(*id),
            CommandKind::Gather { resource, .. } => Some(*resource),
            _ => None,
        })
    }
}

/// A scheduled player command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameCommand {
    /// Tick this command executes on, on every peer.
    pub tick: u32,
    /// Issuing player.
    pub player: PlayerId,
    /// Payload.
    pub kind: CommandKind,
}

impl GameCommand {
    /// The deterministic dispatch sort key.
    pub fn sort_key(&self) -> (PlayerId, u8, u32) {
        (
            self.player,
            self.kind.type_tag(),
            self.kind.first_entity().map(|e| e.raw()).unwrap_or(u32::MAX),
        )
    }
}

// =============================================================================
// AUTHORIZATION
// =============================================================================

/// Why a command was refused. Every variant is an audit event, not a desync.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CommandRejection {
    /// Command's player id does not match the transport-corroborated sender.
    #[error("player id {claimed} does not match corroborated sender {sender}")]
    SpoofedPlayerId {
        /// Claimed identity.
        claimed: PlayerId,
        /// Identity the transport vouches for.
        sender: PlayerId,
    },
    /// Scheduled tick outside the accepted window.
    #[error("tick {tick} outside window [{min}, {max}]")]
    TickOutOfRange {
        /// Scheduled tick.
        tick: u32,
        /// Window lower bound.
        min: u32,
        /// Window upper bound.
        max: u32,
    },
    /// A referenced entity belongs to someone else (or nobody).
    #[error("entity {entity} not owned by {player}")]
    OwnershipMismatch {
        /// Offending entity.
        entity: EntityId,
        /// Issuing player.
        player: PlayerId,
    },
    /// Signature missing or invalid in a signed match.
    #[error("invalid or missing command signature")]
    BadSignature,
}

/// Validate an inbound command against the world.
///
/// `sender` is the transport-corroborated identity of the peer that
/// delivered the command; `command_delay` is the lockstep delay D.
pub fn authorize(
    command: &GameCommand,
    sender: PlayerId,
    world: &World,
    command_delay: u32,
) -> Result<(), CommandRejection> {
    if command.player != sender {
        return Err(CommandRejection::SpoofedPlayerId {
            claimed: command.player,
            sender,
        });
    }

    let min = world.tick.saturating_sub(command_delay);
    let max = world.tick + MAX_FUTURE_TICKS;
    if command.tick < min || command.tick > max {
        return Err(CommandRejection::TickOutOfRange {
            tick: command.tick,
            min,
            max,
        });
    }

    for entity in command.kind.owned_entities() {
        if world.owner_of(entity) != Some(command.player) {
            return Err(CommandRejection::OwnershipMismatch {
                entity,
                player: command.player,
            });
        }
    }

    Ok(())
}

// =============================================================================
// QUEUE
// =============================================================================

/// A command arrived for a tick that already executed.
///
/// Not a rejection: lockstep delivery has provably diverged and the match
/// must end with a `stale_commands` desync.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("command for tick {command_tick} arrived on tick {current_tick}")]
pub struct StaleCommand {
    /// Tick the command was scheduled for.
    pub command_tick: u32,
    /// Tick the simulation had already reached.
    pub current_tick: u32,
}

/// Per-tick buckets of authorized commands, plus the peer receipt map.
#[derive(Clone, Debug, Default)]
pub struct CommandQueue {
    buckets: BTreeMap<u32, Vec<GameCommand>>,
    receipts: BTreeMap<u32, BTreeSet<PlayerId>>,
}

impl CommandQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket a command for its scheduled tick.
    ///
    /// Fails with [`StaleCommand`] when the scheduled tick has already been
    /// executed relative to `current_tick`.
    pub fn enqueue(
        &mut self,
        command: GameCommand,
        current_tick: u32,
    ) -> Result<(), StaleCommand> {
        if command.tick < current_tick {
            return Err(StaleCommand {
                command_tick: command.tick,
                current_tick,
            });
        }
        self.receipts
            .entry(command.tick)
            .or_default()
            .insert(command.player);
        self.buckets.entry(command.tick).or_default().push(command);
        Ok(())
    }

    /// Drain the bucket for exactly `tick`, sorted by the dispatch key.
    /// Heartbeats are consumed here; they only feed the receipt map.
    pub fn drain_tick(&mut self, tick: u32) -> Vec<GameCommand> {
        let mut commands = self.buckets.remove(&tick).unwrap_or_default();
        commands.retain(|c| !matches!(c.kind, CommandKind::Heartbeat));
        commands.sort_by_key(|c| c.sort_key());
        commands
    }

    /// Oldest bucketed tick, if any. A value below the current tick at drain
    /// time indicates stale delivery.
    pub fn oldest_pending_tick(&self) -> Option<u32> {
        self.buckets.keys().next().copied()
    }

    /// Peers that registered presence (any command or heartbeat) on a tick.
    pub fn receipts_for(&self, tick: u32) -> Vec<PlayerId> {
        self.receipts
            .get(&tick)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop receipt entries older than `tick` to bound memory.
    pub fn retire_receipts_before(&mut self, tick: u32) {
        self.receipts = self.receipts.split_off(&tick);
    }

    /// Count of pending commands across all buckets.
    pub fn pending(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Commands pending for the most recent `n` ticks up to and including
    /// `tick` - the history tail embedded in snapshots.
    pub fn history_tail(&self, tick: u32, n: u32) -> Vec<GameCommand> {
        let from = tick.saturating_sub(n);
        self.buckets
            .range(from..=tick)
            .flat_map(|(_, cmds)| cmds.iter().cloned())
            .collect()
    }

    /// Drop everything (match reset).
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.receipts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::terrain::TerrainGrid;

    fn cmd(tick: u32, player: u8, kind: CommandKind) -> GameCommand {
        GameCommand {
            tick,
            player: PlayerId(player),
            kind,
        }
    }

    fn move_cmd(tick: u32, player: u8, first_unit: u32) -> GameCommand {
        cmd(
            tick,
            player,
            CommandKind::Move {
                units: vec![EntityId(first_unit)],
                target: FixedVec2::from_cell(10, 10),
            },
        )
    }

    #[test]
    fn test_dispatch_order_is_canonical() {
        let mut queue = CommandQueue::new();

        // Insert deliberately shuffled.
        queue.enqueue(move_cmd(5, 1, 9), 0).unwrap();
        queue
            .enqueue(cmd(5, 0, CommandKind::Stop { units: vec![EntityId(3)] }), 0)
            .unwrap();
        queue.enqueue(move_cmd(5, 0, 7), 0).unwrap();
        queue.enqueue(move_cmd(5, 0, 2), 0).unwrap();

        let drained = queue.drain_tick(5);
        let keys: Vec<_> = drained.iter().map(|c| c.sort_key()).collect();

        // (player, type, first entity) lexicographic.
        assert_eq!(
            keys,
            vec![
                (PlayerId(0), 0, 2),
                (PlayerId(0), 0, 7),
                (PlayerId(0), 2, 3),
                (PlayerId(1), 0, 9),
            ]
        );
    }

    #[test]
    fn test_drain_only_current_tick() {
        let mut queue = CommandQueue::new();
        queue.enqueue(move_cmd(5, 0, 1), 0).unwrap();
        queue.enqueue(move_cmd(6, 0, 2), 0).unwrap();

        assert_eq!(queue.drain_tick(5).len(), 1);
        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.oldest_pending_tick(), Some(6));
    }

    #[test]
    fn test_stale_enqueue_fails() {
        let mut queue = CommandQueue::new();
        let err = queue.enqueue(move_cmd(5, 0, 1), 20).unwrap_err();
        assert_eq!(err.command_tick, 5);
        assert_eq!(err.current_tick, 20);
    }

    #[test]
    fn test_heartbeat_registers_presence_only() {
        let mut queue = CommandQueue::new();
        queue.enqueue(cmd(8, 1, CommandKind::Heartbeat), 0).unwrap();
        queue.enqueue(move_cmd(8, 0, 1), 0).unwrap();

        assert_eq!(queue.receipts_for(8), vec![PlayerId(0), PlayerId(1)]);
        // Heartbeats never dispatch.
        assert_eq!(queue.drain_tick(8).len(), 1);
    }

    #[test]
    fn test_authorization_spoof() {
        let world = World::new(TerrainGrid::new(16, 16), 1);
        let command = move_cmd(4, 1, 0);
        let err = authorize(&command, PlayerId(2), &world, 4).unwrap_err();
        assert!(matches!(err, CommandRejection::SpoofedPlayerId { .. }));
    }

    #[test]
    fn test_authorization_tick_window() {
        let mut world = World::new(TerrainGrid::new(16, 16), 1);
        world.tick = 50;

        let past = cmd(40, 0, CommandKind::Heartbeat);
        assert!(matches!(
            authorize(&past, PlayerId(0), &world, 4),
            Err(CommandRejection::TickOutOfRange { .. })
        ));

        let far_future = cmd(50 + MAX_FUTURE_TICKS + 1, 0, CommandKind::Heartbeat);
        assert!(matches!(
            authorize(&far_future, PlayerId(0), &world, 4),
            Err(CommandRejection::TickOutOfRange { .. })
        ));

        let edge = cmd(46, 0, CommandKind::Heartbeat);
        assert!(authorize(&edge, PlayerId(0), &world, 4).is_ok());
    }

    #[test]
    fn test_authorization_ownership() {
        let mut world = World::new(TerrainGrid::new(16, 16), 1);
        world.add_player(PlayerId(0));
        world.add_player(PlayerId(1));
        let enemy_unit = world.spawn_unit(
            crate::world::kinds::UnitKind::Trooper,
            PlayerId(1),
            FixedVec2::from_cell(3, 3),
        );

        let command = cmd(
            2,
            0,
            CommandKind::Move {
                units: vec![enemy_unit],
                target: FixedVec2::from_cell(5, 5),
            },
        );
        assert!(matches!(
            authorize(&command, PlayerId(0), &world, 4),
            Err(CommandRejection::OwnershipMismatch { .. })
        ));
    }

    #[test]
    fn test_position_only_commands_exempt_from_ownership() {
        let mut world = World::new(TerrainGrid::new(16, 16), 1);
        world.add_player(PlayerId(0));
        // Heartbeat references no entities.
        let command = cmd(2, 0, CommandKind::Heartbeat);
        assert!(authorize(&command, PlayerId(0), &world, 4).is_ok());
    }

    #[test]
    fn test_history_tail() {
        let mut queue = CommandQueue::new();
        for t in 0..30 {
            queue.enqueue(move_cmd(t, 0, t), 0).unwrap();
        }
        let tail = queue.history_tail(29, 10);
        assert_eq!(tail.len(), 11);
        assert!(tail.iter().all(|c| c.tick >= 19));
    }
}
