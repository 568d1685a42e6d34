//! AI Systems
//!
//! Deterministic computer opponents. Every AI decision flows through the
//! same lockstep command queue as human input, stamped `current + D`, so
//! the AI running on two peers produces the same world - there is no other
//! channel by which it could act.
//!
//! Randomness comes exclusively from the per-tick reseeded RNG; the AI
//! never reads a clock.

pub mod economy;
pub mod micro;
pub mod strategic;

use crate::core::vec2::FixedVec2;
use crate::world::entity::{EntityId, PlayerId};
use crate::world::kinds::BuildingKind;
use crate::world::World;

use crate::game::command::{CommandKind, GameCommand};
use crate::game::SimCtx;

/// Players driven by the AI: every slot except the local human.
pub(crate) fn ai_players(ctx: &SimCtx<'_>) -> Vec<PlayerId> {
    ctx.world
        .players
        .keys()
        .copied()
        .filter(|p| *p != ctx.options.player_id)
        .collect()
}

/// Issue a command through the lockstep path.
pub(crate) fn issue(ctx: &mut SimCtx<'_>, player: PlayerId, kind: CommandKind) {
    let tick = ctx.world.tick + ctx.options.command_delay_ticks;
    let command = GameCommand { tick, player, kind };
    // Stamped in the future, so enqueue cannot be stale.
    let _ = ctx.queue.enqueue(command, ctx.world.tick);
}

/// A player's primary base position (headquarters, else any building, else
/// any unit).
pub(crate) fn base_position(world: &World, player: PlayerId) -> Option<FixedVec2> {
    let mut fallback = None;
    for (&id, building) in &world.buildings {
        if world.owner_of(id) != Some(player) {
            continue;
        }
        if building.kind == BuildingKind::Headquarters {
            return world.position_of(id);
        }
        if fallback.is_none() {
            fallback = world.position_of(id);
        }
    }
    if fallback.is_some() {
        return fallback;
    }
    world
        .units
        .iter()
        .find(|(id, _)| world.owner_of(**id) == Some(player))
        .and_then(|(id, _)| world.position_of(*id))
}

/// Combat units (non-workers) of a player, ascending id order.
pub(crate) fn army_units(world: &World, player: PlayerId) -> Vec<EntityId> {
    world
        .units
        .iter()
        .filter(|(id, unit)| !unit.is_worker && world.owner_of(**id) == Some(player))
        .map(|(id, _)| *id)
        .collect()
}

/// Workers of a player, ascending id order.
pub(crate) fn workers(world: &World, player: PlayerId) -> Vec<EntityId> {
    world
        .units
        .iter()
        .filter(|(id, unit)| unit.is_worker && world.owner_of(**id) == Some(player))
        .map(|(id, _)| *id)
        .collect()
}

/// First enemy player relative to `player`, by slot order.
pub(crate) fn first_enemy(world: &World, player: PlayerId) -> Option<PlayerId> {
    world.players.keys().copied().find(|p| *p != player)
}
