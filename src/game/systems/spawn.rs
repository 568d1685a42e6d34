//! Spawn System
//!
//! Materializes deferred unit spawns at one fixed point in the tick. The
//! production system (and scripted starts) push [`SpawnRequest`]s; this
//! system creates the entities in request order, applies rally walk orders
//! and announces each spawn on the bus.

use crate::world::components::UnitState;
use crate::world::SpawnRequest;

use crate::game::events::{EventBus, GameEvent};
use crate::game::{SimCtx, System};

/// Drains `world.pending_spawns`.
pub struct SpawnSystem;

impl System for SpawnSystem {
    fn name(&self) -> &'static str {
        "spawn"
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, bus: &mut EventBus) {
        let requests: Vec<SpawnRequest> = std::mem::take(&mut ctx.world.pending_spawns);
        for request in requests {
            let id = ctx.world.spawn_unit(request.kind, request.player, request.pos);
            if let Some(rally) = request.rally {
                if let Some(unit) = ctx.world.units.get_mut(&id) {
                    unit.state = UnitState::Moving;
                    unit.target_pos = Some(rally);
                }
            }
            bus.emit(
                ctx,
                &GameEvent::UnitSpawned {
                    id,
                    kind: request.kind,
                    player: request.player,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::FixedVec2;
    use crate::game::command::CommandQueue;
    use crate::game::config::MatchOptions;
    use crate::world::entity::PlayerId;
    use crate::world::kinds::UnitKind;
    use crate::world::tag;
    use crate::world::terrain::TerrainGrid;
    use crate::world::World;

    #[test]
    fn test_spawns_drain_in_order_with_rally() {
        let mut world = World::new(TerrainGrid::new(32, 32), 1);
        world.add_player(PlayerId(0));
        world.pending_spawns.push(SpawnRequest {
            kind: UnitKind::Trooper,
            player: PlayerId(0),
            pos: FixedVec2::from_cell(5, 5),
            rally: Some(FixedVec2::from_cell(10, 10)),
        });
        world.pending_spawns.push(SpawnRequest {
            kind: UnitKind::Scavenger,
            player: PlayerId(0),
            pos: FixedVec2::from_cell(6, 5),
            rally: None,
        });

        let mut queue = CommandQueue::new();
        let options = MatchOptions::default();
        let mut bus = EventBus::new();
        let mut ctx = SimCtx {
            world: &mut world,
            queue: &mut queue,
            options: &options,
        };
        SpawnSystem.update(&mut ctx, &mut bus);

        let units = world.entities_with(tag::UNIT);
        assert_eq!(units.len(), 2);
        assert!(world.pending_spawns.is_empty());

        // First spawn (lower id) is the trooper, rallied and moving.
        let trooper = world.units.get(&units[0]).unwrap();
        assert_eq!(trooper.kind, UnitKind::Trooper);
        assert_eq!(trooper.state, UnitState::Moving);
        assert_eq!(trooper.target_pos, Some(FixedVec2::from_cell(10, 10)));

        let worker = world.units.get(&units[1]).unwrap();
        assert_eq!(worker.kind, UnitKind::Scavenger);
        assert_eq!(worker.state, UnitState::Idle);
    }
}
