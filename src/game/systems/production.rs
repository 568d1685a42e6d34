//! Production System
//!
//! Building production queues: trains advance one tick at a time (head of
//! queue only), completed units spawn at the footprint's south edge and
//! walk to the rally point. Owns the train / cancel / reorder / rally /
//! autocast order handlers.

use crate::core::vec2::FixedVec2;
use crate::world::components::ProductionItem;
use crate::world::entity::EntityId;
use crate::world::tag;
use crate::world::SpawnRequest;
use crate::world::World;

use crate::game::command::CommandKind;
use crate::game::events::{EventBus, GameEvent};
use crate::game::{SimCtx, System};

/// Maximum queued items per building.
const QUEUE_CAP: usize = 5;

/// Spawn cell for a building's produced units: just below the footprint.
pub fn spawn_cell(world: &World, building: EntityId) -> Option<(i32, i32)> {
    let b = world.buildings.get(&building)?;
    let pos = world.position_of(building)?;
    let (cx, cy) = pos.cell();
    Some((cx + b.width as i32 / 2, cy + b.height as i32))
}

/// Advances production queues.
pub struct ProductionSystem;

impl System for ProductionSystem {
    fn name(&self) -> &'static str {
        "production"
    }

    fn subscribe(&self, bus: &mut EventBus) {
        bus.on("command:train", handle_train);
        bus.on("command:cancel", handle_cancel);
        bus.on("command:reorder", handle_reorder);
        bus.on("command:rally", handle_rally);
        bus.on("command:autocast", handle_autocast);
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, bus: &mut EventBus) {
        let ids = ctx.world.entities_with(tag::BUILDING | tag::TRANSFORM);
        for id in ids {
            let Some(building) = ctx.world.buildings.get(&id) else {
                continue;
            };
            if !building.is_operational() || building.production_queue.is_empty() {
                continue;
            }
            let head = building.production_queue[0];
            let kind = head.kind;
            let stats = kind.stats();
            let Some(player) = ctx.world.owner_of(id) else {
                continue;
            };

            if head.progress + 1 >= stats.build_ticks {
                // Supply is checked at completion; a supply-blocked unit
                // holds the queue until a depot finishes.
                let headroom = ctx
                    .world
                    .players
                    .get(&player)
                    .map(|e| e.supply_used + stats.supply <= e.supply_cap)
                    .unwrap_or(false);
                if !headroom {
                    continue;
                }

                let Some(cell) = spawn_cell(ctx.world, id) else {
                    continue;
                };
                let rally = ctx.world.buildings.get(&id).and_then(|b| b.rally);
                let Some(building) = ctx.world.buildings.get_mut(&id) else {
                    continue;
                };
                building.production_queue.remove(0);

                let mut pos = FixedVec2::from_cell(cell.0, cell.1);
                pos.x += crate::core::fixed::FIXED_HALF;
                pos.y += crate::core::fixed::FIXED_HALF;
                ctx.world.pending_spawns.push(SpawnRequest {
                    kind,
                    player,
                    pos,
                    rally,
                });
                bus.emit(ctx, &GameEvent::ProductionCompleted { building: id, kind });
            } else if let Some(building) = ctx.world.buildings.get_mut(&id) {
                building.production_queue[0].progress += 1;
            }
        }
    }
}

/// `command:train`
pub fn handle_train(ctx: &mut SimCtx<'_>, event: &GameEvent) {
    let GameEvent::Command(command) = event else {
        return;
    };
    let CommandKind::Train { building, unit } = &command.kind else {
        return;
    };
    let Some(b) = ctx.world.buildings.get(building) else {
        return;
    };
    if !b.is_operational()
        || !b.kind.stats().trains.contains(unit)
        || b.production_queue.len() >= QUEUE_CAP
    {
        return;
    }
    let Some(player) = ctx.world.owner_of(*building) else {
        return;
    };
    let stats = unit.stats();
    let Some(economy) = ctx.world.players.get_mut(&player) else {
        return;
    };
    if !economy.can_afford(stats.minerals, stats.vespene) {
        return;
    }
    economy.spend(stats.minerals, stats.vespene);
    if let Some(b) = ctx.world.buildings.get_mut(building) {
        b.production_queue.push(ProductionItem {
            kind: *unit,
            progress: 0,
        });
    }
}

/// `command:cancel` - refunds the full cost.
pub fn handle_cancel(ctx: &mut SimCtx<'_>, event: &GameEvent) {
    let GameEvent::Command(command) = event else {
        return;
    };
    let CommandKind::CancelProduction { building, index } = &command.kind else {
        return;
    };
    let Some(player) = ctx.world.owner_of(*building) else {
        return;
    };
    let Some(b) = ctx.world.buildings.get_mut(building) else {
        return;
    };
    let idx = *index as usize;
    if idx >= b.production_queue.len() {
        return;
    }
    let item = b.production_queue.remove(idx);
    let stats = item.kind.stats();
    if let Some(economy) = ctx.world.players.get_mut(&player) {
        economy.minerals += stats.minerals;
        economy.vespene += stats.vespene;
    }
}

/// `command:reorder` - moves a queue entry to a new slot.
pub fn handle_reorder(ctx: &mut SimCtx<'_>, event: &GameEvent) {
    let GameEvent::Command(command) = event else {
        return;
    };
    let CommandKind::ReorderProduction { building, from, to } = &command.kind else {
        return;
    };
    let Some(b) = ctx.world.buildings.get_mut(building) else {
        return;
    };
    let (from, to) = (*from as usize, *to as usize);
    if from >= b.production_queue.len() || to >= b.production_queue.len() {
        return;
    }
    let item = b.production_queue.remove(from);
    b.production_queue.insert(to, item);
}

/// `command:rally`
pub fn handle_rally(ctx: &mut SimCtx<'_>, event: &GameEvent) {
    let GameEvent::Command(command) = event else {
        return;
    };
    let CommandKind::Rally { building, target } = &command.kind else {
        return;
    };
    if let Some(b) = ctx.world.buildings.get_mut(building) {
        b.rally = Some(*target);
    }
}

/// `command:autocast`
pub fn handle_autocast(ctx: &mut SimCtx<'_>, event: &GameEvent) {
    let GameEvent::Command(command) = event else {
        return;
    };
    let CommandKind::ToggleAutocast { building } = &command.kind else {
        return;
    };
    if let Some(b) = ctx.world.buildings.get_mut(building) {
        b.autocast = !b.autocast;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::command::{CommandQueue, GameCommand};
    use crate::game::config::MatchOptions;
    use crate::world::entity::PlayerId;
    use crate::world::kinds::{BuildingKind, UnitKind};
    use crate::world::terrain::TerrainGrid;

    fn fixture() -> (World, CommandQueue, MatchOptions, EntityId) {
        let mut w = World::new(TerrainGrid::new(64, 64), 3);
        w.add_player(PlayerId(0));
        // Depot first so there is supply headroom.
        w.spawn_building(BuildingKind::Depot, PlayerId(0), 30, 30, true);
        let barracks = w.spawn_building(BuildingKind::Barracks, PlayerId(0), 10, 10, true);
        (w, CommandQueue::new(), MatchOptions::default(), barracks)
    }

    fn train_event(building: EntityId, unit: UnitKind) -> GameEvent {
        GameEvent::Command(GameCommand {
            tick: 1,
            player: PlayerId(0),
            kind: CommandKind::Train { building, unit },
        })
    }

    fn ctx_update(
        world: &mut World,
        queue: &mut CommandQueue,
        options: &MatchOptions,
        bus: &mut EventBus,
        n: u32,
    ) {
        let mut system = ProductionSystem;
        for _ in 0..n {
            world.tick += 1;
            let mut ctx = SimCtx {
                world,
                queue,
                options,
            };
            system.update(&mut ctx, bus);
        }
    }

    #[test]
    fn test_train_charges_and_queues() {
        let (mut world, mut queue, options, barracks) = fixture();
        let before = world.players[&PlayerId(0)].minerals;

        let mut ctx = SimCtx {
            world: &mut world,
            queue: &mut queue,
            options: &options,
        };
        handle_train(&mut ctx, &train_event(barracks, UnitKind::Trooper));

        assert_eq!(
            world.players[&PlayerId(0)].minerals,
            before - UnitKind::Trooper.stats().minerals
        );
        assert_eq!(world.buildings.get(&barracks).unwrap().production_queue.len(), 1);
    }

    #[test]
    fn test_only_catalog_units_trainable() {
        let (mut world, mut queue, options, barracks) = fixture();
        let mut ctx = SimCtx {
            world: &mut world,
            queue: &mut queue,
            options: &options,
        };
        // Barracks does not train workers.
        handle_train(&mut ctx, &train_event(barracks, UnitKind::Scavenger));
        assert!(world
            .buildings
            .get(&barracks)
            .unwrap()
            .production_queue
            .is_empty());
    }

    #[test]
    fn test_head_completes_and_spawns() {
        let (mut world, mut queue, options, barracks) = fixture();
        {
            let mut ctx = SimCtx {
                world: &mut world,
                queue: &mut queue,
                options: &options,
            };
            handle_train(&mut ctx, &train_event(barracks, UnitKind::Trooper));
            handle_rally(
                &mut ctx,
                &GameEvent::Command(GameCommand {
                    tick: 1,
                    player: PlayerId(0),
                    kind: CommandKind::Rally {
                        building: barracks,
                        target: FixedVec2::from_cell(20, 20),
                    },
                }),
            );
        }

        let mut bus = EventBus::new();
        let ticks = UnitKind::Trooper.stats().build_ticks + 1;
        ctx_update(&mut world, &mut queue, &options, &mut bus, ticks);

        assert!(world
            .buildings
            .get(&barracks)
            .unwrap()
            .production_queue
            .is_empty());
        // Spawn request carries position below the footprint plus the rally.
        assert_eq!(world.pending_spawns.len(), 1);
        let request = &world.pending_spawns[0];
        assert_eq!(request.kind, UnitKind::Trooper);
        assert_eq!(request.rally, Some(FixedVec2::from_cell(20, 20)));
        assert_eq!(request.pos.cell(), (11, 13));
    }

    #[test]
    fn test_supply_block_holds_queue() {
        let mut world = World::new(TerrainGrid::new(64, 64), 3);
        world.add_player(PlayerId(0));
        // No depot: zero supply cap.
        let barracks = world.spawn_building(BuildingKind::Barracks, PlayerId(0), 10, 10, true);
        let mut queue = CommandQueue::new();
        let options = MatchOptions::default();

        {
            let mut ctx = SimCtx {
                world: &mut world,
                queue: &mut queue,
                options: &options,
            };
            handle_train(&mut ctx, &train_event(barracks, UnitKind::Trooper));
        }

        let mut bus = EventBus::new();
        let ticks = UnitKind::Trooper.stats().build_ticks + 20;
        ctx_update(&mut world, &mut queue, &options, &mut bus, ticks);

        // Held at completion, not dropped.
        assert_eq!(world.buildings.get(&barracks).unwrap().production_queue.len(), 1);
        assert!(world.pending_spawns.is_empty());

        // A depot unblocks it.
        world.spawn_building(BuildingKind::Depot, PlayerId(0), 30, 30, true);
        ctx_update(&mut world, &mut queue, &options, &mut bus, 2);
        assert!(world
            .buildings
            .get(&barracks)
            .unwrap()
            .production_queue
            .is_empty());
        assert_eq!(world.pending_spawns.len(), 1);
    }

    #[test]
    fn test_cancel_refunds() {
        let (mut world, mut queue, options, barracks) = fixture();
        let before = world.players[&PlayerId(0)].minerals;
        {
            let mut ctx = SimCtx {
                world: &mut world,
                queue: &mut queue,
                options: &options,
            };
            handle_train(&mut ctx, &train_event(barracks, UnitKind::Trooper));
            handle_cancel(
                &mut ctx,
                &GameEvent::Command(GameCommand {
                    tick: 1,
                    player: PlayerId(0),
                    kind: CommandKind::CancelProduction {
                        building: barracks,
                        index: 0,
                    },
                }),
            );
        }
        assert_eq!(world.players[&PlayerId(0)].minerals, before);
        assert!(world
            .buildings
            .get(&barracks)
            .unwrap()
            .production_queue
            .is_empty());
    }

    #[test]
    fn test_reorder_moves_entry() {
        let (mut world, mut queue, options, barracks) = fixture();
        {
            let mut ctx = SimCtx {
                world: &mut world,
                queue: &mut queue,
                options: &options,
            };
            handle_train(&mut ctx, &train_event(barracks, UnitKind::Trooper));
            handle_train(&mut ctx, &train_event(barracks, UnitKind::Ravager));
            handle_reorder(
                &mut ctx,
                &GameEvent::Command(GameCommand {
                    tick: 1,
                    player: PlayerId(0),
                    kind: CommandKind::ReorderProduction {
                        building: barracks,
                        from: 1,
                        to: 0,
                    },
                }),
            );
        }
        let queue_kinds: Vec<UnitKind> = world
            .buildings
            .get(&barracks)
            .unwrap()
            .production_queue
            .iter()
            .map(|i| i.kind)
            .collect();
        assert_eq!(queue_kinds, vec![UnitKind::Ravager, UnitKind::Trooper]);
    }
}
