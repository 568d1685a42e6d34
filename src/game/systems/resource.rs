//! Resource System
//!
//! The worker gather loop: walk to the node, pick up a load, carry it to
//! the nearest operational headquarters, credit the stockpile, walk back.
//! Vespene requires a completed, owned extractor on the geyser. Depleted
//! nodes are removed and their workers retarget the nearest surviving node
//! of the same kind.

use crate::core::fixed::{fixed_mul, to_fixed, Fixed};
use crate::core::vec2::FixedVec2;
use crate::world::components::{BuildingState, ResourceKind, UnitState};
use crate::world::entity::{EntityId, PlayerId};
use crate::world::kinds::{BuildingKind, ResearchId};
use crate::world::tag;
use crate::world::World;

use crate::game::command::CommandKind;
use crate::game::events::{EventBus, GameEvent};
use crate::game::{SimCtx, System};

/// Resource units per trip.
const CARRY_AMOUNT: u32 = 5;
/// Trip size with the gather upgrade.
const CARRY_AMOUNT_UPGRADED: u32 = 7;
/// Pickup/dropoff reach.
const GATHER_REACH: Fixed = to_fixed(1.6);
/// Dropoff reach at a headquarters (large footprint).
const DEPOT_REACH: Fixed = to_fixed(3.4);

/// Runs the gather loop.
pub struct ResourceSystem;

impl ResourceSystem {
    fn nearest_depot(world: &World, player: PlayerId, from: FixedVec2) -> Option<EntityId> {
        let mut best: Option<(EntityId, Fixed)> = None;
        for (&id, building) in &world.buildings {
            if building.kind != BuildingKind::Headquarters
                || building.state != BuildingState::Complete
            {
                continue;
            }
            if world.owner_of(id) != Some(player) {
                continue;
            }
            let Some(pos) = world.position_of(id) else {
                continue;
            };
            let d = from.distance_squared(pos);
            let better = match best {
                None => true,
                Some((bid, bd)) => d < bd || (d == bd && id < bid),
            };
            if better {
                best = Some((id, d));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Nearest surviving node of a kind, ties broken by id.
    fn nearest_node(world: &World, kind: ResourceKind, from: FixedVec2) -> Option<EntityId> {
        let mut best: Option<(EntityId, Fixed)> = None;
        for (&id, node) in &world.resources {
            if node.kind != kind || node.amount == 0 || world.is_marked_destroyed(id) {
                continue;
            }
            let Some(pos) = world.position_of(id) else {
                continue;
            };
            let d = from.distance_squared(pos);
            let better = match best {
                None => true,
                Some((bid, bd)) => d < bd || (d == bd && id < bid),
            };
            if better {
                best = Some((id, d));
            }
        }
        best.map(|(id, _)| id)
    }

    /// A geyser is workable by `player` when its extractor is complete and
    /// owned by them.
    fn vespene_workable(world: &World, node: EntityId, player: PlayerId) -> bool {
        let Some(resource) = world.resources.get(&node) else {
            return false;
        };
        if resource.kind != ResourceKind::Vespene {
            return true;
        }
        let Some(extractor) = resource.extractor else {
            return false;
        };
        world.owner_of(extractor) == Some(player)
            && world
                .buildings
                .get(&extractor)
                .map(|b| b.state == BuildingState::Complete)
                .unwrap_or(false)
    }
}

impl System for ResourceSystem {
    fn name(&self) -> &'static str {
        "resource"
    }

    fn subscribe(&self, bus: &mut EventBus) {
        bus.on("command:gather", handle_gather);
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, bus: &mut EventBus) {
        let reach_sq = fixed_mul(GATHER_REACH, GATHER_REACH);
        let depot_reach_sq = fixed_mul(DEPOT_REACH, DEPOT_REACH);

        let workers = ctx.world.entities_with(tag::UNIT | tag::TRANSFORM);
        for id in workers {
            let Some(unit) = ctx.world.units.get(&id) else {
                continue;
            };
            if unit.state != UnitState::Gathering || !unit.is_worker {
                continue;
            }
            let carrying = unit.carrying;
            let gather_target = unit.gather_target;
            let Some(player) = ctx.world.owner_of(id) else {
                continue;
            };
            let Some(pos) = ctx.world.position_of(id) else {
                continue;
            };

            if carrying == 0 {
                // Inbound leg: reach the node, take a load.
                let node = match gather_target
                    .filter(|n| {
                        ctx.world
                            .resources
                            .get(n)
                            .map(|r| r.amount > 0)
                            .unwrap_or(false)
                            && !ctx.world.is_marked_destroyed(*n)
                    }) {
                    Some(n) => n,
                    None => {
                        // Node is gone; retarget the nearest of its kind.
                        let kind = gather_target
                            .and_then(|n| ctx.world.resources.get(&n))
                            .map(|r| r.kind)
                            .unwrap_or(ResourceKind::Minerals);
                        match Self::nearest_node(ctx.world, kind, pos) {
                            Some(n) => {
                                let node_pos = ctx.world.position_of(n);
                                if let Some(unit) = ctx.world.units.get_mut(&id) {
                                    unit.gather_target = Some(n);
                                    unit.target_pos = node_pos;
                                    unit.path.clear();
                                }
                                continue;
                            }
                            None => {
                                if let Some(unit) = ctx.world.units.get_mut(&id) {
                                    unit.clear_orders();
                                }
                                continue;
                            }
                        }
                    }
                };

                if !Self::vespene_workable(ctx.world, node, player) {
                    if let Some(unit) = ctx.world.units.get_mut(&id) {
                        unit.clear_orders();
                    }
                    continue;
                }

                let Some(node_pos) = ctx.world.position_of(node) else {
                    continue;
                };
                if pos.distance_squared(node_pos) > reach_sq {
                    // Keep walking toward it.
                    let Some(unit) = ctx.world.units.get_mut(&id) else {
                        continue;
                    };
                    if unit.target_pos != Some(node_pos) {
                        unit.target_pos = Some(node_pos);
                        unit.path.clear();
                    }
                    continue;
                }

                let load = if ctx
                    .world
                    .players
                    .get(&player)
                    .map(|e| e.research.contains(&ResearchId::GatherUpgrade))
                    .unwrap_or(false)
                {
                    CARRY_AMOUNT_UPGRADED
                } else {
                    CARRY_AMOUNT
                };

                let depleted = {
                    let Some(node_state) = ctx.world.resources.get_mut(&node) else {
                        continue;
                    };
                    let taken = load.min(node_state.amount);
                    node_state.amount -= taken;
                    let emptied = taken > 0 && node_state.amount == 0;
                    if let Some(unit) = ctx.world.units.get_mut(&id) {
                        unit.carrying = taken;
                    }
                    emptied
                };
                if depleted {
                    bus.emit(ctx, &GameEvent::ResourceDepleted { id: node });
                    ctx.world.mark_destroyed(node);
                }

                // Outbound leg starts immediately.
                if let Some(depot) = Self::nearest_depot(ctx.world, player, pos) {
                    let depot_pos = ctx.world.position_of(depot);
                    if let Some(unit) = ctx.world.units.get_mut(&id) {
                        unit.target_pos = depot_pos;
                        unit.path.clear();
                    }
                }
            } else {
                // Outbound leg: reach a headquarters, credit the stockpile.
                let Some(depot) = Self::nearest_depot(ctx.world, player, pos) else {
                    continue; // no depot yet; hold the load
                };
                let Some(depot_pos) = ctx.world.position_of(depot) else {
                    continue;
                };
                if pos.distance_squared(depot_pos) > depot_reach_sq {
                    let Some(unit) = ctx.world.units.get_mut(&id) else {
                        continue;
                    };
                    if unit.target_pos != Some(depot_pos) {
                        unit.target_pos = Some(depot_pos);
                        unit.path.clear();
                    }
                    continue;
                }

                let kind = gather_target
                    .and_then(|n| ctx.world.resources.get(&n))
                    .map(|r| r.kind)
                    .unwrap_or(ResourceKind::Minerals);
                if let Some(economy) = ctx.world.players.get_mut(&player) {
                    match kind {
                        ResourceKind::Minerals => economy.minerals += carrying,
                        ResourceKind::Vespene => economy.vespene += carrying,
                    }
                }
                let node_pos = gather_target.and_then(|n| ctx.world.position_of(n));
                let Some(unit) = ctx.world.units.get_mut(&id) else {
                    continue;
                };
                unit.carrying = 0;
                unit.target_pos = node_pos;
                unit.path.clear();
            }
        }

        // Gatherer counts are recomputed, not incrementally tracked - one
        // pass, same result on every peer.
        let mut counts: std::collections::BTreeMap<EntityId, u8> = std::collections::BTreeMap::new();
        for unit in ctx.world.units.values() {
            if unit.state == UnitState::Gathering {
                if let Some(node) = unit.gather_target {
                    *counts.entry(node).or_default() += 1;
                }
            }
        }
        for (&id, node) in ctx.world.resources.iter_mut() {
            node.gatherers = counts.get(&id).copied().unwrap_or(0);
        }
    }
}

/// `command:gather`
pub fn handle_gather(ctx: &mut SimCtx<'_>, event: &GameEvent) {
    let GameEvent::Command(command) = event else {
        return;
    };
    let CommandKind::Gather { units, resource } = &command.kind else {
        return;
    };
    if !ctx.world.resources.contains_key(resource) {
        return;
    }
    let node_pos = ctx.world.position_of(*resource);
    for id in units.clone() {
        if let Some(unit) = ctx.world.units.get_mut(&id) {
            if !unit.is_worker {
                continue;
            }
            unit.clear_orders();
            unit.state = UnitState::Gathering;
            unit.gather_target = Some(*resource);
            unit.target_pos = node_pos;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::command::{CommandQueue, GameCommand};
    use crate::game::config::MatchOptions;
    use crate::world::kinds::UnitKind;
    use crate::world::terrain::TerrainGrid;

    fn fixture() -> (World, CommandQueue, MatchOptions) {
        let mut w = World::new(TerrainGrid::new(64, 64), 3);
        w.add_player(PlayerId(0));
        (w, CommandQueue::new(), MatchOptions::default())
    }

    fn gather_event(worker: EntityId, node: EntityId) -> GameEvent {
        GameEvent::Command(GameCommand {
            tick: 1,
            player: PlayerId(0),
            kind: CommandKind::Gather {
                units: vec![worker],
                resource: node,
            },
        })
    }

    #[test]
    fn test_full_gather_trip_credits_minerals() {
        let (mut world, mut queue, options) = fixture();
        world.spawn_building(BuildingKind::Headquarters, PlayerId(0), 10, 10, true);
        let node = world.spawn_resource(ResourceKind::Minerals, 16, 11, 1500);
        // Worker standing next to the node.
        let worker =
            world.spawn_unit(UnitKind::Scavenger, PlayerId(0), FixedVec2::from_cell(16, 12));

        let start_minerals = world.players[&PlayerId(0)].minerals;
        {
            let mut ctx = SimCtx {
                world: &mut world,
                queue: &mut queue,
                options: &options,
            };
            handle_gather(&mut ctx, &gather_event(worker, node));
        }

        let mut system = ResourceSystem;
        let mut bus = EventBus::new();

        // First pass: pickup happens (worker is within reach of the node).
        let mut ctx = SimCtx {
            world: &mut world,
            queue: &mut queue,
            options: &options,
        };
        system.update(&mut ctx, &mut bus);
        assert_eq!(world.units.get(&worker).unwrap().carrying, CARRY_AMOUNT);
        assert_eq!(world.resources.get(&node).unwrap().amount, 1500 - CARRY_AMOUNT);
        assert_eq!(world.resources.get(&node).unwrap().gatherers, 1);

        // Teleport the worker to the HQ doorstep and run the dropoff.
        world.move_entity(worker, FixedVec2::from_cell(12, 12));
        let mut ctx = SimCtx {
            world: &mut world,
            queue: &mut queue,
            options: &options,
        };
        system.update(&mut ctx, &mut bus);

        assert_eq!(world.units.get(&worker).unwrap().carrying, 0);
        assert_eq!(
            world.players[&PlayerId(0)].minerals,
            start_minerals + CARRY_AMOUNT
        );
        // Sent back for another trip.
        assert!(world.units.get(&worker).unwrap().target_pos.is_some());
    }

    #[test]
    fn test_depleted_node_removed_and_retargeted() {
        let (mut world, mut queue, options) = fixture();
        world.spawn_building(BuildingKind::Headquarters, PlayerId(0), 10, 10, true);
        let node = world.spawn_resource(ResourceKind::Minerals, 16, 11, 3);
        let other = world.spawn_resource(ResourceKind::Minerals, 18, 11, 1000);
        let worker =
            world.spawn_unit(UnitKind::Scavenger, PlayerId(0), FixedVec2::from_cell(16, 12));

        {
            let mut ctx = SimCtx {
                world: &mut world,
                queue: &mut queue,
                options: &options,
            };
            handle_gather(&mut ctx, &gather_event(worker, node));
        }

        let mut system = ResourceSystem;
        let mut bus = EventBus::new();
        let mut ctx = SimCtx {
            world: &mut world,
            queue: &mut queue,
            options: &options,
        };
        system.update(&mut ctx, &mut bus);

        // Node drained below a full load: worker carries what was left and
        // the node is marked for removal.
        assert_eq!(world.units.get(&worker).unwrap().carrying, 3);
        assert!(world.is_marked_destroyed(node));
        world.flush_destroyed();

        // Next inbound leg retargets the surviving node.
        world.units.get_mut(&worker).unwrap().carrying = 0;
        let mut ctx = SimCtx {
            world: &mut world,
            queue: &mut queue,
            options: &options,
        };
        system.update(&mut ctx, &mut bus);
        assert_eq!(world.units.get(&worker).unwrap().gather_target, Some(other));
    }

    #[test]
    fn test_vespene_needs_extractor() {
        let (mut world, mut queue, options) = fixture();
        world.spawn_building(BuildingKind::Headquarters, PlayerId(0), 10, 10, true);
        let geyser = world.spawn_resource(ResourceKind::Vespene, 16, 11, 2500);
        let worker =
            world.spawn_unit(UnitKind::Scavenger, PlayerId(0), FixedVec2::from_cell(16, 12));

        {
            let mut ctx = SimCtx {
                world: &mut world,
                queue: &mut queue,
                options: &options,
            };
            handle_gather(&mut ctx, &gather_event(worker, geyser));
        }

        let mut system = ResourceSystem;
        let mut bus = EventBus::new();
        let mut ctx = SimCtx {
            world: &mut world,
            queue: &mut queue,
            options: &options,
        };
        system.update(&mut ctx, &mut bus);

        // No extractor: the order is dropped, nothing gathered.
        assert_eq!(world.units.get(&worker).unwrap().carrying, 0);
        assert_eq!(world.units.get(&worker).unwrap().state, UnitState::Idle);

        // With an owned, complete extractor the load is taken.
        let extractor = world.spawn_building(BuildingKind::Extractor, PlayerId(0), 15, 10, true);
        world.resources.get_mut(&geyser).unwrap().extractor = Some(extractor);
        {
            let mut ctx = SimCtx {
                world: &mut world,
                queue: &mut queue,
                options: &options,
            };
            handle_gather(&mut ctx, &gather_event(worker, geyser));
        }
        let mut ctx = SimCtx {
            world: &mut world,
            queue: &mut queue,
            options: &options,
        };
        system.update(&mut ctx, &mut bus);
        assert_eq!(world.units.get(&worker).unwrap().carrying, CARRY_AMOUNT);
    }
}
