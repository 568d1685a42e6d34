//! Economy AI
//!
//! Keeps AI workers busy: idle workers are assigned to the emptiest nearby
//! mineral line (or the extractor geyser once one exists), and a depot gets
//! queued when supply headroom runs thin. All of it goes through the
//! command queue like every other order.

use tracing::debug;

use crate::world::components::{ResourceKind, UnitState};
use crate::world::entity::{EntityId, PlayerId};
use crate::world::kinds::BuildingKind;
use crate::world::World;

use crate::game::command::CommandKind;
use crate::game::events::EventBus;
use crate::game::{SimCtx, System};

use super::{ai_players, base_position, issue, workers};
use crate::game::systems::placement::find_build_spot;

/// Queue a depot when headroom drops below this.
const SUPPLY_HEADROOM: u16 = 3;

/// Ticks between depot requests per player, so one shortage does not queue
/// five depots.
const DEPOT_COOLDOWN: u32 = 400;

/// Worker and supply management for AI players.
pub struct AiEconomySystem {
    last_depot_tick: std::collections::BTreeMap<PlayerId, u32>,
}

impl AiEconomySystem {
    /// New system.
    pub fn new() -> Self {
        Self {
            last_depot_tick: std::collections::BTreeMap::new(),
        }
    }

    /// Least-crowded viable resource node near the player's base.
    fn pick_node(world: &World, player: PlayerId) -> Option<EntityId> {
        let base = base_position(world, player)?;
        let mut best: Option<(u8, i64, EntityId)> = None;
        for (&id, node) in &world.resources {
            if node.amount == 0 {
                continue;
            }
            // Vespene only once an owned extractor stands on it.
            if node.kind == ResourceKind::Vespene {
                let workable = node
                    .extractor
                    .map(|e| world.owner_of(e) == Some(player))
                    .unwrap_or(false);
                if !workable {
                    continue;
                }
            }
            let Some(pos) = world.position_of(id) else {
                continue;
            };
            let dist = pos.distance_squared(base) as i64;
            let key = (node.gatherers, dist, id);
            let better = match best {
                None => true,
                Some(b) => key < b,
            };
            if better {
                best = Some(key);
            }
        }
        best.map(|(_, _, id)| id)
    }
}

impl Default for AiEconomySystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for AiEconomySystem {
    fn name(&self) -> &'static str {
        "ai-economy"
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, _bus: &mut EventBus) {
        let cadence = ctx.options.ai_difficulty.decision_cadence();
        let tick = ctx.world.tick;

        for player in ai_players(ctx) {
            if (tick + player.0 as u32) % cadence != 0 {
                continue;
            }

            // Idle workers back to the mines.
            let idle: Vec<EntityId> = workers(ctx.world, player)
                .into_iter()
                .filter(|id| {
                    ctx.world.units.get(id).map(|u| u.state == UnitState::Idle) == Some(true)
                })
                .collect();
            if !idle.is_empty() {
                if let Some(node) = Self::pick_node(ctx.world, player) {
                    debug!(player = %player, count = idle.len(), "assigning idle workers");
                    issue(
                        ctx,
                        player,
                        CommandKind::Gather {
                            units: idle,
                            resource: node,
                        },
                    );
                }
            }

            // Depot when supply is about to cap out.
            let (used, cap, affordable) = match ctx.world.players.get(&player) {
                Some(e) => (
                    e.supply_used,
                    e.supply_cap,
                    e.can_afford(BuildingKind::Depot.stats().minerals, 0),
                ),
                None => continue,
            };
            let last = self.last_depot_tick.get(&player).copied().unwrap_or(0);
            let cooled = tick.saturating_sub(last) >= DEPOT_COOLDOWN || last == 0;
            if cap > 0 && cap - used.min(cap) < SUPPLY_HEADROOM && affordable && cooled {
                let Some(base) = base_position(ctx.world, player) else {
                    continue;
                };
                let (bx, by) = base.cell();
                let spot = find_build_spot(ctx.world, BuildingKind::Depot, (bx - 4, by - 4), 10);
                let worker = workers(ctx.world, player).into_iter().find(|id| {
                    ctx.world
                        .units
                        .get(id)
                        .map(|u| u.state != UnitState::Building)
                        == Some(true)
                });
                if let (Some(spot), Some(worker)) = (spot, worker) {
                    self.last_depot_tick.insert(player, tick);
                    issue(
                        ctx,
                        player,
                        CommandKind::Build {
                            worker,
                            building: BuildingKind::Depot,
                            cell: spot,
                        },
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::FixedVec2;
    use crate::game::command::CommandQueue;
    use crate::game::config::MatchOptions;
    use crate::world::kinds::UnitKind;
    use crate::world::terrain::TerrainGrid;

    fn fixture() -> (World, CommandQueue, MatchOptions) {
        let mut w = World::new(TerrainGrid::new(64, 64), 3);
        w.add_player(PlayerId(0));
        w.add_player(PlayerId(1));
        w.spawn_building(BuildingKind::Headquarters, PlayerId(1), 40, 40, true);
        let options = MatchOptions {
            ai_enabled: true,
            player_id: PlayerId(0),
            ..MatchOptions::default()
        };
        (w, CommandQueue::new(), options)
    }

    fn run(world: &mut World, queue: &mut CommandQueue, options: &MatchOptions, ticks: u32) {
        let mut system = AiEconomySystem::new();
        let mut bus = EventBus::new();
        for t in 0..ticks {
            world.tick = t;
            let mut ctx = SimCtx {
                world,
                queue,
                options,
            };
            system.update(&mut ctx, &mut bus);
        }
    }

    #[test]
    fn test_idle_workers_sent_to_minerals() {
        let (mut world, mut queue, options) = fixture();
        world.spawn_resource(ResourceKind::Minerals, 45, 40, 1500);
        world.spawn_unit(UnitKind::Scavenger, PlayerId(1), FixedVec2::from_cell(41, 44));

        run(&mut world, &mut queue, &options, 60);
        assert!(queue.pending() > 0, "gather command issued");
    }

    #[test]
    fn test_geyser_ignored_without_extractor() {
        let (mut world, mut queue, options) = fixture();
        world.spawn_resource(ResourceKind::Vespene, 45, 40, 2500);
        world.spawn_unit(UnitKind::Scavenger, PlayerId(1), FixedVec2::from_cell(41, 44));

        run(&mut world, &mut queue, &options, 60);
        assert_eq!(queue.pending(), 0, "no workable node, no command");
    }

    #[test]
    fn test_depot_requested_when_supply_tight() {
        let (mut world, mut queue, options) = fixture();
        // Cap 10 from the HQ; push usage to 8.
        for i in 0..8 {
            world.spawn_unit(
                UnitKind::Scavenger,
                PlayerId(1),
                FixedVec2::from_cell(41 + i % 3, 46),
            );
        }
        // Keep them busy so the gather branch stays quiet.
        for (_, unit) in world.units.iter_mut() {
            unit.state = UnitState::Gathering;
        }

        run(&mut world, &mut queue, &options, 60);

        let mut found_build = false;
        for t in 0..200 {
            for cmd in queue.drain_tick(t) {
                if matches!(cmd.kind, CommandKind::Build { building: BuildingKind::Depot, .. }) {
                    found_build = true;
                }
            }
        }
        assert!(found_build, "depot build command issued");
    }
}
