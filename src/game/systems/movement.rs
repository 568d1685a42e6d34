//! Movement System
//!
//! Advances units along their waypoint paths at catalog speed, applies
//! crowd separation so stacked units spread out, and keeps the unit grid
//! current. Also owns the move/stop/patrol order handlers.

use crate::core::fixed::{fixed_div, fixed_mul, from_int, to_fixed, Fixed, FIXED_ONE};
use crate::core::vec2::FixedVec2;
use crate::world::components::UnitState;
use crate::world::entity::EntityId;
use crate::world::kinds::ResearchId;
use crate::world::tag;

use crate::game::command::CommandKind;
use crate::game::events::{EventBus, GameEvent};
use crate::game::{SimCtx, System};

/// Distance at which a waypoint counts as reached.
const ARRIVE_EPSILON: Fixed = FIXED_ONE / 4;

/// Separation radius between ground units.
const SEPARATION_RADIUS: Fixed = to_fixed(0.6);

/// Speed multiplier while overdrive is active (1.5x).
const OVERDRIVE_MULT: Fixed = to_fixed(1.5);

/// Propulsion research speed multiplier (1.1x).
const PROPULSION_MULT: Fixed = to_fixed(1.1);

/// Moves every unit with waypoints; see module docs.
pub struct MovementSystem;

impl MovementSystem {
    /// Effective speed for a unit, after research and buffs.
    fn effective_speed(ctx: &SimCtx<'_>, id: EntityId) -> Fixed {
        let Some(unit) = ctx.world.units.get(&id) else {
            return 0;
        };
        let mut speed = unit.kind.stats().speed;
        if unit.overdrive_ticks > 0 {
            speed = fixed_mul(speed, OVERDRIVE_MULT);
        }
        if !unit.is_worker {
            if let Some(owner) = ctx.world.owner_of(id) {
                if let Some(economy) = ctx.world.players.get(&owner) {
                    if economy.research.contains(&ResearchId::PropulsionUpgrade) {
                        speed = fixed_mul(speed, PROPULSION_MULT);
                    }
                }
            }
        }
        speed
    }
}

impl System for MovementSystem {
    fn name(&self) -> &'static str {
        "movement"
    }

    fn subscribe(&self, bus: &mut EventBus) {
        bus.on("command:move", handle_move);
        bus.on("command:stop", handle_stop);
        bus.on("command:patrol", handle_patrol);
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, _bus: &mut EventBus) {
        let dt = fixed_div(FIXED_ONE, from_int(ctx.options.tick_rate as i32));
        let ids = ctx.world.entities_with(tag::UNIT | tag::TRANSFORM);

        // Waypoint advance, ascending id order.
        for &id in &ids {
            let Some(unit) = ctx.world.units.get(&id) else {
                continue;
            };
            if unit.path.is_empty() {
                continue;
            }
            let speed = Self::effective_speed(ctx, id);
            let step = fixed_mul(speed, dt);
            let pos = match ctx.world.position_of(id) {
                Some(p) => p,
                None => continue,
            };

            let Some(unit) = ctx.world.units.get_mut(&id) else {
                continue;
            };
            let waypoint = unit.path[0];
            let to_wp = waypoint - pos;
            let dist_sq = to_wp.length_squared();
            let step_sq = fixed_mul(step, step);

            let new_pos = if dist_sq <= step_sq.max(fixed_mul(ARRIVE_EPSILON, ARRIVE_EPSILON)) {
                unit.path.remove(0);
                waypoint
            } else {
                pos + to_wp.normalize().scale(step)
            };

            // Final arrival: resolve the order.
            if unit.path.is_empty() {
                match unit.state {
                    UnitState::Moving => {
                        if let Some(origin) = unit.patrol_origin {
                            // Bounce the patrol leg.
                            unit.patrol_origin = unit.target_pos;
                            unit.target_pos = Some(origin);
                        } else {
                            unit.state = UnitState::Idle;
                            unit.target_pos = None;
                        }
                    }
                    UnitState::AttackMoving => {
                        unit.state = UnitState::Idle;
                        unit.target_pos = None;
                    }
                    // Gather/build/attack proximity is resolved by the
                    // owning systems.
                    _ => {
                        unit.target_pos = None;
                    }
                }
            }

            // Facing follows travel direction.
            if new_pos != pos {
                let delta = new_pos - pos;
                if let Some(t) = ctx.world.transforms.get_mut(&id) {
                    t.orientation = coarse_angle(delta);
                }
            }
            ctx.world.move_entity(id, new_pos);
        }

        // Crowd separation: stacked ground units push each other apart.
        for &id in &ids {
            let Some(unit) = ctx.world.units.get(&id) else {
                continue;
            };
            if unit.is_flying {
                continue;
            }
            let Some(pos) = ctx.world.position_of(id) else {
                continue;
            };

            let neighbors = ctx.world.unit_grid.query_radius(pos, SEPARATION_RADIUS);
            let mut push = FixedVec2::ZERO;
            for other in neighbors {
                if other == id || !ctx.world.units.contains_key(&other) {
                    continue;
                }
                if ctx.world.units.get(&other).map(|u| u.is_flying) == Some(true) {
                    continue;
                }
                let Some(other_pos) = ctx.world.position_of(other) else {
                    continue;
                };
                let away = pos - other_pos;
                let dist = away.length();
                if dist < SEPARATION_RADIUS {
                    let overlap = SEPARATION_RADIUS - dist;
                    let dir = if dist == 0 {
                        // Perfectly stacked: deterministic tie-break by id.
                        if id < other {
                            FixedVec2::new(FIXED_ONE, 0)
                        } else {
                            FixedVec2::new(-FIXED_ONE, 0)
                        }
                    } else {
                        away.normalize()
                    };
                    push = push + dir.scale(overlap >> 1);
                }
            }

            if push != FixedVec2::ZERO {
                let capped = push.clamp_length(FIXED_ONE / 8);
                let mut next = pos + capped;
                // Never separate into unwalkable terrain.
                let (cx, cy) = next.cell();
                if !ctx.world.terrain.walkable(cx, cy) {
                    next = pos;
                }
                if next != pos {
                    ctx.world.move_entity(id, next);
                }
            }
        }
    }
}

/// Quantized facing angle from a movement delta (8 directions, BAM).
fn coarse_angle(delta: FixedVec2) -> u16 {
    let east = delta.x > 0;
    let west = delta.x < 0;
    let north = delta.y > 0;
    let south = delta.y < 0;
    match (east, west, north, south) {
        (true, _, false, false) => 0,
        (true, _, true, _) => 8192,
        (false, false, true, _) => 16384,
        (_, true, true, _) => 24576,
        (_, true, false, false) => 32768,
        (_, true, _, true) => 40960,
        (false, false, _, true) => 49152,
        _ => 57344,
    }
}

// =============================================================================
// ORDER HANDLERS
// =============================================================================

fn ordered_units<'a>(ctx: &SimCtx<'_>, units: &'a [EntityId]) -> Vec<EntityId> {
    units
        .iter()
        .copied()
        .filter(|id| ctx.world.units.contains_key(id))
        .collect()
}

/// `command:move`
pub fn handle_move(ctx: &mut SimCtx<'_>, event: &GameEvent) {
    let GameEvent::Command(command) = event else {
        return;
    };
    let CommandKind::Move { units, target } = &command.kind else {
        return;
    };
    for id in ordered_units(ctx, units) {
        if let Some(unit) = ctx.world.units.get_mut(&id) {
            unit.clear_orders();
            unit.state = UnitState::Moving;
            unit.target_pos = Some(*target);
        }
    }
}

/// `command:stop`
pub fn handle_stop(ctx: &mut SimCtx<'_>, event: &GameEvent) {
    let GameEvent::Command(command) = event else {
        return;
    };
    let CommandKind::Stop { units } = &command.kind else {
        return;
    };
    for id in ordered_units(ctx, units) {
        if let Some(unit) = ctx.world.units.get_mut(&id) {
            unit.clear_orders();
        }
    }
}

/// `command:patrol`
pub fn handle_patrol(ctx: &mut SimCtx<'_>, event: &GameEvent) {
    let GameEvent::Command(command) = event else {
        return;
    };
    let CommandKind::Patrol { units, target } = &command.kind else {
        return;
    };
    for id in ordered_units(ctx, units) {
        let origin = ctx.world.position_of(id);
        if let (Some(unit), Some(origin)) = (ctx.world.units.get_mut(&id), origin) {
            unit.clear_orders();
            unit.state = UnitState::Moving;
            unit.target_pos = Some(*target);
            unit.patrol_origin = Some(origin);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::command::{CommandQueue, GameCommand};
    use crate::game::config::MatchOptions;
    use crate::world::entity::PlayerId;
    use crate::world::kinds::UnitKind;
    use crate::world::terrain::TerrainGrid;
    use crate::world::World;

    fn fixture() -> (World, CommandQueue, MatchOptions) {
        let mut w = World::new(TerrainGrid::new(64, 64), 3);
        w.add_player(PlayerId(0));
        (w, CommandQueue::new(), MatchOptions::default())
    }

    fn move_event(unit: EntityId, target: FixedVec2) -> GameEvent {
        GameEvent::Command(GameCommand {
            tick: 1,
            player: PlayerId(0),
            kind: CommandKind::Move {
                units: vec![unit],
                target,
            },
        })
    }

    #[test]
    fn test_move_order_sets_state() {
        let (mut world, mut queue, options) = fixture();
        let u = world.spawn_unit(UnitKind::Trooper, PlayerId(0), FixedVec2::from_cell(5, 5));

        let mut ctx = SimCtx {
            world: &mut world,
            queue: &mut queue,
            options: &options,
        };
        handle_move(&mut ctx, &move_event(u, FixedVec2::from_cell(20, 5)));

        let unit = world.units.get(&u).unwrap();
        assert_eq!(unit.state, UnitState::Moving);
        assert_eq!(unit.target_pos, Some(FixedVec2::from_cell(20, 5)));
    }

    #[test]
    fn test_unit_walks_its_path() {
        let (mut world, mut queue, options) = fixture();
        let u = world.spawn_unit(UnitKind::Trooper, PlayerId(0), FixedVec2::from_cell(5, 5));

        let target = FixedVec2::from_cell(10, 5);
        {
            let unit = world.units.get_mut(&u).unwrap();
            unit.state = UnitState::Moving;
            unit.target_pos = Some(target);
            unit.path = vec![target];
        }

        let mut system = MovementSystem;
        let mut bus = EventBus::new();
        let start = world.position_of(u).unwrap();

        for tick in 0..200 {
            world.tick = tick;
            let mut ctx = SimCtx {
                world: &mut world,
                queue: &mut queue,
                options: &options,
            };
            system.update(&mut ctx, &mut bus);
            if world.units.get(&u).unwrap().state == UnitState::Idle {
                break;
            }
        }

        let end = world.position_of(u).unwrap();
        assert!(end.distance_squared(target) < start.distance_squared(target));
        assert_eq!(world.units.get(&u).unwrap().state, UnitState::Idle);
        assert!(end.distance(target) <= ARRIVE_EPSILON * 2);
    }

    #[test]
    fn test_patrol_bounces() {
        let (mut world, mut queue, options) = fixture();
        let start_pos = FixedVec2::from_cell(5, 5);
        let u = world.spawn_unit(UnitKind::Ravager, PlayerId(0), start_pos);

        let far = FixedVec2::from_cell(8, 5);
        {
            let mut ctx = SimCtx {
                world: &mut world,
                queue: &mut queue,
                options: &options,
            };
            handle_patrol(
                &mut ctx,
                &GameEvent::Command(GameCommand {
                    tick: 1,
                    player: PlayerId(0),
                    kind: CommandKind::Patrol {
                        units: vec![u],
                        target: far,
                    },
                }),
            );
        }
        // Simulate pathfinding filling the path.
        world.units.get_mut(&u).unwrap().path = vec![far];

        let mut system = MovementSystem;
        let mut bus = EventBus::new();
        for tick in 0..300 {
            world.tick = tick;
            let mut ctx = SimCtx {
                world: &mut world,
                queue: &mut queue,
                options: &options,
            };
            system.update(&mut ctx, &mut bus);
            let unit = world.units.get(&u).unwrap();
            if unit.path.is_empty() && unit.target_pos.is_some() {
                // Arrived at the far end; the patrol swapped legs and still
                // wants to move (back toward the origin).
                assert_eq!(unit.state, UnitState::Moving);
                return;
            }
        }
        panic!("patrol never reached the far end");
    }

    #[test]
    fn test_stacked_units_separate() {
        let (mut world, mut queue, options) = fixture();
        let pos = FixedVec2::from_cell(10, 10);
        let a = world.spawn_unit(UnitKind::Trooper, PlayerId(0), pos);
        let b = world.spawn_unit(UnitKind::Trooper, PlayerId(0), pos);

        let mut system = MovementSystem;
        let mut bus = EventBus::new();
        for tick in 0..30 {
            world.tick = tick;
            let mut ctx = SimCtx {
                world: &mut world,
                queue: &mut queue,
                options: &options,
            };
            system.update(&mut ctx, &mut bus);
        }

        let pa = world.position_of(a).unwrap();
        let pb = world.position_of(b).unwrap();
        assert!(pa != pb, "stacked units must separate");
    }

    #[test]
    fn test_stop_clears_orders() {
        let (mut world, mut queue, options) = fixture();
        let u = world.spawn_unit(UnitKind::Trooper, PlayerId(0), FixedVec2::from_cell(5, 5));
        {
            let unit = world.units.get_mut(&u).unwrap();
            unit.state = UnitState::Moving;
            unit.target_pos = Some(FixedVec2::from_cell(30, 30));
            unit.path = vec![FixedVec2::from_cell(30, 30)];
        }

        let mut ctx = SimCtx {
            world: &mut world,
            queue: &mut queue,
            options: &options,
        };
        handle_stop(
            &mut ctx,
            &GameEvent::Command(GameCommand {
                tick: 1,
                player: PlayerId(0),
                kind: CommandKind::Stop { units: vec![u] },
            }),
        );

        let unit = world.units.get(&u).unwrap();
        assert_eq!(unit.state, UnitState::Idle);
        assert!(unit.path.is_empty());
        assert!(unit.target_pos.is_none());
    }
}
