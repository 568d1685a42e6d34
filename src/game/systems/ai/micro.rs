//! Micro AI
//!
//! Per-unit combat behavior for AI players: kiting (step away from the
//! current target by a fraction of attack range while the weapon cycles)
//! and focus fire (switch to the lowest-health enemy in range). The kite
//! step and the re-engage are both commands stamped for future ticks -
//! never a timer - so the whole dance replays identically on every peer.

use crate::core::fixed::{fixed_mul, to_fixed};
use crate::world::components::UnitState;
use crate::world::entity::{EntityId, PlayerId};
use crate::world::World;

use crate::game::command::{AttackTarget, CommandKind, GameCommand};
use crate::game::events::EventBus;
use crate::game::{SimCtx, System};

use super::ai_players;

/// Kite step distance as a fraction of attack range (0.4).
const KITE_FRACTION: crate::core::fixed::Fixed = to_fixed(0.4);

/// Cooldown remaining above which kiting is worth the steps.
const KITE_COOLDOWN_MIN: u32 = 6;

/// Micro controller for AI combat units.
pub struct AiMicroSystem;

impl AiMicroSystem {
    /// Lowest-health enemy within range of a unit, ties to lowest id.
    fn focus_target(
        world: &World,
        player: PlayerId,
        id: EntityId,
    ) -> Option<EntityId> {
        let unit = world.units.get(&id)?;
        let pos = world.position_of(id)?;
        let range = unit.attack_range + to_fixed(0.75);
        let range_sq = fixed_mul(range, range);

        let mut best: Option<(crate::core::fixed::Fixed, EntityId)> = None;
        for candidate in world.unit_grid.query_radius(pos, range) {
            match world.owner_of(candidate) {
                Some(owner) if owner != player && owner.is_player() => {}
                _ => continue,
            }
            let Some(health) = world.healths.get(&candidate) else {
                continue;
            };
            if health.is_dead() {
                continue;
            }
            let Some(cpos) = world.position_of(candidate) else {
                continue;
            };
            if pos.distance_squared(cpos) > range_sq {
                continue;
            }
            let key = (health.current, candidate);
            if best.map(|b| key < b).unwrap_or(true) {
                best = Some(key);
            }
        }
        best.map(|(_, id)| id)
    }
}

impl System for AiMicroSystem {
    fn name(&self) -> &'static str {
        "ai-micro"
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, _bus: &mut EventBus) {
        let delay = ctx.options.command_delay_ticks;
        let tick = ctx.world.tick;

        for player in ai_players(ctx) {
            let units: Vec<EntityId> = ctx
                .world
                .units
                .iter()
                .filter(|(id, u)| {
                    !u.is_worker
                        && u.state == UnitState::Attacking
                        && ctx.world.owner_of(**id) == Some(player)
                })
                .map(|(id, _)| *id)
                .collect();

            for id in units {
                let Some(unit) = ctx.world.units.get(&id) else {
                    continue;
                };
                let stats = unit.kind.stats();
                // Melee units do not kite.
                if stats.attack_range <= crate::core::fixed::FIXED_ONE {
                    // Focus fire still applies.
                    if let Some(better) = Self::focus_target(ctx.world, player, id) {
                        if let Some(unit) = ctx.world.units.get_mut(&id) {
                            unit.target_entity = Some(better);
                        }
                    }
                    continue;
                }

                let cooldown = unit.attack_cooldown;
                let target = unit.target_entity;
                let Some(pos) = ctx.world.position_of(id) else {
                    continue;
                };

                // Focus fire: retarget to the weakest enemy in range.
                if let Some(better) = Self::focus_target(ctx.world, player, id) {
                    if Some(better) != target {
                        if let Some(unit) = ctx.world.units.get_mut(&id) {
                            unit.target_entity = Some(better);
                        }
                    }
                }

                // Kite: weapon cycling and the enemy too close - step back,
                // then re-engage two delays later via the queue.
                let Some(target) = ctx.world.units.get(&id).and_then(|u| u.target_entity) else {
                    continue;
                };
                let Some(target_pos) = ctx.world.position_of(target) else {
                    continue;
                };
                let too_close_sq = {
                    let threshold = fixed_mul(stats.attack_range, to_fixed(0.6));
                    fixed_mul(threshold, threshold)
                };
                if cooldown >= KITE_COOLDOWN_MIN
                    && pos.distance_squared(target_pos) <= too_close_sq
                {
                    let away = target_pos.direction_to(pos);
                    let step = fixed_mul(stats.attack_range, KITE_FRACTION);
                    let retreat = pos + away.scale(step);

                    let _ = ctx.queue.enqueue(
                        GameCommand {
                            tick: tick + delay,
                            player,
                            kind: CommandKind::Move {
                                units: vec![id],
                                target: retreat,
                            },
                        },
                        tick,
                    );
                    // Delayed re-engage: the move lands at tick+D, the new
                    // attack order at tick+2D.
                    let _ = ctx.queue.enqueue(
                        GameCommand {
                            tick: tick + delay * 2,
                            player,
                            kind: CommandKind::Attack {
                                units: vec![id],
                                target: AttackTarget::Entity(target),
                            },
                        },
                        tick,
                    );
                }
            }
        }
    }
}
