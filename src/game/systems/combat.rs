//! Combat System
//!
//! Target acquisition through the spatial grids, attack cooldowns, melee
//! damage and ranged projectile fire, chase behavior and death handling.
//! Target choice is fully ordered: priority, then lowest remaining health,
//! then lowest id - nothing about it depends on iteration luck.

use crate::core::fixed::{fixed_mul, from_int, to_fixed, Fixed, FIXED_ONE};
use crate::world::components::{Projectile, UnitState};
use crate::world::entity::{EntityId, PlayerId};
use crate::world::kinds::ResearchId;
use crate::world::tag;
use crate::world::World;

use crate::game::command::{AttackTarget, CommandKind};
use crate::game::events::{EventBus, GameEvent};
use crate::game::{SimCtx, System};

/// Projectile travel speed, cells/second.
const PROJECTILE_SPEED: Fixed = to_fixed(12.0);

/// Range slack so melee units connect while separation jitters them.
const RANGE_SLACK: Fixed = to_fixed(0.75);

/// Weapon research bonus per completed upgrade.
const WEAPON_BONUS: Fixed = from_int(1);

/// Melee/ranged boundary: anything at or under one cell swings directly.
const MELEE_RANGE: Fixed = FIXED_ONE;

/// Apply damage to an entity; emits the death event and defers removal.
/// Returns true when the target died this call.
pub fn deal_damage(
    ctx: &mut SimCtx<'_>,
    bus: &mut EventBus,
    target: EntityId,
    amount: Fixed,
    source: Option<EntityId>,
) -> bool {
    let tick = ctx.world.tick;
    let Some(health) = ctx.world.healths.get_mut(&target) else {
        return false;
    };
    if health.is_dead() {
        return false;
    }
    health.apply_damage(amount, tick);
    if !health.is_dead() {
        return false;
    }

    if ctx.world.units.contains_key(&target) {
        bus.emit(
            ctx,
            &GameEvent::UnitDied {
                id: target,
                killer: source,
            },
        );
    } else if ctx.world.buildings.contains_key(&target) {
        bus.emit(ctx, &GameEvent::BuildingDestroyed { id: target });
    }
    ctx.world.mark_destroyed(target);
    true
}

/// Pick the best enemy candidate around a position: highest priority, then
/// lowest health, then lowest id. Candidates come pre-sorted from the grid.
fn acquire_target(
    world: &World,
    player: PlayerId,
    center: crate::core::vec2::FixedVec2,
    range: Fixed,
) -> Option<EntityId> {
    let range_sq = fixed_mul(range, range);
    let mut candidates = world.unit_grid.query_radius(center, range);
    candidates.extend(world.building_grid.query_radius(center, range));

    let mut best: Option<(u8, Fixed, EntityId)> = None;
    for id in candidates {
        let Some(owner) = world.owner_of(id) else {
            continue;
        };
        if owner == player || !owner.is_player() {
            continue;
        }
        let Some(health) = world.healths.get(&id) else {
            continue;
        };
        if health.is_dead() || world.is_marked_destroyed(id) {
            continue;
        }
        let Some(pos) = world.position_of(id) else {
            continue;
        };
        if center.distance_squared(pos) > range_sq {
            continue;
        }
        let priority = world
            .units
            .get(&id)
            .map(|u| u.kind.stats().target_priority)
            .unwrap_or(2);
        let key = (priority, health.current, id);
        let better = match &best {
            None => true,
            Some((bp, bh, bid)) => {
                key.0 > *bp || (key.0 == *bp && (key.1 < *bh || (key.1 == *bh && key.2 < *bid)))
            }
        };
        if better {
            best = Some(key);
        }
    }
    best.map(|(_, _, id)| id)
}

/// Damage dealt by a player's unit after research.
fn effective_damage(world: &World, player: PlayerId, base: Fixed) -> Fixed {
    let upgraded = world
        .players
        .get(&player)
        .map(|e| e.research.contains(&ResearchId::WeaponUpgrade))
        .unwrap_or(false);
    if upgraded {
        base + WEAPON_BONUS
    } else {
        base
    }
}

/// Runs unit and turret combat.
pub struct CombatSystem;

impl System for CombatSystem {
    fn name(&self) -> &'static str {
        "combat"
    }

    fn subscribe(&self, bus: &mut EventBus) {
        bus.on("command:attack", handle_attack);
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, bus: &mut EventBus) {
        self.update_units(ctx, bus);
        self.update_turrets(ctx, bus);
    }
}

impl CombatSystem {
    fn update_units(&mut self, ctx: &mut SimCtx<'_>, bus: &mut EventBus) {
        let ids = ctx.world.entities_with(tag::UNIT | tag::TRANSFORM);
        for id in ids {
            let Some(unit) = ctx.world.units.get_mut(&id) else {
                continue;
            };
            if unit.attack_cooldown > 0 {
                unit.attack_cooldown -= 1;
            }
            let stats = unit.kind.stats();
            if stats.attack_damage == 0 {
                continue;
            }
            let (state, sight) = (unit.state, unit.sight_range);
            let Some(pos) = ctx.world.position_of(id) else {
                continue;
            };
            let Some(player) = ctx.world.owner_of(id) else {
                continue;
            };

            match state {
                UnitState::Idle | UnitState::AttackMoving => {
                    // Auto-acquire anything in sight; attack-move pauses its
                    // march to engage.
                    if let Some(target) = acquire_target(ctx.world, player, pos, sight) {
                        let Some(unit) = ctx.world.units.get_mut(&id) else {
                            continue;
                        };
                        unit.target_entity = Some(target);
                        unit.state = UnitState::Attacking;
                        self.engage(ctx, bus, id, target);
                    }
                }
                UnitState::Attacking => {
                    let target = ctx.world.units.get(&id).and_then(|u| u.target_entity);
                    let live = target
                        .filter(|t| {
                            ctx.world
                                .healths
                                .get(t)
                                .map(|h| !h.is_dead())
                                .unwrap_or(false)
                                && !ctx.world.is_marked_destroyed(*t)
                        });
                    match live {
                        Some(target) => {
                            self.engage(ctx, bus, id, target);
                        }
                        None => {
                            // Target gone: reacquire in sight or stand down.
                            let next = acquire_target(ctx.world, player, pos, sight);
                            let Some(unit) = ctx.world.units.get_mut(&id) else {
                                continue;
                            };
                            match next {
                                Some(t) => unit.target_entity = Some(t),
                                None => unit.clear_orders(),
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Close distance or fire on a confirmed live target.
    fn engage(&mut self, ctx: &mut SimCtx<'_>, bus: &mut EventBus, id: EntityId, target: EntityId) {
        let Some(pos) = ctx.world.position_of(id) else {
            return;
        };
        let Some(target_pos) = ctx.world.position_of(target) else {
            return;
        };
        let Some(unit) = ctx.world.units.get(&id) else {
            return;
        };
        let stats = unit.kind.stats();
        let range = unit.attack_range + RANGE_SLACK;
        let cooldown_ready = unit.attack_cooldown == 0;
        let Some(player) = ctx.world.owner_of(id) else {
            return;
        };

        let in_range = pos.distance_squared(target_pos) <= fixed_mul(range, range);
        if !in_range {
            // Chase: re-path when the target drifted a cell away from the
            // current goal.
            let Some(unit) = ctx.world.units.get_mut(&id) else {
                return;
            };
            let stale = match unit.target_pos {
                Some(goal) => goal.cell() != target_pos.cell(),
                None => true,
            };
            if stale {
                unit.target_pos = Some(target_pos);
                unit.path.clear();
            }
            return;
        }

        // Hold position while swinging.
        if let Some(unit) = ctx.world.units.get_mut(&id) {
            unit.target_pos = None;
            unit.path.clear();
        }
        if !cooldown_ready {
            return;
        }

        let damage = effective_damage(ctx.world, player, stats.attack_damage);
        if stats.attack_range <= MELEE_RANGE {
            deal_damage(ctx, bus, target, damage, Some(id));
        } else {
            let projectile = Projectile {
                source: id,
                target_entity: Some(target),
                target_pos,
                damage,
                splash_radius: 0,
                speed: PROJECTILE_SPEED,
            };
            ctx.world.spawn_projectile(pos, projectile);
        }
        if let Some(unit) = ctx.world.units.get_mut(&id) {
            unit.attack_cooldown = stats.attack_cooldown;
        }
    }

    fn update_turrets(&mut self, ctx: &mut SimCtx<'_>, _bus: &mut EventBus) {
        let ids = ctx.world.entities_with(tag::BUILDING | tag::TRANSFORM);
        for id in ids {
            let Some(building) = ctx.world.buildings.get_mut(&id) else {
                continue;
            };
            if building.attack_cooldown > 0 {
                building.attack_cooldown -= 1;
            }
            if !building.can_attack || !building.autocast || !building.is_operational() {
                continue;
            }
            if building.attack_cooldown > 0 {
                continue;
            }
            let stats = building.kind.stats();
            let Some(pos) = ctx.world.position_of(id) else {
                continue;
            };
            let Some(player) = ctx.world.owner_of(id) else {
                continue;
            };
            let Some(target) = acquire_target(ctx.world, player, pos, stats.attack_range) else {
                continue;
            };
            let Some(target_pos) = ctx.world.position_of(target) else {
                continue;
            };

            let projectile = Projectile {
                source: id,
                target_entity: Some(target),
                target_pos,
                damage: stats.attack_damage,
                splash_radius: 0,
                speed: PROJECTILE_SPEED,
            };
            ctx.world.spawn_projectile(pos, projectile);
            if let Some(building) = ctx.world.buildings.get_mut(&id) {
                building.attack_cooldown = stats.attack_cooldown;
            }
        }
    }
}

/// `command:attack`
pub fn handle_attack(ctx: &mut SimCtx<'_>, event: &GameEvent) {
    let GameEvent::Command(command) = event else {
        return;
    };
    let CommandKind::Attack { units, target } = &command.kind else {
        return;
    };
    for id in units.clone() {
        if let Some(unit) = ctx.world.units.get_mut(&id) {
            unit.clear_orders();
            match target {
                AttackTarget::Entity(e) => {
                    unit.state = UnitState::Attacking;
                    unit.target_entity = Some(*e);
                }
                AttackTarget::Ground(p) => {
                    unit.state = UnitState::AttackMoving;
                    unit.target_pos = Some(*p);
                }
            }
        }
    }
}
