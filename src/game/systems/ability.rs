//! Ability System
//!
//! Per-unit active abilities: cooldown bookkeeping (cooldowns only ever
//! decrease between casts), energy regeneration, and effect application.
//! Delayed effects are never timers on the side - a barrage is a slow
//! projectile entity, so its impact is plain world state that hashes and
//! snapshots like everything else.

use crate::core::fixed::{from_int, to_fixed, Fixed};
use crate::world::components::Projectile;
use crate::world::kinds::AbilityId;
use crate::world::tag;

use crate::game::command::CommandKind;
use crate::game::events::{EventBus, GameEvent};
use crate::game::{SimCtx, System};

/// Energy regenerated per tick.
const ENERGY_REGEN: Fixed = to_fixed(0.05);

/// Barrage flight speed (slow arc; the travel time is the impact delay).
const BARRAGE_SPEED: Fixed = to_fixed(4.0);

/// Barrage damage on impact.
const BARRAGE_DAMAGE: Fixed = from_int(20);

/// Barrage splash radius.
const BARRAGE_SPLASH: Fixed = to_fixed(1.5);

/// Runs ability bookkeeping and effects.
pub struct AbilitySystem;

impl System for AbilitySystem {
    fn name(&self) -> &'static str {
        "ability"
    }

    fn subscribe(&self, bus: &mut EventBus) {
        bus.on("command:ability", handle_ability);
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, _bus: &mut EventBus) {
        let ids = ctx.world.entities_with(tag::ABILITY);
        for id in ids {
            let Some(ability) = ctx.world.abilities.get_mut(&id) else {
                continue;
            };
            for remaining in ability.cooldowns.values_mut() {
                *remaining = remaining.saturating_sub(1);
            }
            ability.energy = (ability.energy + ENERGY_REGEN).min(ability.max_energy);
        }

        // Overdrive decay.
        for unit in ctx.world.units.values_mut() {
            unit.overdrive_ticks = unit.overdrive_ticks.saturating_sub(1);
        }
    }
}

/// `command:ability`
pub fn handle_ability(ctx: &mut SimCtx<'_>, event: &GameEvent) {
    let GameEvent::Command(command) = event else {
        return;
    };
    let CommandKind::UseAbility {
        unit,
        ability,
        target,
    } = &command.kind
    else {
        return;
    };

    let Some(pool) = ctx.world.abilities.get(unit) else {
        return;
    };
    if !pool.ready(*ability) {
        return;
    }
    let stats = ability.stats();

    match ability {
        AbilityId::Overdrive => {
            let Some(u) = ctx.world.units.get_mut(unit) else {
                return;
            };
            u.overdrive_ticks = stats.duration;
        }
        AbilityId::Barrage => {
            let Some(target) = target else {
                return;
            };
            let Some(pos) = ctx.world.position_of(*unit) else {
                return;
            };
            let projectile = Projectile {
                source: *unit,
                target_entity: None,
                target_pos: *target,
                damage: BARRAGE_DAMAGE,
                splash_radius: BARRAGE_SPLASH,
                speed: BARRAGE_SPEED,
            };
            ctx.world.spawn_projectile(pos, projectile);
        }
    }

    let Some(pool) = ctx.world.abilities.get_mut(unit) else {
        return;
    };
    pool.energy -= stats.energy_cost;
    pool.cooldowns.insert(*ability, stats.cooldown);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::FixedVec2;
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

    fn ability_event(unit: crate::world::entity::EntityId, ability: AbilityId) -> GameEvent {
        GameEvent::Command(GameCommand {
            tick: 1,
            player: PlayerId(0),
            kind: CommandKind::UseAbility {
                unit,
                ability,
                target: Some(FixedVec2::from_cell(20, 20)),
            },
        })
    }

    #[test]
    fn test_overdrive_costs_energy_and_sets_cooldown() {
        let (mut world, mut queue, options) = fixture();
        let u = world.spawn_unit(UnitKind::Trooper, PlayerId(0), FixedVec2::from_cell(5, 5));
        world.abilities.get_mut(&u).unwrap().energy = from_int(100);

        let mut ctx = SimCtx {
            world: &mut world,
            queue: &mut queue,
            options: &options,
        };
        handle_ability(&mut ctx, &ability_event(u, AbilityId::Overdrive));

        assert!(world.units.get(&u).unwrap().overdrive_ticks > 0);
        let pool = world.abilities.get(&u).unwrap();
        assert_eq!(pool.energy, from_int(75));
        assert_eq!(
            pool.cooldowns.get(&AbilityId::Overdrive),
            Some(&AbilityId::Overdrive.stats().cooldown)
        );

        // On cooldown: a second cast is refused.
        let mut ctx = SimCtx {
            world: &mut world,
            queue: &mut queue,
            options: &options,
        };
        handle_ability(&mut ctx, &ability_event(u, AbilityId::Overdrive));
        assert_eq!(world.abilities.get(&u).unwrap().energy, from_int(75));
    }

    #[test]
    fn test_barrage_spawns_delayed_projectile() {
        let (mut world, mut queue, options) = fixture();
        let u = world.spawn_unit(UnitKind::Arbalest, PlayerId(0), FixedVec2::from_cell(5, 5));
        world.abilities.get_mut(&u).unwrap().energy = from_int(100);

        let mut ctx = SimCtx {
            world: &mut world,
            queue: &mut queue,
            options: &options,
        };
        handle_ability(&mut ctx, &ability_event(u, AbilityId::Barrage));

        assert_eq!(world.projectiles.len(), 1);
        let p = world.projectiles.values().next().unwrap();
        assert!(p.splash_radius > 0);
        assert!(p.target_entity.is_none());
    }

    #[test]
    fn test_cooldowns_monotonically_decrease() {
        let (mut world, mut queue, options) = fixture();
        let u = world.spawn_unit(UnitKind::Trooper, PlayerId(0), FixedVec2::from_cell(5, 5));
        world
            .abilities
            .get_mut(&u)
            .unwrap()
            .cooldowns
            .insert(AbilityId::Overdrive, 10);

        let mut system = AbilitySystem;
        let mut bus = EventBus::new();
        let mut last = 10;
        for _ in 0..12 {
            let mut ctx = SimCtx {
                world: &mut world,
                queue: &mut queue,
                options: &options,
            };
            system.update(&mut ctx, &mut bus);
            let now = *world
                .abilities
                .get(&u)
                .unwrap()
                .cooldowns
                .get(&AbilityId::Overdrive)
                .unwrap();
            assert!(now <= last);
            last = now;
        }
        assert_eq!(last, 0);
    }
}
