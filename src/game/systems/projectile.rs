//! Projectile System
//!
//! Flies projectiles toward their targets and lands damage on impact.
//! Homing shots track their target's current position; ground shots fly to
//! a fixed point and splash.

use crate::core::fixed::{fixed_div, fixed_mul, from_int};
use crate::world::tag;

use crate::game::events::EventBus;
use crate::game::{SimCtx, System};

use super::combat::deal_damage;

/// Advances projectiles and applies impact damage.
pub struct ProjectileSystem;

impl System for ProjectileSystem {
    fn name(&self) -> &'static str {
        "projectile"
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, bus: &mut EventBus) {
        let dt = fixed_div(
            crate::core::fixed::FIXED_ONE,
            from_int(ctx.options.tick_rate as i32),
        );

        let ids = ctx.world.entities_with(tag::PROJECTILE | tag::TRANSFORM);
        for id in ids {
            let Some(projectile) = ctx.world.projectiles.get(&id) else {
                continue;
            };
            let source = projectile.source;
            let damage = projectile.damage;
            let splash = projectile.splash_radius;
            let speed = projectile.speed;
            let homing = projectile.target_entity;

            // Homing shots chase the live target; if it died mid-flight the
            // shot flies on to the last known point and fizzles.
            let goal = match homing.and_then(|t| ctx.world.position_of(t)) {
                Some(p) => {
                    if let Some(projectile) = ctx.world.projectiles.get_mut(&id) {
                        projectile.target_pos = p;
                    }
                    p
                }
                None => projectile.target_pos,
            };

            let Some(pos) = ctx.world.position_of(id) else {
                continue;
            };
            let step = fixed_mul(speed, dt);
            let dist_sq = pos.distance_squared(goal);

            if dist_sq > fixed_mul(step, step) {
                let next = pos + pos.direction_to(goal).scale(step);
                ctx.world.move_entity(id, next);
                continue;
            }

            // Impact.
            if splash > 0 {
                let victims = ctx.world.unit_grid.query_radius(goal, splash);
                let splash_sq = fixed_mul(splash, splash);
                for victim in victims {
                    if victim == id || ctx.world.projectiles.contains_key(&victim) {
                        continue;
                    }
                    let Some(vpos) = ctx.world.position_of(victim) else {
                        continue;
                    };
                    if vpos.distance_squared(goal) <= splash_sq {
                        deal_damage(ctx, bus, victim, damage, Some(source));
                    }
                }
                // Splash also clips buildings near the point.
                let structures = ctx.world.building_grid.query_radius(goal, splash);
                for victim in structures {
                    let Some(vpos) = ctx.world.position_of(victim) else {
                        continue;
                    };
                    if ctx.world.healths.contains_key(&victim)
                        && vpos.distance_squared(goal) <= splash_sq
                    {
                        deal_damage(ctx, bus, victim, damage, Some(source));
                    }
                }
            } else if let Some(target) = homing {
                if ctx.world.healths.contains_key(&target) {
                    deal_damage(ctx, bus, target, damage, Some(source));
                }
            }
            ctx.world.mark_destroyed(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::{from_int, to_fixed};
    use crate::core::vec2::FixedVec2;
    use crate::game::command::CommandQueue;
    use crate::game::config::MatchOptions;
    use crate::world::components::Projectile;
    use crate::world::entity::PlayerId;
    use crate::world::kinds::UnitKind;
    use crate::world::terrain::TerrainGrid;
    use crate::world::World;

    fn fixture() -> (World, CommandQueue, MatchOptions) {
        let mut w = World::new(TerrainGrid::new(64, 64), 3);
        w.add_player(PlayerId(0));
        w.add_player(PlayerId(1));
        (w, CommandQueue::new(), MatchOptions::default())
    }

    fn run(world: &mut World, queue: &mut CommandQueue, options: &MatchOptions, n: u32) {
        let mut bus = EventBus::new();
        let mut system = ProjectileSystem;
        for _ in 0..n {
            world.tick += 1;
            let mut ctx = SimCtx {
                world,
                queue,
                options,
            };
            system.update(&mut ctx, &mut bus);
            world.flush_destroyed();
        }
    }

    #[test]
    fn test_homing_shot_lands() {
        let (mut world, mut queue, options) = fixture();
        let shooter =
            world.spawn_unit(UnitKind::Trooper, PlayerId(0), FixedVec2::from_cell(10, 10));
        let target =
            world.spawn_unit(UnitKind::Trooper, PlayerId(1), FixedVec2::from_cell(14, 10));

        let start_health = world.healths.get(&target).unwrap().current;
        world.spawn_projectile(
            FixedVec2::from_cell(10, 10),
            Projectile {
                source: shooter,
                target_entity: Some(target),
                target_pos: FixedVec2::from_cell(14, 10),
                damage: from_int(6),
                splash_radius: 0,
                speed: to_fixed(12.0),
            },
        );

        run(&mut world, &mut queue, &options, 20);

        assert!(world.projectiles.is_empty(), "projectile consumed");
        assert_eq!(
            world.healths.get(&target).unwrap().current,
            start_health - from_int(6)
        );
    }

    #[test]
    fn test_shot_fizzles_when_target_dies() {
        let (mut world, mut queue, options) = fixture();
        let shooter =
            world.spawn_unit(UnitKind::Trooper, PlayerId(0), FixedVec2::from_cell(10, 10));
        let target =
            world.spawn_unit(UnitKind::Trooper, PlayerId(1), FixedVec2::from_cell(14, 10));

        world.spawn_projectile(
            FixedVec2::from_cell(10, 10),
            Projectile {
                source: shooter,
                target_entity: Some(target),
                target_pos: FixedVec2::from_cell(14, 10),
                damage: from_int(6),
                splash_radius: 0,
                speed: to_fixed(12.0),
            },
        );
        world.mark_destroyed(target);
        world.flush_destroyed();

        run(&mut world, &mut queue, &options, 20);
        assert!(world.projectiles.is_empty(), "fizzled without a target");
    }

    #[test]
    fn test_ground_splash_hits_area() {
        let (mut world, mut queue, options) = fixture();
        let shooter =
            world.spawn_unit(UnitKind::Arbalest, PlayerId(0), FixedVec2::from_cell(5, 5));
        let near =
            world.spawn_unit(UnitKind::Trooper, PlayerId(1), FixedVec2::from_cell(20, 10));
        let far =
            world.spawn_unit(UnitKind::Trooper, PlayerId(1), FixedVec2::from_cell(26, 10));

        world.spawn_projectile(
            FixedVec2::from_cell(5, 5),
            Projectile {
                source: shooter,
                target_entity: None,
                target_pos: FixedVec2::from_cell(20, 10),
                damage: from_int(10),
                splash_radius: to_fixed(1.5),
                speed: to_fixed(12.0),
            },
        );

        let near_start = world.healths.get(&near).unwrap().current;
        let far_start = world.healths.get(&far).unwrap().current;
        run(&mut world, &mut queue, &options, 40);

        assert!(world.healths.get(&near).unwrap().current < near_start);
        assert_eq!(world.healths.get(&far).unwrap().current, far_start);
    }
}
