//! Vision System
//!
//! Rebuilds per-player fog-of-war after movement has settled, so visibility
//! always reflects current positions. Vision is derived state: it is
//! recomputed from scratch each tick and never hashed.

use crate::core::fixed::to_int_floor;
use crate::world::tag;

use crate::game::events::EventBus;
use crate::game::{SimCtx, System};

/// Recomputes [`crate::world::VisionMap`] each tick.
pub struct VisionSystem;

impl System for VisionSystem {
    fn name(&self) -> &'static str {
        "vision"
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, _bus: &mut EventBus) {
        let world = &mut *ctx.world;
        let width = world.terrain.width();
        let height = world.terrain.height();
        let players: Vec<_> = world.players.keys().copied().collect();

        let mut vision = std::mem::take(&mut world.vision);
        vision.reset(width, height, players.iter().copied());

        // Units and buildings reveal a disc of their sight range.
        let ids = world.entities_with(tag::TRANSFORM | tag::SELECTABLE);
        for id in ids {
            let Some(owner) = world.owner_of(id) else {
                continue;
            };
            if !owner.is_player() {
                continue;
            }
            let sight = if let Some(unit) = world.units.get(&id) {
                unit.sight_range
            } else if let Some(building) = world.buildings.get(&id) {
                building.kind.stats().sight_range
            } else {
                continue;
            };
            let Some(pos) = world.position_of(id) else {
                continue;
            };

            reveal_disc(&mut vision, owner, pos.cell(), to_int_floor(sight));
        }

        // Neutral watch towers grant their (large) sight disc to any player
        // with a unit standing close by.
        for (&tower, building) in &world.buildings {
            if building.kind != crate::world::kinds::BuildingKind::WatchTower {
                continue;
            }
            let Some(tower_pos) = world.position_of(tower) else {
                continue;
            };
            let sight = to_int_floor(building.kind.stats().sight_range);
            let nearby = world
                .unit_grid
                .query_radius(tower_pos, crate::core::fixed::from_int(3));
            for id in nearby {
                if !world.units.contains_key(&id) {
                    continue;
                }
                let Some(owner) = world.owner_of(id) else {
                    continue;
                };
                if owner.is_player() {
                    reveal_disc(&mut vision, owner, tower_pos.cell(), sight);
                }
            }
        }

        world.vision = vision;
    }
}

fn reveal_disc(
    vision: &mut crate::world::VisionMap,
    owner: crate::world::entity::PlayerId,
    center: (i32, i32),
    r: i32,
) {
    let (cx, cy) = center;
    let r_sq = r * r;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r_sq {
                vision.reveal(owner, cx + dx, cy + dy);
            }
        }
    }
}
