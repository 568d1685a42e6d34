//! Building Placement
//!
//! Routes workers to construction sites and validates footprints when they
//! arrive: every cell buildable, aligned to the integer grid, resources
//! charged at ground-break. Extractors additionally require a vespene
//! geyser inside the footprint.

use crate::core::fixed::{to_fixed, Fixed};
use crate::core::vec2::FixedVec2;
use crate::world::components::{ResourceKind, UnitState};
use crate::world::entity::EntityId;
use crate::world::kinds::BuildingKind;
use crate::world::tag;
use crate::world::World;

use crate::game::command::CommandKind;
use crate::game::events::{EventBus, GameEvent};
use crate::game::{SimCtx, System};

/// How close a worker must be to the footprint center to break ground.
const BUILD_REACH: Fixed = to_fixed(2.5);

/// Whether a footprint at `(cx, cy)` is fully buildable.
pub fn footprint_buildable(world: &World, kind: BuildingKind, cx: i32, cy: i32) -> bool {
    let stats = kind.stats();
    for y in cy..cy + stats.height as i32 {
        for x in cx..cx + stats.width as i32 {
            if !world.terrain.buildable(x, y) {
                return false;
            }
        }
    }
    if kind == BuildingKind::Extractor {
        return geyser_in_footprint(world, cx, cy, stats.width, stats.height).is_some();
    }
    true
}

/// The vespene geyser inside a footprint, if any.
pub fn geyser_in_footprint(
    world: &World,
    cx: i32,
    cy: i32,
    w: u8,
    h: u8,
) -> Option<EntityId> {
    let candidates = world
        .building_grid
        .query_rect_cells(cx - 1, cy - 1, cx + w as i32, cy + h as i32);
    candidates.into_iter().find(|id| {
        world
            .resources
            .get(id)
            .map(|r| r.kind == ResourceKind::Vespene && r.extractor.is_none())
            .unwrap_or(false)
            && world
                .position_of(*id)
                .map(|p| {
                    let (x, y) = p.cell();
                    x >= cx && x < cx + w as i32 && y >= cy && y < cy + h as i32
                })
                .unwrap_or(false)
    })
}

/// Center of a footprint in world coordinates.
pub fn footprint_center(kind: BuildingKind, cx: i32, cy: i32) -> FixedVec2 {
    let stats = kind.stats();
    let mut center = FixedVec2::from_cell(cx, cy);
    center.x += (stats.width as i32) << 15; // width/2 in Q16.16
    center.y += (stats.height as i32) << 15;
    center
}

/// Routes workers to sites and breaks ground on arrival.
pub struct PlacementSystem;

impl System for PlacementSystem {
    fn name(&self) -> &'static str {
        "building-placement"
    }

    fn subscribe(&self, bus: &mut EventBus) {
        bus.on("command:build", handle_build);
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, bus: &mut EventBus) {
        let workers = ctx.world.entities_with(tag::UNIT | tag::TRANSFORM);
        for id in workers {
            let Some(unit) = ctx.world.units.get(&id) else {
                continue;
            };
            let Some((kind, (cx, cy))) = unit.pending_build else {
                continue;
            };
            if unit.state != UnitState::Building {
                continue;
            }
            let Some(pos) = ctx.world.position_of(id) else {
                continue;
            };
            let center = footprint_center(kind, cx, cy);
            let reach_sq = crate::core::fixed::fixed_mul(BUILD_REACH, BUILD_REACH);
            if pos.distance_squared(center) > reach_sq {
                continue; // still walking
            }

            let Some(player) = ctx.world.owner_of(id) else {
                continue;
            };

            // Validate and charge at ground-break, not at order time - the
            // site may have been built over in the meantime.
            let stats = kind.stats();
            let affordable = ctx
                .world
                .players
                .get(&player)
                .map(|e| e.can_afford(stats.minerals, stats.vespene))
                .unwrap_or(false);

            if !footprint_buildable(ctx.world, kind, cx, cy) || !affordable {
                if let Some(unit) = ctx.world.units.get_mut(&id) {
                    unit.clear_orders();
                }
                bus.emit(
                    ctx,
                    &GameEvent::SystemFailure {
                        system: "building-placement",
                        detail: format!("placement of {:?} at ({}, {}) rejected", kind, cx, cy),
                    },
                );
                continue;
            }

            if let Some(economy) = ctx.world.players.get_mut(&player) {
                economy.spend(stats.minerals, stats.vespene);
            }
            let building = ctx.world.spawn_building(kind, player, cx, cy, false);

            // Extractors claim their geyser by id - the geyser points back
            // via `extractor`, never via a live reference.
            if kind == BuildingKind::Extractor {
                if let Some(geyser) =
                    geyser_in_footprint(ctx.world, cx, cy, stats.width, stats.height)
                {
                    if let Some(node) = ctx.world.resources.get_mut(&geyser) {
                        node.extractor = Some(building);
                    }
                }
            }

            if let Some(unit) = ctx.world.units.get_mut(&id) {
                unit.clear_orders();
            }
        }
    }
}

/// `command:build`
pub fn handle_build(ctx: &mut SimCtx<'_>, event: &GameEvent) {
    let GameEvent::Command(command) = event else {
        return;
    };
    let CommandKind::Build {
        worker,
        building,
        cell,
    } = &command.kind
    else {
        return;
    };
    let center = footprint_center(*building, cell.0, cell.1);
    if let Some(unit) = ctx.world.units.get_mut(worker) {
        if !unit.is_worker {
            return;
        }
        unit.clear_orders();
        unit.state = UnitState::Building;
        unit.pending_build = Some((*building, *cell));
        unit.target_pos = Some(center);
    }
}

/// Deterministic spiral search for a buildable footprint near an anchor
/// cell. Used by the AI; the editor uses its own placement preview.
pub fn find_build_spot(
    world: &World,
    kind: BuildingKind,
    anchor: (i32, i32),
    max_radius: i32,
) -> Option<(i32, i32)> {
    if footprint_buildable(world, kind, anchor.0, anchor.1) {
        return Some(anchor);
    }
    for radius in 1..=max_radius {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx.abs() != radius && dy.abs() != radius {
                    continue;
                }
                let cell = (anchor.0 + dx, anchor.1 + dy);
                if footprint_buildable(world, kind, cell.0, cell.1) {
                    return Some(cell);
                }
            }
        }
    }
    None
}
