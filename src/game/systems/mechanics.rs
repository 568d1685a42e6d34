//! Building Mechanics
//!
//! Building state machines: construction progress, lift-off, flight and
//! landing. Walls need no logic of their own - their footprint occupancy
//! does the blocking - but their integrity lives here conceptually with the
//! rest of the structure rules.

use crate::core::fixed::{fixed_div, from_int, FIXED_ONE};
use crate::world::components::{BuildingState, ResourceKind};
use crate::world::kinds::BuildingKind;
use crate::world::tag;

use crate::game::command::CommandKind;
use crate::game::events::{EventBus, GameEvent};
use crate::game::{SimCtx, System};

/// Ticks a lift-off or landing transition takes.
const TRANSITION_TICKS: u32 = 40;

/// Advances building state machines.
pub struct MechanicsSystem;

impl System for MechanicsSystem {
    fn name(&self) -> &'static str {
        "mechanics"
    }

    fn subscribe(&self, bus: &mut EventBus) {
        bus.on("command:liftoff", handle_liftoff);
        bus.on("command:land", handle_land);
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, bus: &mut EventBus) {
        let ids = ctx.world.entities_with(tag::BUILDING | tag::TRANSFORM);
        for id in ids {
            let Some(building) = ctx.world.buildings.get(&id) else {
                continue;
            };
            let (state, kind) = (building.state, building.kind);
            match state {
                BuildingState::Constructing => {
                    let stats = kind.stats();
                    let step = fixed_div(FIXED_ONE, from_int(stats.build_ticks.max(1) as i32));
                    let Some(building) = ctx.world.buildings.get_mut(&id) else {
                        continue;
                    };
                    building.build_progress = (building.build_progress + step).min(FIXED_ONE);
                    let done = building.build_progress >= FIXED_ONE;

                    // Health scales up with progress.
                    if let Some(health) = ctx.world.healths.get_mut(&id) {
                        let gain = fixed_div(stats.max_health, from_int(stats.build_ticks.max(1) as i32));
                        health.current = (health.current + gain).min(health.max);
                        if done {
                            health.current = health.max;
                        }
                    }

                    if done {
                        complete_building(ctx, bus, id);
                    }
                }
                BuildingState::Lifting => {
                    let Some(building) = ctx.world.buildings.get_mut(&id) else {
                        continue;
                    };
                    building.transition_ticks += 1;
                    if building.transition_ticks >= TRANSITION_TICKS {
                        building.transition_ticks = 0;
                        building.state = BuildingState::Flying;
                        let (w, h) = (building.width, building.height);
                        // The footprint frees up once airborne.
                        if let Some(t) = ctx.world.transforms.get(&id) {
                            let (cx, cy) = t.position.cell();
                            ctx.world.terrain.set_occupied(cx, cy, w, h, false);
                        }
                    }
                }
                BuildingState::Landing => {
                    let Some(building) = ctx.world.buildings.get_mut(&id) else {
                        continue;
                    };
                    building.transition_ticks += 1;
                    if building.transition_ticks >= TRANSITION_TICKS {
                        building.transition_ticks = 0;
                        let (w, h) = (building.width, building.height);
                        let Some((cx, cy)) = building.land_cell.take() else {
                            building.state = BuildingState::Flying;
                            continue;
                        };
                        building.state = BuildingState::Complete;

                        let pos = crate::core::vec2::FixedVec2::from_cell(cx, cy);
                        ctx.world.terrain.set_occupied(cx, cy, w, h, true);
                        if let Some(t) = ctx.world.transforms.get_mut(&id) {
                            t.position = pos;
                        }
                        ctx.world.building_grid.update(id, pos);
                    }
                }
                BuildingState::Complete | BuildingState::Flying => {}
            }
        }
    }
}

/// Finish construction: operational state, supply grant, geyser link,
/// completion event.
fn complete_building(ctx: &mut SimCtx<'_>, bus: &mut EventBus, id: crate::world::entity::EntityId) {
    let Some(building) = ctx.world.buildings.get_mut(&id) else {
        return;
    };
    building.state = BuildingState::Complete;
    let kind = building.kind;
    let stats = kind.stats();

    let Some(player) = ctx.world.owner_of(id) else {
        return;
    };
    if stats.supply_provided > 0 {
        if let Some(economy) = ctx.world.players.get_mut(&player) {
            economy.supply_cap = economy.supply_cap.saturating_add(stats.supply_provided);
        }
    }

    // A completed extractor claims any unclaimed geyser under it.
    if kind == BuildingKind::Extractor {
        if let Some(pos) = ctx.world.position_of(id) {
            let (cx, cy) = pos.cell();
            let geysers = ctx
                .world
                .building_grid
                .query_rect_cells(cx, cy, cx + stats.width as i32, cy + stats.height as i32);
            for g in geysers {
                if let Some(node) = ctx.world.resources.get_mut(&g) {
                    if node.kind == ResourceKind::Vespene && node.extractor.is_none() {
                        node.extractor = Some(id);
                        break;
                    }
                }
            }
        }
    }

    bus.emit(ctx, &GameEvent::BuildingCompleted { id, kind, player });
}

/// `command:liftoff`
pub fn handle_liftoff(ctx: &mut SimCtx<'_>, event: &GameEvent) {
    let GameEvent::Command(command) = event else {
        return;
    };
    let CommandKind::LiftOff { building } = &command.kind else {
        return;
    };
    if let Some(b) = ctx.world.buildings.get_mut(building) {
        if b.state == BuildingState::Complete && b.kind.stats().can_lift {
            b.state = BuildingState::Lifting;
            b.transition_ticks = 0;
        }
    }
}

/// `command:land`
pub fn handle_land(ctx: &mut SimCtx<'_>, event: &GameEvent) {
    let GameEvent::Command(command) = event else {
        return;
    };
    let CommandKind::Land { building, cell } = &command.kind else {
        return;
    };
    let Some(b) = ctx.world.buildings.get(building) else {
        return;
    };
    if b.state != BuildingState::Flying {
        return;
    }
    // The target footprint must be clear before descent begins.
    if !super::placement::footprint_buildable(ctx.world, b.kind, cell.0, cell.1)
        && b.kind != BuildingKind::Extractor
    {
        return;
    }
    if let Some(b) = ctx.world.buildings.get_mut(building) {
        b.state = BuildingState::Landing;
        b.land_cell = Some(*cell);
        b.transition_ticks = 0;
    }
}
