//! Strategic AI
//!
//! Per-player state machine over {building, expanding, attacking,
//! defending, scouting, harassing}, evaluated on a difficulty-scaled
//! cadence. Priority: defending beats attacking (which is sticky while the
//! army lives), then harassing, expanding, scouting, and base building as
//! the default.
//!
//! Macro runs off a declarative build order; a step that keeps failing is
//! eventually skipped and logged rather than wedging the whole machine.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::core::fixed::{fixed_mul, from_int};
use crate::world::components::UnitState;
use crate::world::entity::{EntityId, PlayerId};
use crate::world::kinds::{BuildingKind, UnitKind};
use crate::world::World;

use crate::game::command::{AttackTarget, CommandKind};
use crate::game::events::EventBus;
use crate::game::{SimCtx, System};

use super::{ai_players, army_units, base_position, first_enemy, issue, workers};
use crate::game::systems::placement::find_build_spot;

/// Consecutive failed attempts before a build-order step is skipped.
const FAIL_SKIP_THRESHOLD: u32 = 40;

/// Enemy distance (cells) from a building that counts as a threat.
const THREAT_RANGE: i32 = 12;

/// AI strategic posture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AiMode {
    /// Executing the build order / macro.
    Building,
    /// Taking a second base.
    Expanding,
    /// Committed offense toward the enemy base.
    Attacking,
    /// Rallying the army to a threatened building.
    Defending,
    /// Sending a unit to find the enemy.
    Scouting,
    /// Small fast squad poking the enemy base.
    Harassing,
}

/// One declarative build-order step.
struct BuildStep {
    /// What to produce.
    item: BuildItem,
    /// Execute only at or above this supply usage.
    supply_gate: Option<u16>,
    /// Extra gating predicate.
    predicate: Option<fn(&World, PlayerId) -> bool>,
}

enum BuildItem {
    /// Train a unit from a building kind.
    Train(UnitKind, BuildingKind),
    /// Construct a building.
    Construct(BuildingKind),
}

fn has_building(world: &World, player: PlayerId, kind: BuildingKind) -> bool {
    world
        .buildings
        .iter()
        .any(|(id, b)| b.kind == kind && world.owner_of(*id) == Some(player))
}

/// The opening book. Executed in order; failures retry next decision.
fn build_order() -> Vec<BuildStep> {
    use BuildItem::*;
    use BuildingKind::*;
    use UnitKind::*;
    vec![
        BuildStep { item: Train(Scavenger, Headquarters), supply_gate: None, predicate: None },
        BuildStep { item: Train(Scavenger, Headquarters), supply_gate: None, predicate: None },
        BuildStep { item: Construct(Depot), supply_gate: Some(7), predicate: None },
        BuildStep { item: Construct(Barracks), supply_gate: None, predicate: None },
        BuildStep {
            item: Train(Trooper, Barracks),
            supply_gate: None,
            predicate: Some(|w, p| has_building(w, p, Barracks)),
        },
        BuildStep { item: Train(Trooper, Barracks), supply_gate: None, predicate: None },
        BuildStep { item: Construct(Depot), supply_gate: Some(14), predicate: None },
        BuildStep { item: Train(Trooper, Barracks), supply_gate: None, predicate: None },
        BuildStep { item: Train(Ravager, Barracks), supply_gate: None, predicate: None },
        BuildStep { item: Construct(Forge), supply_gate: None, predicate: None },
        BuildStep { item: Construct(Turret), supply_gate: None, predicate: None },
        BuildStep { item: Train(Arbalest, Barracks), supply_gate: None, predicate: None },
    ]
}

/// Counter-composition matrix: what to train against the observed enemy
/// majority. Consulted by Hard and above.
fn counter_for(majority: UnitKind) -> UnitKind {
    match majority {
        UnitKind::Scavenger => UnitKind::Ravager,
        UnitKind::Trooper => UnitKind::Ravager,
        UnitKind::Ravager => UnitKind::Trooper,
        UnitKind::Arbalest => UnitKind::Ravager,
        UnitKind::Skywing => UnitKind::Trooper,
    }
}

/// Majority enemy combat unit kind, ties to the lower kind id.
fn enemy_majority(world: &World, player: PlayerId) -> Option<UnitKind> {
    let mut counts: BTreeMap<UnitKind, u32> = BTreeMap::new();
    for (id, unit) in &world.units {
        if unit.is_worker {
            continue;
        }
        match world.owner_of(*id) {
            Some(owner) if owner != player && owner.is_player() => {
                *counts.entry(unit.kind).or_default() += 1;
            }
            _ => {}
        }
    }
    counts
        .into_iter()
        .max_by_key(|(kind, n)| (*n, std::cmp::Reverse(*kind as u8)))
        .map(|(kind, _)| kind)
}

struct PlayerBrain {
    mode: AiMode,
    build_index: usize,
    fail_count: u32,
    enemy_seen: bool,
}

impl PlayerBrain {
    fn new() -> Self {
        Self {
            mode: AiMode::Building,
            build_index: 0,
            fail_count: 0,
            enemy_seen: false,
        }
    }
}

/// The strategic state machine system.
pub struct AiStrategicSystem {
    brains: BTreeMap<PlayerId, PlayerBrain>,
}

impl AiStrategicSystem {
    /// New system; brains materialize on first decision.
    pub fn new() -> Self {
        Self {
            brains: BTreeMap::new(),
        }
    }

    /// Current mode for a player (tests/inspection).
    pub fn mode(&self, player: PlayerId) -> Option<AiMode> {
        self.brains.get(&player).map(|b| b.mode)
    }
}

impl Default for AiStrategicSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for AiStrategicSystem {
    fn name(&self) -> &'static str {
        "ai-strategic"
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, _bus: &mut EventBus) {
        let cadence = ctx.options.ai_difficulty.decision_cadence();
        let tick = ctx.world.tick;

        for player in ai_players(ctx) {
            // Stagger players across ticks; the offset is the slot id, so
            // every peer staggers identically.
            if (tick + player.0 as u32) % cadence != 0 {
                continue;
            }
            let brain = self.brains.entry(player).or_insert_with(PlayerBrain::new);
            decide(ctx, player, brain);
        }
    }
}

/// One decision pass for one player.
fn decide(ctx: &mut SimCtx<'_>, player: PlayerId, brain: &mut PlayerBrain) {
    let world = &*ctx.world;
    let army = army_units(world, player);
    let enemy = first_enemy(world, player);
    let enemy_base = enemy.and_then(|e| base_position(world, e));
    let threat = nearest_threat(world, player);

    if !brain.enemy_seen {
        brain.enemy_seen = enemy_visible(world, player);
    }

    let attack_threshold = match ctx.options.ai_difficulty {
        crate::game::config::AiDifficulty::Easy => 12,
        crate::game::config::AiDifficulty::Medium => 10,
        crate::game::config::AiDifficulty::Hard => 8,
        crate::game::config::AiDifficulty::VeryHard => 6,
        crate::game::config::AiDifficulty::Insane => 5,
    };

    // Priority ladder.
    let next_mode = if threat.is_some() {
        AiMode::Defending
    } else if brain.mode == AiMode::Attacking && army.len() >= 2 {
        // Sticky while the push lives.
        AiMode::Attacking
    } else if army.len() >= attack_threshold && enemy_base.is_some() {
        AiMode::Attacking
    } else if ctx.options.ai_difficulty >= crate::game::config::AiDifficulty::VeryHard
        && army.len() >= 4
        && enemy_base.is_some()
    {
        AiMode::Harassing
    } else if should_expand(world, player) {
        AiMode::Expanding
    } else if !brain.enemy_seen && !army.is_empty() {
        AiMode::Scouting
    } else {
        AiMode::Building
    };

    if next_mode != brain.mode {
        debug!(player = %player, from = ?brain.mode, to = ?next_mode, "ai mode change");
        brain.mode = next_mode;
    }

    match brain.mode {
        AiMode::Defending => {
            if let Some(threat_pos) = threat {
                if !army.is_empty() {
                    issue(
                        ctx,
                        player,
                        CommandKind::Attack {
                            units: army,
                            target: AttackTarget::Ground(threat_pos),
                        },
                    );
                }
            }
        }
        AiMode::Attacking => {
            if let (Some(target), false) = (enemy_base, army.is_empty()) {
                issue(
                    ctx,
                    player,
                    CommandKind::Attack {
                        units: army,
                        target: AttackTarget::Ground(target),
                    },
                );
            }
        }
        AiMode::Harassing => {
            if let Some(target) = enemy_base {
                let squad: Vec<EntityId> = army.into_iter().take(2).collect();
                if !squad.is_empty() {
                    issue(
                        ctx,
                        player,
                        CommandKind::Attack {
                            units: squad,
                            target: AttackTarget::Ground(target),
                        },
                    );
                }
            }
        }
        AiMode::Expanding => {
            try_expand(ctx, player, brain);
        }
        AiMode::Scouting => {
            // Send one unit toward a stochastic enemy base guess; the draw
            // comes from the tick-reseeded stream, so all peers guess alike.
            let mut rng = ctx.world.tick_rng(player.0 as u64);
            if let Some(scout) = army.first().copied() {
                let w = ctx.world.terrain.width() as i32;
                let h = ctx.world.terrain.height() as i32;
                let corners = [
                    (8, 8),
                    (w - 8, 8),
                    (8, h - 8),
                    (w - 8, h - 8),
                ];
                let guess = corners[rng.next_int(4) as usize];
                issue(
                    ctx,
                    player,
                    CommandKind::Move {
                        units: vec![scout],
                        target: crate::core::vec2::FixedVec2::from_cell(guess.0, guess.1),
                    },
                );
            }
        }
        AiMode::Building => {
            run_build_order(ctx, player, brain);
        }
    }
}

fn enemy_visible(world: &World, player: PlayerId) -> bool {
    for (id, _) in world.units.iter() {
        match world.owner_of(*id) {
            Some(owner) if owner != player && owner.is_player() => {
                if let Some(pos) = world.position_of(*id) {
                    let (x, y) = pos.cell();
                    if world.vision.visible(player, x, y) {
                        return true;
                    }
                }
            }
            _ => {}
        }
    }
    false
}

/// Position of the own building closest to an enemy unit, if any enemy is
/// inside the threat range.
fn nearest_threat(world: &World, player: PlayerId) -> Option<crate::core::vec2::FixedVec2> {
    let range_sq = fixed_mul(from_int(THREAT_RANGE), from_int(THREAT_RANGE));
    for (&bid, _) in &world.buildings {
        if world.owner_of(bid) != Some(player) {
            continue;
        }
        let Some(bpos) = world.position_of(bid) else {
            continue;
        };
        let nearby = world.unit_grid.query_radius(bpos, from_int(THREAT_RANGE));
        for enemy in nearby {
            match world.owner_of(enemy) {
                Some(owner)
                    if owner != player
                        && owner.is_player()
                        && world.units.get(&enemy).map(|u| !u.is_worker) == Some(true) =>
                {
                    if let Some(epos) = world.position_of(enemy) {
                        if bpos.distance_squared(epos) <= range_sq {
                            return Some(bpos);
                        }
                    }
                }
                _ => {}
            }
        }
    }
    None
}

fn should_expand(world: &World, player: PlayerId) -> bool {
    let Some(economy) = world.players.get(&player) else {
        return false;
    };
    let hq_count = world
        .buildings
        .iter()
        .filter(|(id, b)| {
            b.kind == BuildingKind::Headquarters && world.owner_of(**id) == Some(player)
        })
        .count();
    economy.minerals > 600 && hq_count < 2
}

fn try_expand(ctx: &mut SimCtx<'_>, player: PlayerId, brain: &mut PlayerBrain) {
    let Some(base) = base_position(ctx.world, player) else {
        return;
    };
    let (bx, by) = base.cell();
    let center = (
        ctx.world.terrain.width() as i32 / 2,
        ctx.world.terrain.height() as i32 / 2,
    );
    // Step toward the map center for the expansion anchor.
    let anchor = ((bx + center.0) / 2, (by + center.1) / 2);
    let Some(spot) = find_build_spot(ctx.world, BuildingKind::Headquarters, anchor, 10) else {
        brain.fail_count += 1;
        return;
    };
    let Some(worker) = idle_worker(ctx.world, player) else {
        brain.fail_count += 1;
        return;
    };
    issue(
        ctx,
        player,
        CommandKind::Build {
            worker,
            building: BuildingKind::Headquarters,
            cell: spot,
        },
    );
}

/// A worker not currently constructing, preferring idle ones.
fn idle_worker(world: &World, player: PlayerId) -> Option<EntityId> {
    let all = workers(world, player);
    all.iter()
        .copied()
        .find(|id| {
            world.units.get(id).map(|u| u.state == UnitState::Idle) == Some(true)
        })
        .or_else(|| {
            all.into_iter().find(|id| {
                world.units.get(id).map(|u| u.state != UnitState::Building) == Some(true)
            })
        })
}

/// Execute the current build-order step, or continuous macro once the book
/// is done.
fn run_build_order(ctx: &mut SimCtx<'_>, player: PlayerId, brain: &mut PlayerBrain) {
    let order = build_order();

    if brain.build_index >= order.len() {
        continuous_macro(ctx, player);
        return;
    }
    let step = &order[brain.build_index];

    if let Some(gate) = step.supply_gate {
        let used = ctx
            .world
            .players
            .get(&player)
            .map(|e| e.supply_used)
            .unwrap_or(0);
        if used < gate {
            return; // waiting, not failing
        }
    }
    if let Some(predicate) = step.predicate {
        if !predicate(ctx.world, player) {
            bump_failure(brain, player);
            return;
        }
    }

    let succeeded = match &step.item {
        BuildItem::Train(unit, trainer) => try_train(ctx, player, *unit, *trainer),
        BuildItem::Construct(kind) => try_construct(ctx, player, *kind),
    };

    if succeeded {
        brain.build_index += 1;
        brain.fail_count = 0;
    } else {
        bump_failure(brain, player);
    }
}

fn bump_failure(brain: &mut PlayerBrain, player: PlayerId) {
    brain.fail_count += 1;
    if brain.fail_count > FAIL_SKIP_THRESHOLD {
        warn!(
            player = %player,
            step = brain.build_index,
            "build-order step stuck, skipping"
        );
        brain.build_index += 1;
        brain.fail_count = 0;
    }
}

fn try_train(
    ctx: &mut SimCtx<'_>,
    player: PlayerId,
    unit: UnitKind,
    trainer: BuildingKind,
) -> bool {
    let stats = unit.stats();
    let affordable = ctx
        .world
        .players
        .get(&player)
        .map(|e| e.can_afford(stats.minerals, stats.vespene))
        .unwrap_or(false);
    if !affordable {
        return false;
    }
    let building = ctx.world.buildings.iter().find(|(id, b)| {
        b.kind == trainer
            && b.is_operational()
            && b.production_queue.len() < 2
            && ctx.world.owner_of(**id) == Some(player)
    });
    let Some((&building, _)) = building else {
        return false;
    };
    issue(ctx, player, CommandKind::Train { building, unit });
    true
}

fn try_construct(ctx: &mut SimCtx<'_>, player: PlayerId, kind: BuildingKind) -> bool {
    let stats = kind.stats();
    let affordable = ctx
        .world
        .players
        .get(&player)
        .map(|e| e.can_afford(stats.minerals, stats.vespene))
        .unwrap_or(false);
    if !affordable {
        return false;
    }
    let Some(base) = base_position(ctx.world, player) else {
        return false;
    };
    let (bx, by) = base.cell();
    let Some(spot) = find_build_spot(ctx.world, kind, (bx + 5, by + 5), 12) else {
        return false;
    };
    let Some(worker) = idle_worker(ctx.world, player) else {
        return false;
    };
    issue(
        ctx,
        player,
        CommandKind::Build {
            worker,
            building: kind,
            cell: spot,
        },
    );
    true
}

/// Post-book macro: keep training, countering the enemy mix on harder
/// difficulties.
fn continuous_macro(ctx: &mut SimCtx<'_>, player: PlayerId) {
    let kind = if ctx.options.ai_difficulty.uses_counters() {
        enemy_majority(ctx.world, player)
            .map(counter_for)
            .unwrap_or(UnitKind::Trooper)
    } else {
        UnitKind::Trooper
    };
    let trainer = BuildingKind::Barracks;
    try_train(ctx, player, kind, trainer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::FixedVec2;
    use crate::game::command::CommandQueue;
    use crate::game::config::{AiDifficulty, MatchOptions};
    use crate::world::terrain::TerrainGrid;

    fn fixture() -> (World, CommandQueue, MatchOptions) {
        let mut w = World::new(TerrainGrid::new(64, 64), 3);
        w.add_player(PlayerId(0));
        w.add_player(PlayerId(1));
        // Player 1 is the AI side.
        w.spawn_building(BuildingKind::Headquarters, PlayerId(1), 40, 40, true);
        w.spawn_unit(UnitKind::Scavenger, PlayerId(1), FixedVec2::from_cell(40, 45));
        let options = MatchOptions {
            ai_enabled: true,
            player_id: PlayerId(0),
            ..MatchOptions::default()
        };
        (w, CommandQueue::new(), options)
    }

    #[test]
    fn test_build_order_issues_train_command() {
        let (mut world, mut queue, options) = fixture();
        let mut system = AiStrategicSystem::new();
        let mut bus = EventBus::new();

        // Run until the first decision tick for player 1 comes around.
        for tick in 0..options.ai_difficulty.decision_cadence() + 2 {
            world.tick = tick;
            let mut ctx = SimCtx {
                world: &mut world,
                queue: &mut queue,
                options: &options,
            };
            system.update(&mut ctx, &mut bus);
        }

        // The first step trains a worker from the HQ, through the queue.
        assert!(queue.pending() > 0, "AI must issue commands via the queue");
    }

    #[test]
    fn test_counter_matrix() {
        assert_eq!(counter_for(UnitKind::Ravager), UnitKind::Trooper);
        assert_eq!(counter_for(UnitKind::Trooper), UnitKind::Ravager);
        assert_eq!(counter_for(UnitKind::Skywing), UnitKind::Trooper);
    }

    #[test]
    fn test_defending_beats_attacking() {
        let (mut world, mut queue, options) = fixture();
        // Big AI army, so attacking is on the table.
        for i in 0..12 {
            world.spawn_unit(
                UnitKind::Trooper,
                PlayerId(1),
                FixedVec2::from_cell(40 + i % 4, 48),
            );
        }
        // Enemy knocking on the door.
        world.spawn_unit(UnitKind::Ravager, PlayerId(0), FixedVec2::from_cell(42, 42));

        let mut system = AiStrategicSystem::new();
        let mut bus = EventBus::new();
        let cadence = options.ai_difficulty.decision_cadence();
        for tick in 0..cadence + 2 {
            world.tick = tick;
            let mut ctx = SimCtx {
                world: &mut world,
                queue: &mut queue,
                options: &options,
            };
            system.update(&mut ctx, &mut bus);
        }

        assert_eq!(system.mode(PlayerId(1)), Some(AiMode::Defending));
    }

    #[test]
    fn test_attack_when_army_ready_and_no_threat() {
        let (mut world, mut queue, options) = fixture();
        world.spawn_building(BuildingKind::Headquarters, PlayerId(0), 8, 8, true);
        for i in 0..12 {
            world.spawn_unit(
                UnitKind::Trooper,
                PlayerId(1),
                FixedVec2::from_cell(40 + i % 4, 48),
            );
        }

        let mut system = AiStrategicSystem::new();
        let mut bus = EventBus::new();
        for tick in 0..options.ai_difficulty.decision_cadence() + 2 {
            world.tick = tick;
            let mut ctx = SimCtx {
                world: &mut world,
                queue: &mut queue,
                options: &options,
            };
            system.update(&mut ctx, &mut bus);
        }

        assert_eq!(system.mode(PlayerId(1)), Some(AiMode::Attacking));
        assert!(queue.pending() > 0);
    }

    #[test]
    fn test_insane_decides_faster_than_easy() {
        assert!(
            AiDifficulty::Insane.decision_cadence() < AiDifficulty::Easy.decision_cadence()
        );
    }

    #[test]
    fn test_decisions_are_deterministic() {
        let run = || {
            let (mut world, mut queue, options) = fixture();
            for i in 0..12 {
                world.spawn_unit(
                    UnitKind::Trooper,
                    PlayerId(1),
                    FixedVec2::from_cell(40 + i % 4, 48),
                );
            }
            let mut system = AiStrategicSystem::new();
            let mut bus = EventBus::new();
            for tick in 0..200 {
                world.tick = tick;
                let mut ctx = SimCtx {
                    world: &mut world,
                    queue: &mut queue,
                    options: &options,
                };
                system.update(&mut ctx, &mut bus);
            }
            queue.pending()
        };
        assert_eq!(run(), run());
    }
}
