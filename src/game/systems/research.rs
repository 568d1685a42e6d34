//! Research System
//!
//! Forge research projects: charged at start, one timer per project per
//! player, finished projects land in the player's research set where
//! combat and movement pick them up.

use crate::world::components::BuildingState;
use crate::world::kinds::BuildingKind;

use crate::game::command::CommandKind;
use crate::game::events::{EventBus, GameEvent};
use crate::game::{SimCtx, System};

/// Advances research timers.
pub struct ResearchSystem;

impl System for ResearchSystem {
    fn name(&self) -> &'static str {
        "research"
    }

    fn subscribe(&self, bus: &mut EventBus) {
        bus.on("command:research", handle_research);
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, bus: &mut EventBus) {
        let players: Vec<_> = ctx.world.players.keys().copied().collect();
        for player in players {
            let completed: Vec<_> = {
                let Some(economy) = ctx.world.players.get_mut(&player) else {
                    continue;
                };
                let mut done = Vec::new();
                for (&research, remaining) in economy.in_progress.iter_mut() {
                    *remaining = remaining.saturating_sub(1);
                    if *remaining == 0 {
                        done.push(research);
                    }
                }
                for research in &done {
                    economy.in_progress.remove(research);
                    economy.research.insert(*research);
                }
                done
            };
            for research in completed {
                bus.emit(ctx, &GameEvent::ResearchCompleted { player, research });
            }
        }
    }
}

/// `command:research`
pub fn handle_research(ctx: &mut SimCtx<'_>, event: &GameEvent) {
    let GameEvent::Command(command) = event else {
        return;
    };
    let CommandKind::Research { building, research } = &command.kind else {
        return;
    };
    let Some(b) = ctx.world.buildings.get(building) else {
        return;
    };
    if b.kind != BuildingKind::Forge || b.state != BuildingState::Complete {
        return;
    }
    let Some(player) = ctx.world.owner_of(*building) else {
        return;
    };
    let stats = research.stats();
    let Some(economy) = ctx.world.players.get_mut(&player) else {
        return;
    };
    if economy.research.contains(research)
        || economy.in_progress.contains_key(research)
        || !economy.can_afford(stats.minerals, stats.vespene)
    {
        return;
    }
    economy.spend(stats.minerals, stats.vespene);
    economy.in_progress.insert(*research, stats.ticks);
}
