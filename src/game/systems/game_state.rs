//! Game State System
//!
//! Victory detection, running last so it observes settled state. A player
//! is eliminated once they hold no buildings and no workers - nothing left
//! to rebuild from. When at most one player survives, the outcome lands on
//! the world and the match-ended event fires exactly once.

use tracing::info;

use crate::world::entity::PlayerId;
use crate::world::MatchOutcome;

use crate::game::events::{EventBus, GameEvent};
use crate::game::{SimCtx, System};

/// Detects elimination and declares the result.
pub struct GameStateSystem;

impl System for GameStateSystem {
    fn name(&self) -> &'static str {
        "game-state"
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, bus: &mut EventBus) {
        if ctx.world.outcome.is_some() || ctx.world.players.len() < 2 {
            return;
        }

        let players: Vec<PlayerId> = ctx.world.players.keys().copied().collect();
        let alive: Vec<PlayerId> = players
            .into_iter()
            .filter(|&player| {
                let has_building = ctx
                    .world
                    .buildings
                    .keys()
                    .any(|id| ctx.world.owner_of(*id) == Some(player));
                let has_worker = ctx
                    .world
                    .units
                    .iter()
                    .any(|(id, u)| u.is_worker && ctx.world.owner_of(*id) == Some(player));
                has_building || has_worker
            })
            .collect();

        if alive.len() > 1 {
            return;
        }

        let winner = alive.first().copied();
        ctx.world.outcome = Some(MatchOutcome { winner });
        info!(winner = ?winner, tick = ctx.world.tick, "match decided");
        bus.emit(ctx, &GameEvent::MatchEnded { winner });
    }
}
