//! Checksum System
//!
//! Last in the pipeline: every `checksum_interval` ticks it walks the
//! settled world in canonical order, folds the 32-bit digest, records it in
//! the history ring and announces it on the bus. The game layer picks the
//! announcement up, attaches the compact Merkle digest and ships it to
//! peers.

use tracing::trace;

use crate::sync::checksum::world_checksum;

use crate::game::events::{EventBus, GameEvent};
use crate::game::{SimCtx, System};

/// Periodic state digest producer.
pub struct ChecksumSystem;

impl System for ChecksumSystem {
    fn name(&self) -> &'static str {
        "checksum"
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, bus: &mut EventBus) {
        let interval = ctx.options.checksum_interval;
        if interval == 0 {
            return;
        }
        let tick = ctx.world.tick;
        if tick == 0 || tick % interval != 0 {
            return;
        }

        let checksum = world_checksum(ctx.world);
        ctx.world.checksum_history.push(tick, checksum);
        trace!(tick, checksum = format_args!("{:08x}", checksum), "state digest");
        bus.emit(ctx, &GameEvent::ChecksumComputed { tick, checksum });
    }
}
