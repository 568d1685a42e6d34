//! Selection System
//!
//! Bookkeeping for per-player selection sets. Commands carry explicit unit
//! lists, so selection never participates in dispatch - this system only
//! keeps the sets free of dead entities so UI layers can trust them.

use std::collections::{BTreeMap, BTreeSet};

use crate::world::entity::{EntityId, PlayerId};

use crate::game::events::EventBus;
use crate::game::{SimCtx, System};

/// Maintains per-player selection sets.
#[derive(Default)]
pub struct SelectionSystem {
    selections: BTreeMap<PlayerId, BTreeSet<EntityId>>,
}

impl SelectionSystem {
    /// New system with empty selections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a player's selection.
    pub fn select(&mut self, player: PlayerId, entities: impl IntoIterator<Item = EntityId>) {
        self.selections
            .insert(player, entities.into_iter().collect());
    }

    /// Current selection for a player, ascending id order.
    pub fn selection(&self, player: PlayerId) -> Vec<EntityId> {
        self.selections
            .get(&player)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl System for SelectionSystem {
    fn name(&self) -> &'static str {
        "selection"
    }

    fn update(&mut self, ctx: &mut SimCtx<'_>, _bus: &mut EventBus) {
        // Drop entities that no longer exist or changed hands.
        for (player, selection) in self.selections.iter_mut() {
            selection.retain(|id| ctx.world.owner_of(*id) == Some(*player));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::FixedVec2;
    use crate::game::command::CommandQueue;
    use crate::game::config::MatchOptions;
    use crate::world::kinds::UnitKind;
    use crate::world::terrain::TerrainGrid;
    use crate::world::World;

    #[test]
    fn test_dead_entities_drop_out() {
        let mut world = World::new(TerrainGrid::new(32, 32), 1);
        world.add_player(PlayerId(0));
        let a = world.spawn_unit(UnitKind::Trooper, PlayerId(0), FixedVec2::from_cell(5, 5));
        let b = world.spawn_unit(UnitKind::Trooper, PlayerId(0), FixedVec2::from_cell(6, 5));

        let mut system = SelectionSystem::new();
        system.select(PlayerId(0), [a, b]);
        assert_eq!(system.selection(PlayerId(0)), vec![a, b]);

        world.mark_destroyed(a);
        world.flush_destroyed();

        let mut queue = CommandQueue::new();
        let options = MatchOptions::default();
        let mut bus = EventBus::new();
        let mut ctx = SimCtx {
            world: &mut world,
            queue: &mut queue,
            options: &options,
        };
        system.update(&mut ctx, &mut bus);

        assert_eq!(system.selection(PlayerId(0)), vec![b]);
    }
}
