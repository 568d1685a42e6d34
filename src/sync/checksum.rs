//! Canonical State Walk
//!
//! Reduces the world to per-entity quantized records and folds them into
//! the 32-bit checksum peers exchange. The record is the single source of
//! truth: the scalar checksum, the Merkle leaves and the snapshot all
//! derive from the same [`EntityRecord`], so a snapshot round-trip can
//! never disagree with the live walk.
//!
//! Entities are visited in ascending id order, always. Every field is
//! quantized before it is folded; nothing here ever touches a float.

use serde::{Deserialize, Serialize};

use crate::core::fixed::{quantize_amount, quantize_pos};
use crate::core::hash::{Checksum, ChecksumHasher};
use crate::world::components::{BuildingState, UnitState};
use crate::world::entity::EntityId;
use crate::world::World;

/// Entity category, the first Merkle level under the root.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Category {
    /// Mobile units.
    Units = 0,
    /// Structures.
    Buildings = 1,
    /// Resource nodes.
    Resources = 2,
    /// Projectiles in flight.
    Projectiles = 3,
}

impl Category {
    /// All categories in canonical order.
    pub const ALL: [Category; 4] = [
        Category::Units,
        Category::Buildings,
        Category::Resources,
        Category::Projectiles,
    ];

    /// Display name used in divergence paths.
    pub fn name(self) -> &'static str {
        match self {
            Category::Units => "units",
            Category::Buildings => "buildings",
            Category::Resources => "resources",
            Category::Projectiles => "projectiles",
        }
    }
}

/// One entity's quantized hash-boundary record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity id.
    pub id: u32,
    /// Owner slot (255 = neutral).
    pub player: u8,
    /// Merkle category.
    pub category: Category,
    /// Kind tag within the category.
    pub kind_tag: u8,
    /// Quantized position.
    pub pos: (i32, i32),
    /// Quantized elevation.
    pub elevation: i32,
    /// Quantized hit points.
    pub health: i32,
    /// Quantized shield.
    pub shield: i32,
    /// Behavior/lifecycle state tag.
    pub state_tag: u8,
    /// Target entity id, if any.
    pub target_entity: Option<u32>,
    /// Quantized target position, if any.
    pub target_pos: Option<(i32, i32)>,
    /// Kind-specific scalar A (mineral amount, build progress, carried
    /// resources...).
    pub extra_a: u32,
    /// Kind-specific scalar B (gatherer count, production queue length...).
    pub extra_b: u32,
}

impl EntityRecord {
    /// Fold this record into a leaf checksum.
    pub fn checksum(&self) -> Checksum {
        let mut h = ChecksumHasher::new();
        h.write_u32(self.id);
        h.write_u8(self.player);
        h.write_u8(self.category as u8);
        h.write_u8(self.kind_tag);
        h.write_i32(self.pos.0);
        h.write_i32(self.pos.1);
        h.write_i32(self.elevation);
        h.write_i32(self.health);
        h.write_i32(self.shield);
        h.write_u8(self.state_tag);
        h.write_bool(self.target_entity.is_some());
        h.write_u32(self.target_entity.unwrap_or(0));
        h.write_bool(self.target_pos.is_some());
        let tp = self.target_pos.unwrap_or((0, 0));
        h.write_i32(tp.0);
        h.write_i32(tp.1);
        h.write_u32(self.extra_a);
        h.write_u32(self.extra_b);
        h.finish()
    }
}

/// Build the quantized record for one entity, or `None` for entities
/// outside the four hashed categories.
pub fn entity_record(world: &World, id: EntityId) -> Option<EntityRecord> {
    let transform = world.transforms.get(&id)?;
    let player = world
        .owner_of(id)
        .map(|p| p.0)
        .unwrap_or(crate::world::entity::PlayerId::NEUTRAL.0);
    let pos = (
        quantize_pos(transform.position.x),
        quantize_pos(transform.position.y),
    );
    let elevation = quantize_pos(transform.elevation);
    let (health, shield) = world
        .healths
        .get(&id)
        .map(|h| (quantize_amount(h.current), quantize_amount(h.shield)))
        .unwrap_or((0, 0));

    if let Some(unit) = world.units.get(&id) {
        return Some(EntityRecord {
            id: id.raw(),
            player,
            category: Category::Units,
            kind_tag: unit.kind as u8,
            pos,
            elevation,
            health,
            shield,
            state_tag: unit.state as u8,
            target_entity: unit.target_entity.map(EntityId::raw),
            target_pos: unit
                .target_pos
                .map(|p| (quantize_pos(p.x), quantize_pos(p.y))),
            extra_a: unit.carrying,
            extra_b: unit.attack_cooldown,
        });
    }

    if let Some(building) = world.buildings.get(&id) {
        return Some(EntityRecord {
            id: id.raw(),
            player,
            category: Category::Buildings,
            kind_tag: building.kind as u8,
            pos,
            elevation,
            health,
            shield,
            state_tag: building.state as u8,
            target_entity: building.addon.map(EntityId::raw),
            target_pos: building
                .rally
                .map(|p| (quantize_pos(p.x), quantize_pos(p.y))),
            extra_a: quantize_amount(building.build_progress) as u32,
            extra_b: building.production_queue.len() as u32,
        });
    }

    if let Some(resource) = world.resources.get(&id) {
        return Some(EntityRecord {
            id: id.raw(),
            player,
            category: Category::Resources,
            kind_tag: resource.kind as u8,
            pos,
            elevation,
            health,
            shield,
            state_tag: 0,
            target_entity: resource.extractor.map(EntityId::raw),
            target_pos: None,
            extra_a: resource.amount,
            extra_b: resource.gatherers as u32,
        });
    }

    if let Some(projectile) = world.projectiles.get(&id) {
        return Some(EntityRecord {
            id: id.raw(),
            player,
            category: Category::Projectiles,
            kind_tag: 0,
            pos,
            elevation,
            health: 0,
            shield: 0,
            state_tag: 0,
            target_entity: projectile.target_entity.map(EntityId::raw),
            target_pos: Some((
                quantize_pos(projectile.target_pos.x),
                quantize_pos(projectile.target_pos.y),
            )),
            extra_a: quantize_amount(projectile.damage) as u32,
            extra_b: 0,
        });
    }

    None
}

/// All entity records in ascending id order.
pub fn walk_records(world: &World) -> Vec<EntityRecord> {
    let mut ids: Vec<EntityId> = world.transforms.keys().copied().collect();
    ids.sort_unstable();
    ids.into_iter()
        .filter_map(|id| entity_record(world, id))
        .collect()
}

/// The full world checksum: tick, seed, per-player economy, then every
/// entity record in canonical order.
pub fn world_checksum(world: &World) -> Checksum {
    let mut h = ChecksumHasher::new();
    h.write_u32(world.tick);
    h.write_u64(world.base_seed);

    for (player, economy) in &world.players {
        h.write_u8(player.0);
        h.write_u32(economy.minerals);
        h.write_u32(economy.vespene);
        h.write_u32(economy.supply_used as u32);
        h.write_u32(economy.supply_cap as u32);
        h.write_u32(economy.research.len() as u32);
    }

    h.write_bool(world.outcome.is_some());
    if let Some(outcome) = world.outcome {
        h.write_u8(outcome.winner.map(|p| p.0).unwrap_or(u8::MAX));
    }

    for record in walk_records(world) {
        h.write_u32(record.checksum());
    }
    h.finish()
}

/// Tag byte for a unit state (exposed for tests and forensics tooling).
pub fn unit_state_tag(state: UnitState) -> u8 {
    state as u8
}

/// Tag byte for a building state.
pub fn building_state_tag(state: BuildingState) -> u8 {
    state as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::FixedVec2;
    use crate::world::components::ResourceKind;
    use crate::world::entity::PlayerId;
    use crate::world::kinds::{BuildingKind, UnitKind};
    use crate::world::terrain::TerrainGrid;

    fn populated_world(seed: u64) -> World {
        let mut w = World::new(TerrainGrid::new(64, 64), seed);
        w.add_player(PlayerId(0));
        w.add_player(PlayerId(1));
        w.spawn_building(BuildingKind::Headquarters, PlayerId(0), 4, 4, true);
        w.spawn_unit(UnitKind::Trooper, PlayerId(0), FixedVec2::from_cell(10, 10));
        w.spawn_unit(UnitKind::Scavenger, PlayerId(1), FixedVec2::from_cell(40, 40));
        w.spawn_resource(ResourceKind::Minerals, 20, 20, 1500);
        w
    }

    #[test]
    fn test_checksum_idempotent() {
        // Law: hashing the same state twice yields the same value.
        let w = populated_world(9);
        assert_eq!(world_checksum(&w), world_checksum(&w));
    }

    #[test]
    fn test_identical_worlds_agree() {
        let w1 = populated_world(9);
        let w2 = populated_world(9);
        assert_eq!(world_checksum(&w1), world_checksum(&w2));
    }

    #[test]
    fn test_single_field_divergence_changes_checksum() {
        let w1 = populated_world(9);
        let mut w2 = populated_world(9);

        let unit = w2.entities_with(crate::world::tag::UNIT)[0];
        w2.healths.get_mut(&unit).unwrap().current -= crate::core::fixed::from_int(5);

        assert_ne!(world_checksum(&w1), world_checksum(&w2));
    }

    #[test]
    fn test_sub_quantum_drift_is_invisible() {
        // Drift below the quantization step must not change the hash - that
        // is the entire point of quantizing at the boundary.
        let w1 = populated_world(9);
        let mut w2 = populated_world(9);

        let unit = w2.entities_with(crate::world::tag::UNIT)[0];
        w2.transforms.get_mut(&unit).unwrap().position.x += 1;

        assert_eq!(world_checksum(&w1), world_checksum(&w2));
    }

    #[test]
    fn test_records_ascending_ids() {
        let w = populated_world(9);
        let records = walk_records(&w);
        assert_eq!(records.len(), 4);
        for pair in records.windows(2) {
            assert!(pair[0].id < pair[1].id);
        }
    }

    #[test]
    fn test_record_categories() {
        let w = populated_world(9);
        let records = walk_records(&w);
        let categories: Vec<Category> = records.iter().map(|r| r.category).collect();
        assert!(categories.contains(&Category::Units));
        assert!(categories.contains(&Category::Buildings));
        assert!(categories.contains(&Category::Resources));
    }

    #[test]
    fn test_economy_feeds_checksum() {
        let w1 = populated_world(9);
        let mut w2 = populated_world(9);
        w2.players.get_mut(&PlayerId(0)).unwrap().minerals += 25;
        assert_ne!(world_checksum(&w1), world_checksum(&w2));
    }
}
