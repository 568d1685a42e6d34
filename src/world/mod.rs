//! Entity-Component World Store
//!
//! The single owner of all simulation state. Component storage is
//! BTreeMap-per-component so every iteration anywhere in the crate is in
//! ascending entity id order - no query result ever depends on hash-table
//! insertion order.
//!
//! Systems hold no entity data of their own; they receive `&mut World` each
//! tick and look components up by id. Entity destruction is deferred to the
//! end of the current system pass so in-flight iterations never observe a
//! half-removed entity.

pub mod components;
pub mod entity;
pub mod grid;
pub mod kinds;
pub mod terrain;

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::core::fixed::{from_int, Fixed};
use crate::core::hash::Checksum;
use crate::core::rng::DeterministicRng;
use crate::core::vec2::FixedVec2;

use components::{
    Ability, Building, Health, Projectile, ResourceNode, Selectable, Transform, Unit,
};
use entity::{EntityAllocator, EntityId, PlayerId};
use grid::SpatialGrid;
use kinds::{BuildingKind, ResearchId, UnitKind};
use terrain::TerrainGrid;

// =============================================================================
// COMPONENT TAGS
// =============================================================================

/// Bitmask tags for component queries.
pub mod tag {
    /// Transform component.
    pub const TRANSFORM: u32 = 1 << 0;
    /// Unit component.
    pub const UNIT: u32 = 1 << 1;
    /// Building component.
    pub const BUILDING: u32 = 1 << 2;
    /// Health component.
    pub const HEALTH: u32 = 1 << 3;
    /// Selectable (ownership) component.
    pub const SELECTABLE: u32 = 1 << 4;
    /// ResourceNode component.
    pub const RESOURCE: u32 = 1 << 5;
    /// Ability component.
    pub const ABILITY: u32 = 1 << 6;
    /// Projectile component.
    pub const PROJECTILE: u32 = 1 << 7;
}

// =============================================================================
// PER-PLAYER ECONOMY
// =============================================================================

/// Per-player resources, supply and finished research.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlayerEconomy {
    /// Mineral stockpile.
    pub minerals: u32,
    /// Vespene stockpile.
    pub vespene: u32,
    /// Supply consumed by living units and queued production.
    pub supply_used: u16,
    /// Supply cap from completed buildings.
    pub supply_cap: u16,
    /// Completed research.
    pub research: BTreeSet<ResearchId>,
    /// Research in progress: project to remaining ticks.
    pub in_progress: BTreeMap<ResearchId, u32>,
}

impl PlayerEconomy {
    /// Standard match start: enough for early build orders.
    pub fn starting() -> Self {
        Self {
            minerals: 500,
            vespene: 0,
            supply_used: 0,
            supply_cap: 0,
            research: BTreeSet::new(),
            in_progress: BTreeMap::new(),
        }
    }

    /// True when the stockpile covers a cost.
    pub fn can_afford(&self, minerals: u32, vespene: u32) -> bool {
        self.minerals >= minerals && self.vespene >= vespene
    }

    /// Deduct a cost. Caller checks affordability first.
    pub fn spend(&mut self, minerals: u32, vespene: u32) {
        self.minerals = self.minerals.saturating_sub(minerals);
        self.vespene = self.vespene.saturating_sub(vespene);
    }
}

// =============================================================================
// SPAWN REQUESTS & VISION
// =============================================================================

/// Final result of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// Winning player; `None` is a draw.
    pub winner: Option<PlayerId>,
}

/// A deferred unit spawn, materialized by the spawn system at its fixed
/// point in the tick.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpawnRequest {
    /// Unit to create.
    pub kind: UnitKind,
    /// Owner.
    pub player: PlayerId,
    /// Spawn position.
    pub pos: FixedVec2,
    /// Post-spawn walk target (production rally).
    pub rally: Option<FixedVec2>,
}

/// Per-player fog-of-war visibility, recomputed after movement each tick.
/// Derived state: never hashed, never snapshotted.
#[derive(Clone, Debug, Default)]
pub struct VisionMap {
    width: u32,
    grids: BTreeMap<PlayerId, Vec<bool>>,
}

impl VisionMap {
    /// Reset all players to unseen for a new tick.
    pub fn reset(&mut self, width: u32, height: u32, players: impl Iterator<Item = PlayerId>) {
        self.width = width;
        let size = (width * height) as usize;
        self.grids.clear();
        for p in players {
            self.grids.insert(p, vec![false; size]);
        }
    }

    /// Mark a cell visible to a player.
    pub fn reveal(&mut self, player: PlayerId, x: i32, y: i32) {
        if x < 0 || y < 0 || (x as u32) >= self.width {
            return;
        }
        if let Some(grid) = self.grids.get_mut(&player) {
            let idx = (y as u32 * self.width + x as u32) as usize;
            if idx < grid.len() {
                grid[idx] = true;
            }
        }
    }

    /// Whether a player currently sees a cell.
    pub fn visible(&self, player: PlayerId, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || (x as u32) >= self.width {
            return false;
        }
        self.grids
            .get(&player)
            .map(|grid| {
                let idx = (y as u32 * self.width + x as u32) as usize;
                idx < grid.len() && grid[idx]
            })
            .unwrap_or(false)
    }

    /// Count of visible cells for a player.
    pub fn visible_count(&self, player: PlayerId) -> usize {
        self.grids
            .get(&player)
            .map(|g| g.iter().filter(|v| **v).count())
            .unwrap_or(0)
    }
}

// =============================================================================
// CHECKSUM HISTORY
// =============================================================================

/// Bounded ring of recent (tick, checksum) pairs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChecksumRing {
    entries: VecDeque<(u32, Checksum)>,
    capacity: usize,
}

impl ChecksumRing {
    /// Ring holding the last `capacity` digests.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a digest, evicting the oldest when full.
    pub fn push(&mut self, tick: u32, checksum: Checksum) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((tick, checksum));
    }

    /// Digest for a tick, if still retained.
    pub fn get(&self, tick: u32) -> Option<Checksum> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tick)
            .map(|(_, c)| *c)
    }

    /// Most recent entry.
    pub fn latest(&self) -> Option<(u32, Checksum)> {
        self.entries.back().copied()
    }

    /// All retained entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = (u32, Checksum)> + '_ {
        self.entries.iter().copied()
    }
}

impl Default for ChecksumRing {
    fn default() -> Self {
        Self::new(64)
    }
}

// =============================================================================
// WORLD
// =============================================================================

/// The world store. See module docs for the ownership rules.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct World {
    /// Current tick, advanced once per scheduler fire.
    pub tick: u32,
    /// Base RNG seed for the match (per-tick streams derive from it).
    pub base_seed: u64,

    alloc: EntityAllocator,

    /// Transform components.
    pub transforms: BTreeMap<EntityId, Transform>,
    /// Unit components.
    pub units: BTreeMap<EntityId, Unit>,
    /// Building components.
    pub buildings: BTreeMap<EntityId, Building>,
    /// Health components.
    pub healths: BTreeMap<EntityId, Health>,
    /// Ownership components.
    pub owners: BTreeMap<EntityId, Selectable>,
    /// Resource node components.
    pub resources: BTreeMap<EntityId, ResourceNode>,
    /// Ability components.
    pub abilities: BTreeMap<EntityId, Ability>,
    /// Projectile components.
    pub projectiles: BTreeMap<EntityId, Projectile>,

    /// Map terrain.
    pub terrain: TerrainGrid,
    /// Spatial index over units (and projectiles).
    pub unit_grid: SpatialGrid,
    /// Spatial index over buildings and resource nodes.
    pub building_grid: SpatialGrid,

    /// Per-player economy.
    pub players: BTreeMap<PlayerId, PlayerEconomy>,
    /// Recent state digests.
    pub checksum_history: ChecksumRing,
    /// Final match result, set once by the game-state system.
    pub outcome: Option<MatchOutcome>,
    /// Deferred unit spawns, drained by the spawn system.
    pub pending_spawns: Vec<SpawnRequest>,
    /// Fog-of-war state, rebuilt by the vision system each tick.
    #[serde(skip)]
    pub vision: VisionMap,

    deferred_destroy: Vec<EntityId>,

    #[serde(skip)]
    query_cache: QueryCache,
}

/// Per-tick cache of `entities_with` results, invalidated on tick advance.
#[derive(Clone, Debug, Default)]
struct QueryCache {
    tick: u32,
    results: BTreeMap<u32, Vec<EntityId>>,
}

impl World {
    /// Fresh world over a terrain grid.
    pub fn new(terrain: TerrainGrid, base_seed: u64) -> Self {
        Self {
            tick: 0,
            base_seed,
            alloc: EntityAllocator::default(),
            transforms: BTreeMap::new(),
            units: BTreeMap::new(),
            buildings: BTreeMap::new(),
            healths: BTreeMap::new(),
            owners: BTreeMap::new(),
            resources: BTreeMap::new(),
            abilities: BTreeMap::new(),
            projectiles: BTreeMap::new(),
            terrain,
            unit_grid: SpatialGrid::new(),
            building_grid: SpatialGrid::new(),
            players: BTreeMap::new(),
            checksum_history: ChecksumRing::default(),
            outcome: None,
            pending_spawns: Vec::new(),
            vision: VisionMap::default(),
            deferred_destroy: Vec::new(),
            query_cache: QueryCache::default(),
        }
    }

    /// Register a player slot with starting economy.
    pub fn add_player(&mut self, player: PlayerId) {
        self.players.insert(player, PlayerEconomy::starting());
    }

    /// RNG stream for this tick and a caller-chosen offset.
    pub fn tick_rng(&self, offset: u64) -> DeterministicRng {
        DeterministicRng::for_tick(self.base_seed, self.tick, offset)
    }

    // =========================================================================
    // SPAWN / DESTROY
    // =========================================================================

    /// Spawn a unit for a player. Charges supply; the caller has already
    /// charged resources if this came from production.
    pub fn spawn_unit(&mut self, kind: UnitKind, player: PlayerId, pos: FixedVec2) -> EntityId {
        let id = self.alloc.allocate();
        let stats = kind.stats();

        self.transforms.insert(id, Transform::at(pos));
        self.units.insert(id, Unit::new(kind));
        self.healths
            .insert(id, Health::full(stats.max_health, stats.max_shield));
        self.owners.insert(id, Selectable { player });
        if kind == UnitKind::Arbalest || kind == UnitKind::Trooper {
            self.abilities
                .insert(id, Ability::with_energy(from_int(100)));
        }
        self.unit_grid.insert(id, pos);

        if let Some(economy) = self.players.get_mut(&player) {
            economy.supply_used = economy.supply_used.saturating_add(stats.supply);
        }
        id
    }

    /// Spawn a building footprint-aligned at cell `(cx, cy)`.
    ///
    /// Marks terrain occupancy. `completed` skips the construction phase
    /// (blueprint starts).
    pub fn spawn_building(
        &mut self,
        kind: BuildingKind,
        player: PlayerId,
        cx: i32,
        cy: i32,
        completed: bool,
    ) -> EntityId {
        let id = self.alloc.allocate();
        let stats = kind.stats();
        let building = if completed {
            Building::completed(kind)
        } else {
            Building::new(kind)
        };
        let pos = FixedVec2::from_cell(cx, cy);

        self.terrain
            .set_occupied(cx, cy, stats.width, stats.height, true);
        self.transforms.insert(id, Transform::at(pos));
        self.buildings.insert(id, building);
        self.healths.insert(
            id,
            if completed {
                Health::full(stats.max_health, 0)
            } else {
                // Construction starts at a sliver of health and grows.
                let mut h = Health::full(stats.max_health, 0);
                h.current = stats.max_health / 10;
                h
            },
        );
        self.owners.insert(id, Selectable { player });
        self.building_grid.insert(id, pos);

        if completed && stats.supply_provided > 0 {
            if let Some(economy) = self.players.get_mut(&player) {
                economy.supply_cap = economy.supply_cap.saturating_add(stats.supply_provided);
            }
        }
        id
    }

    /// Spawn a neutral resource node at a cell.
    pub fn spawn_resource(
        &mut self,
        kind: components::ResourceKind,
        cx: i32,
        cy: i32,
        amount: u32,
    ) -> EntityId {
        let id = self.alloc.allocate();
        let pos = FixedVec2::from_cell(cx, cy);
        self.transforms.insert(id, Transform::at(pos));
        self.resources.insert(
            id,
            ResourceNode {
                kind,
                amount,
                gatherers: 0,
                extractor: None,
            },
        );
        self.owners.insert(id, Selectable {
            player: PlayerId::NEUTRAL,
        });
        self.building_grid.insert(id, pos);
        id
    }

    /// Spawn a projectile entity.
    pub fn spawn_projectile(&mut self, pos: FixedVec2, projectile: Projectile) -> EntityId {
        let id = self.alloc.allocate();
        self.transforms.insert(id, Transform::at(pos));
        self.projectiles.insert(id, projectile);
        self.unit_grid.insert(id, pos);
        id
    }

    /// Queue an entity for destruction at the end of the current pass.
    pub fn mark_destroyed(&mut self, id: EntityId) {
        if !self.deferred_destroy.contains(&id) {
            self.deferred_destroy.push(id);
        }
    }

    /// Whether an entity is pending destruction.
    pub fn is_marked_destroyed(&self, id: EntityId) -> bool {
        self.deferred_destroy.contains(&id)
    }

    /// Remove all entities marked since the last flush. Returns the removed
    /// ids in ascending order.
    pub fn flush_destroyed(&mut self) -> Vec<EntityId> {
        if self.deferred_destroy.is_empty() {
            return Vec::new();
        }
        let mut ids = std::mem::take(&mut self.deferred_destroy);
        ids.sort_unstable();
        ids.dedup();

        for &id in &ids {
            // Release supply for units.
            if let (Some(unit), Some(owner)) = (self.units.get(&id), self.owners.get(&id)) {
                let supply = unit.kind.stats().supply;
                if let Some(economy) = self.players.get_mut(&owner.player) {
                    economy.supply_used = economy.supply_used.saturating_sub(supply);
                }
            }
            // Release supply cap and footprint for buildings.
            if let Some(building) = self.buildings.get(&id) {
                let stats = building.kind.stats();
                if building.is_operational() {
                    if let Some(owner) = self.owners.get(&id) {
                        if let Some(economy) = self.players.get_mut(&owner.player) {
                            economy.supply_cap =
                                economy.supply_cap.saturating_sub(stats.supply_provided);
                        }
                    }
                }
                if building.state != components::BuildingState::Flying {
                    if let Some(t) = self.transforms.get(&id) {
                        let (cx, cy) = t.position.cell();
                        self.terrain
                            .set_occupied(cx, cy, stats.width, stats.height, false);
                    }
                }
            }

            self.transforms.remove(&id);
            self.units.remove(&id);
            self.buildings.remove(&id);
            self.healths.remove(&id);
            self.owners.remove(&id);
            self.resources.remove(&id);
            self.abilities.remove(&id);
            self.projectiles.remove(&id);
            self.unit_grid.remove(id);
            self.building_grid.remove(id);
            self.alloc.retire(id);
        }
        ids
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Whether an entity has a component.
    fn has_tag(&self, id: EntityId, t: u32) -> bool {
        match t {
            tag::TRANSFORM => self.transforms.contains_key(&id),
            tag::UNIT => self.units.contains_key(&id),
            tag::BUILDING => self.buildings.contains_key(&id),
            tag::HEALTH => self.healths.contains_key(&id),
            tag::SELECTABLE => self.owners.contains_key(&id),
            tag::RESOURCE => self.resources.contains_key(&id),
            tag::ABILITY => self.abilities.contains_key(&id),
            tag::PROJECTILE => self.projectiles.contains_key(&id),
            _ => false,
        }
    }

    /// Entities holding every component in `mask`, ascending id order.
    pub fn entities_with(&self, mask: u32) -> Vec<EntityId> {
        // Drive iteration from the narrowest likely map to keep this cheap.
        let base: Box<dyn Iterator<Item = EntityId> + '_> = if mask & tag::PROJECTILE != 0 {
            Box::new(self.projectiles.keys().copied())
        } else if mask & tag::RESOURCE != 0 {
            Box::new(self.resources.keys().copied())
        } else if mask & tag::BUILDING != 0 {
            Box::new(self.buildings.keys().copied())
        } else if mask & tag::UNIT != 0 {
            Box::new(self.units.keys().copied())
        } else if mask & tag::ABILITY != 0 {
            Box::new(self.abilities.keys().copied())
        } else if mask & tag::HEALTH != 0 {
            Box::new(self.healths.keys().copied())
        } else if mask & tag::SELECTABLE != 0 {
            Box::new(self.owners.keys().copied())
        } else {
            Box::new(self.transforms.keys().copied())
        };

        base.filter(|&id| {
            let mut rest = mask;
            while rest != 0 {
                let bit = rest & rest.wrapping_neg();
                if !self.has_tag(id, bit) {
                    return false;
                }
                rest &= rest - 1;
            }
            true
        })
        .collect()
    }

    /// Cached variant of [`entities_with`], valid within a single tick.
    pub fn entities_with_cached(&mut self, mask: u32) -> Vec<EntityId> {
        if self.query_cache.tick != self.tick {
            self.query_cache.tick = self.tick;
            self.query_cache.results.clear();
        }
        if let Some(hit) = self.query_cache.results.get(&mask) {
            return hit.clone();
        }
        let result = self.entities_with(mask);
        self.query_cache.results.insert(mask, result.clone());
        result
    }

    /// Owning player of an entity.
    pub fn owner_of(&self, id: EntityId) -> Option<PlayerId> {
        self.owners.get(&id).map(|s| s.player)
    }

    /// Position of an entity.
    pub fn position_of(&self, id: EntityId) -> Option<FixedVec2> {
        self.transforms.get(&id).map(|t| t.position)
    }

    /// Move a unit/projectile and keep the spatial index current.
    pub fn move_entity(&mut self, id: EntityId, pos: FixedVec2) {
        if let Some(t) = self.transforms.get_mut(&id) {
            t.position = pos;
            self.unit_grid.update(id, pos);
        }
    }

    /// Entity counts by category: (units, buildings, resources).
    pub fn category_counts(&self) -> (u32, u32, u32) {
        (
            self.units.len() as u32,
            self.buildings.len() as u32,
            self.resources.len() as u32,
        )
    }

    /// Sum of remaining resource amounts, for the checksum wire message.
    pub fn resource_sum(&self) -> u64 {
        self.resources.values().map(|r| r.amount as u64).sum()
    }

    /// Total entities ever allocated.
    pub fn allocated_entities(&self) -> u32 {
        self.alloc.allocated()
    }

    /// Distance-squared helper between two entities, if both have transforms.
    pub fn distance_squared(&self, a: EntityId, b: EntityId) -> Option<Fixed> {
        Some(self.position_of(a)?.distance_squared(self.position_of(b)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::to_fixed;
    use components::ResourceKind;

    fn test_world() -> World {
        let mut w = World::new(TerrainGrid::new(64, 64), 42);
        w.add_player(PlayerId(0));
        w.add_player(PlayerId(1));
        w
    }

    #[test]
    fn test_spawn_ascending_ids() {
        let mut w = test_world();
        let a = w.spawn_unit(UnitKind::Trooper, PlayerId(0), FixedVec2::from_cell(5, 5));
        let b = w.spawn_unit(UnitKind::Trooper, PlayerId(0), FixedVec2::from_cell(6, 5));
        assert!(a < b);

        let ids = w.entities_with(tag::UNIT | tag::TRANSFORM | tag::HEALTH);
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_supply_accounting() {
        let mut w = test_world();
        let u = w.spawn_unit(UnitKind::Ravager, PlayerId(0), FixedVec2::from_cell(5, 5));
        assert_eq!(w.players[&PlayerId(0)].supply_used, 2);

        w.spawn_building(BuildingKind::Depot, PlayerId(0), 10, 10, true);
        assert_eq!(w.players[&PlayerId(0)].supply_cap, 8);

        w.mark_destroyed(u);
        w.flush_destroyed();
        assert_eq!(w.players[&PlayerId(0)].supply_used, 0);
    }

    #[test]
    fn test_deferred_destruction() {
        let mut w = test_world();
        let u = w.spawn_unit(UnitKind::Trooper, PlayerId(0), FixedVec2::from_cell(5, 5));
        w.mark_destroyed(u);

        // Still visible until the flush.
        assert!(w.units.contains_key(&u));
        assert!(w.is_marked_destroyed(u));

        let removed = w.flush_destroyed();
        assert_eq!(removed, vec![u]);
        assert!(!w.units.contains_key(&u));
        assert!(w.unit_grid.is_empty());

        // Ids are never reused.
        let next = w.spawn_unit(UnitKind::Trooper, PlayerId(0), FixedVec2::from_cell(5, 5));
        assert!(next > u);
    }

    #[test]
    fn test_building_footprint_occupancy() {
        let mut w = test_world();
        let b = w.spawn_building(BuildingKind::Barracks, PlayerId(0), 20, 20, true);
        assert!(!w.terrain.walkable(21, 21));

        w.mark_destroyed(b);
        w.flush_destroyed();
        assert!(w.terrain.walkable(21, 21));
    }

    #[test]
    fn test_query_cache_invalidation() {
        let mut w = test_world();
        w.spawn_unit(UnitKind::Trooper, PlayerId(0), FixedVec2::from_cell(5, 5));

        let first = w.entities_with_cached(tag::UNIT);
        assert_eq!(first.len(), 1);

        // Same tick: the stale cached result is intentionally returned.
        w.spawn_unit(UnitKind::Trooper, PlayerId(0), FixedVec2::from_cell(6, 5));
        assert_eq!(w.entities_with_cached(tag::UNIT).len(), 1);

        // Tick advance invalidates.
        w.tick += 1;
        assert_eq!(w.entities_with_cached(tag::UNIT).len(), 2);
    }

    #[test]
    fn test_resource_sum() {
        let mut w = test_world();
        w.spawn_resource(ResourceKind::Minerals, 3, 3, 1500);
        w.spawn_resource(ResourceKind::Vespene, 8, 8, 2500);
        assert_eq!(w.resource_sum(), 4000);
        let (units, buildings, resources) = w.category_counts();
        assert_eq!((units, buildings, resources), (0, 0, 2));
    }

    #[test]
    fn test_tick_rng_deterministic() {
        let w1 = test_world();
        let w2 = test_world();
        assert_eq!(w1.tick_rng(3).next_u64_pair(), w2.tick_rng(3).next_u64_pair());
    }

    trait Pair {
        fn next_u64_pair(self) -> (u64, u64);
    }
    impl Pair for DeterministicRng {
        fn next_u64_pair(mut self) -> (u64, u64) {
            (self.next_u64(), self.next_u64())
        }
    }

    #[test]
    fn test_move_entity_updates_grid() {
        let mut w = test_world();
        let u = w.spawn_unit(UnitKind::Trooper, PlayerId(0), FixedVec2::from_cell(2, 2));
        w.move_entity(u, FixedVec2::new(to_fixed(30.0), to_fixed(30.0)));
        assert_eq!(
            w.unit_grid.query_rect_cells(28, 28, 32, 32),
            vec![u]
        );
    }
}
