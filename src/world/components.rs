//! Component Records
//!
//! Plain-value components attached to entities. Components never hold
//! references to each other - relationships are entity id fields resolved
//! through the world on access, so there is nothing to invalidate and
//! nothing to keep alive.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::fixed::{Fixed, FIXED_ONE};
use crate::core::vec2::FixedVec2;
use crate::world::entity::{EntityId, PlayerId};
use crate::world::kinds::{AbilityId, BuildingKind, UnitKind};

/// Position and facing. Elevation mirrors terrain height for ground units
/// and flight altitude for flyers; it is quantized with positions at the
/// hash boundary.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Transform {
    /// Position in cell units (Q16.16).
    pub position: FixedVec2,
    /// Elevation (Q16.16).
    pub elevation: Fixed,
    /// Facing angle in BAM units.
    pub orientation: u16,
}

impl Transform {
    /// Transform at a position with default facing.
    pub fn at(position: FixedVec2) -> Self {
        Self {
            position,
            elevation: 0,
            orientation: 0,
        }
    }
}

/// Unit behavior state. Transitions happen only inside systems.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum UnitState {
    /// Holding position, will auto-acquire targets in range.
    #[default]
    Idle = 0,
    /// Moving to target position, ignoring enemies.
    Moving = 1,
    /// Moving, engaging anything encountered.
    AttackMoving = 2,
    /// Engaging a specific target.
    Attacking = 3,
    /// Worker gather loop.
    Gathering = 4,
    /// Worker constructing a building.
    Building = 5,
}

/// A mobile unit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Unit {
    /// Catalog kind.
    pub kind: UnitKind,
    /// Behavior state.
    pub state: UnitState,
    /// Entity this unit is attacking/following/constructing.
    pub target_entity: Option<EntityId>,
    /// Point this unit is moving toward.
    pub target_pos: Option<FixedVec2>,
    /// Attack range in cells.
    pub attack_range: Fixed,
    /// Vision radius in cells.
    pub sight_range: Fixed,
    /// Worker flag.
    pub is_worker: bool,
    /// Flyer flag.
    pub is_flying: bool,
    /// Ticks until the next attack is allowed.
    pub attack_cooldown: u32,
    /// Resource units carried (workers).
    pub carrying: u32,
    /// Which resource node a gathering worker works (workers).
    pub gather_target: Option<EntityId>,
    /// Remaining waypoints toward `target_pos`, next waypoint first.
    /// Derived from hashed state; not hashed itself.
    pub path: Vec<FixedVec2>,
    /// Far end of a patrol leg; swaps with `target_pos` on arrival.
    pub patrol_origin: Option<FixedVec2>,
    /// Pending construction order for a worker en route to the site.
    pub pending_build: Option<(BuildingKind, (i32, i32))>,
    /// Overdrive buff ticks remaining.
    pub overdrive_ticks: u32,
}

impl Unit {
    /// New unit of a kind, stats pulled from the catalog.
    pub fn new(kind: UnitKind) -> Self {
        let stats = kind.stats();
        Self {
            kind,
            state: UnitState::Idle,
            target_entity: None,
            target_pos: None,
            attack_range: stats.attack_range,
            sight_range: stats.sight_range,
            is_worker: stats.is_worker,
            is_flying: stats.is_flying,
            attack_cooldown: 0,
            carrying: 0,
            gather_target: None,
            path: Vec::new(),
            patrol_origin: None,
            pending_build: None,
            overdrive_ticks: 0,
        }
    }

    /// Drop any order and return to idle.
    pub fn clear_orders(&mut self) {
        self.state = UnitState::Idle;
        self.target_entity = None;
        self.target_pos = None;
        self.path.clear();
        self.patrol_origin = None;
        self.pending_build = None;
    }
}

/// Building lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum BuildingState {
    /// Under construction.
    #[default]
    Constructing = 0,
    /// Operational.
    Complete = 1,
    /// Leaving the ground.
    Lifting = 2,
    /// Airborne, can be ordered to land.
    Flying = 3,
    /// Descending onto a new footprint.
    Landing = 4,
}

/// One queued production order. Only the head of a queue progresses.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ProductionItem {
    /// What is being trained.
    pub kind: UnitKind,
    /// Ticks of progress so far.
    pub progress: u32,
}

/// A structure. Footprints are aligned to the integer cell grid; the
/// footprint origin is the cell of `Transform.position`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Building {
    /// Catalog kind.
    pub kind: BuildingKind,
    /// Footprint width in cells.
    pub width: u8,
    /// Footprint height in cells.
    pub height: u8,
    /// Lifecycle state.
    pub state: BuildingState,
    /// Construction progress in [0, FIXED_ONE].
    pub build_progress: Fixed,
    /// Pending production orders, head first.
    pub production_queue: Vec<ProductionItem>,
    /// Where produced units walk after spawning.
    pub rally: Option<FixedVec2>,
    /// Attached addon building, by id.
    pub addon: Option<EntityId>,
    /// Whether this building attacks.
    pub can_attack: bool,
    /// Ticks until the next attack (attacking buildings).
    pub attack_cooldown: u32,
    /// Autocast/auto-engage toggle (turrets).
    pub autocast: bool,
    /// Landing footprint origin while in the Landing state.
    pub land_cell: Option<(i32, i32)>,
    /// Ticks spent in the current lift/land transition.
    pub transition_ticks: u32,
}

impl Building {
    /// New building of a kind at the start of construction.
    pub fn new(kind: BuildingKind) -> Self {
        let stats = kind.stats();
        Self {
            kind,
            width: stats.width,
            height: stats.height,
            state: BuildingState::Constructing,
            build_progress: 0,
            production_queue: Vec::new(),
            rally: None,
            addon: None,
            can_attack: stats.can_attack,
            attack_cooldown: 0,
            autocast: stats.can_attack,
            land_cell: None,
            transition_ticks: 0,
        }
    }

    /// Fully-built variant (scripted starts, blueprint spawns).
    pub fn completed(kind: BuildingKind) -> Self {
        let mut b = Self::new(kind);
        b.state = BuildingState::Complete;
        b.build_progress = FIXED_ONE;
        b
    }

    /// True once construction has finished and the building is on the ground.
    pub fn is_operational(&self) -> bool {
        self.state == BuildingState::Complete
    }
}

/// Hit points and shields.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Health {
    /// Current hit points; dead iff `current <= 0`.
    pub current: Fixed,
    /// Maximum hit points.
    pub max: Fixed,
    /// Current shield (absorbs damage first).
    pub shield: Fixed,
    /// Maximum shield.
    pub max_shield: Fixed,
    /// Tick of the most recent damage taken.
    pub last_damage_tick: u32,
}

impl Health {
    /// Full health with optional shield.
    pub fn full(max: Fixed, max_shield: Fixed) -> Self {
        Self {
            current: max,
            max,
            shield: max_shield,
            max_shield,
            last_damage_tick: 0,
        }
    }

    /// True once hit points are exhausted.
    #[inline]
    pub fn is_dead(&self) -> bool {
        self.current <= 0
    }

    /// Apply damage: shield first, then hull. Records the tick.
    pub fn apply_damage(&mut self, amount: Fixed, tick: u32) {
        self.last_damage_tick = tick;
        let absorbed = amount.min(self.shield);
        self.shield -= absorbed;
        self.current = (self.current - (amount - absorbed)).max(0);
    }
}

/// Ownership. Immutable after creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selectable {
    /// Owning player slot.
    pub player: PlayerId,
}

/// Resource kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResourceKind {
    /// Primary resource, gathered directly.
    Minerals = 0,
    /// Secondary resource, requires an extractor on the geyser.
    Vespene = 1,
}

/// A harvestable resource node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Mineral patch or vespene geyser.
    pub kind: ResourceKind,
    /// Remaining amount; the node is destroyed at 0.
    pub amount: u32,
    /// Workers currently assigned (saturation metric for AI).
    pub gatherers: u8,
    /// Extractor built on this geyser, by id (vespene only).
    pub extractor: Option<EntityId>,
}

/// Per-unit ability state: cooldowns tick down monotonically, energy
/// regenerates toward its cap.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Ability {
    /// Remaining cooldown ticks per ability.
    pub cooldowns: BTreeMap<AbilityId, u32>,
    /// Current energy (Q16.16).
    pub energy: Fixed,
    /// Energy cap.
    pub max_energy: Fixed,
}

impl Ability {
    /// Fresh ability pool with the given energy cap.
    pub fn with_energy(max_energy: Fixed) -> Self {
        Self {
            cooldowns: BTreeMap::new(),
            energy: max_energy >> 1,
            max_energy,
        }
    }

    /// True if the ability is off cooldown and energy suffices.
    pub fn ready(&self, id: AbilityId) -> bool {
        self.cooldowns.get(&id).copied().unwrap_or(0) == 0
            && self.energy >= id.stats().energy_cost
    }
}

/// A projectile in flight. Damage lands when it reaches its target.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Projectile {
    /// Entity that fired.
    pub source: EntityId,
    /// Entity being tracked, if homing.
    pub target_entity: Option<EntityId>,
    /// Impact point for ground-targeted shots.
    pub target_pos: FixedVec2,
    /// Damage on impact.
    pub damage: Fixed,
    /// Splash radius (0 = single target).
    pub splash_radius: Fixed,
    /// Travel speed in cells/second.
    pub speed: Fixed,
}
