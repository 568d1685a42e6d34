//! Unit, Building and Research Catalogs
//!
//! Static stat tables, all integer literals. Costs are whole resource units,
//! ranges and speeds are Q16.16 with 1.0 = one terrain cell.

use serde::{Deserialize, Serialize};

use crate::core::fixed::{from_int, to_fixed, Fixed};

/// Unit catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum UnitKind {
    /// Gathers resources, constructs buildings.
    Scavenger = 0,
    /// Basic ranged infantry.
    Trooper = 1,
    /// Fast melee raider.
    Ravager = 2,
    /// Long-range siege unit.
    Arbalest = 3,
    /// Flying skirmisher.
    Skywing = 4,
}

/// Static stats for a unit kind.
pub struct UnitStats {
    /// Hit points.
    pub max_health: Fixed,
    /// Regenerating shield (0 for most ground units).
    pub max_shield: Fixed,
    /// Movement speed in cells/second.
    pub speed: Fixed,
    /// Damage per hit.
    pub attack_damage: Fixed,
    /// Attack range in cells (0 = melee reach).
    pub attack_range: Fixed,
    /// Ticks between attacks.
    pub attack_cooldown: u32,
    /// Vision radius in cells.
    pub sight_range: Fixed,
    /// Mineral cost.
    pub minerals: u32,
    /// Vespene cost.
    pub vespene: u32,
    /// Supply consumed.
    pub supply: u16,
    /// Production time in ticks.
    pub build_ticks: u32,
    /// Worker flag (can gather and construct).
    pub is_worker: bool,
    /// Flyer flag (ignores ground blocking).
    pub is_flying: bool,
    /// Focus-fire priority; higher is targeted first.
    pub target_priority: u8,
}

impl UnitKind {
    /// All unit kinds in id order.
    pub const ALL: [UnitKind; 5] = [
        UnitKind::Scavenger,
        UnitKind::Trooper,
        UnitKind::Ravager,
        UnitKind::Arbalest,
        UnitKind::Skywing,
    ];

    /// Stat table lookup.
    pub const fn stats(self) -> UnitStats {
        match self {
            UnitKind::Scavenger => UnitStats {
                max_health: from_int(40),
                max_shield: 0,
                speed: to_fixed(2.8),
                attack_damage: from_int(3),
                attack_range: to_fixed(0.5),
                attack_cooldown: 20,
                sight_range: from_int(8),
                minerals: 50,
                vespene: 0,
                supply: 1,
                build_ticks: 60,
                is_worker: true,
                is_flying: false,
                target_priority: 1,
            },
            UnitKind::Trooper => UnitStats {
                max_health: from_int(55),
                max_shield: 0,
                speed: to_fixed(2.5),
                attack_damage: from_int(6),
                attack_range: from_int(5),
                attack_cooldown: 17,
                sight_range: from_int(9),
                minerals: 60,
                vespene: 0,
                supply: 1,
                build_ticks: 80,
                is_worker: false,
                is_flying: false,
                target_priority: 3,
            },
            UnitKind::Ravager => UnitStats {
                max_health: from_int(85),
                max_shield: 0,
                speed: to_fixed(3.6),
                attack_damage: from_int(9),
                attack_range: to_fixed(0.5),
                attack_cooldown: 14,
                sight_range: from_int(8),
                minerals: 75,
                vespene: 25,
                supply: 2,
                build_ticks: 100,
                is_worker: false,
                is_flying: false,
                target_priority: 4,
            },
            UnitKind::Arbalest => UnitStats {
                max_health: from_int(70),
                max_shield: 0,
                speed: to_fixed(1.9),
                attack_damage: from_int(18),
                attack_range: from_int(9),
                attack_cooldown: 40,
                sight_range: from_int(10),
                minerals: 125,
                vespene: 75,
                supply: 3,
                build_ticks: 140,
                is_worker: false,
                is_flying: false,
                target_priority: 5,
            },
            UnitKind::Skywing => UnitStats {
                max_health: from_int(60),
                max_shield: from_int(20),
                speed: to_fixed(4.2),
                attack_damage: from_int(7),
                attack_range: from_int(4),
                attack_cooldown: 16,
                sight_range: from_int(10),
                minerals: 100,
                vespene: 100,
                supply: 2,
                build_ticks: 120,
                is_worker: false,
                is_flying: true,
                target_priority: 4,
            },
        }
    }
}

/// Building catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BuildingKind {
    /// Main base: produces workers, accepts resource returns.
    Headquarters = 0,
    /// Raises the supply cap.
    Depot = 1,
    /// Produces combat infantry.
    Barracks = 2,
    /// Built on a vespene geyser; enables vespene gathering.
    Extractor = 3,
    /// Static defense.
    Turret = 4,
    /// Blocks ground movement.
    Wall = 5,
    /// Researches upgrades.
    Forge = 6,
    /// Neutral vision tower captured by unit proximity.
    WatchTower = 7,
    /// Neutral destructible rocks blocking a path.
    Rocks = 8,
}

/// Static stats for a building kind.
pub struct BuildingStats {
    /// Hit points.
    pub max_health: Fixed,
    /// Footprint width in cells.
    pub width: u8,
    /// Footprint height in cells.
    pub height: u8,
    /// Mineral cost.
    pub minerals: u32,
    /// Vespene cost.
    pub vespene: u32,
    /// Construction time in ticks.
    pub build_ticks: u32,
    /// Supply cap granted when complete.
    pub supply_provided: u16,
    /// Vision radius in cells.
    pub sight_range: Fixed,
    /// Whether this building attacks (turrets).
    pub can_attack: bool,
    /// Damage per hit (attacking buildings only).
    pub attack_damage: Fixed,
    /// Attack range in cells.
    pub attack_range: Fixed,
    /// Ticks between attacks.
    pub attack_cooldown: u32,
    /// Whether the building can lift off and relocate.
    pub can_lift: bool,
    /// Unit kinds this building trains.
    pub trains: &'static [UnitKind],
}

impl BuildingKind {
    /// All building kinds in id order.
    pub const ALL: [BuildingKind; 9] = [
        BuildingKind::Headquarters,
        BuildingKind::Depot,
        BuildingKind::Barracks,
        BuildingKind::Extractor,
        BuildingKind::Turret,
        BuildingKind::Wall,
        BuildingKind::Forge,
        BuildingKind::WatchTower,
        BuildingKind::Rocks,
    ];

    /// Stat table lookup.
    pub const fn stats(self) -> BuildingStats {
        match self {
            BuildingKind::Headquarters => BuildingStats {
                max_health: from_int(1500),
                width: 4,
                height: 4,
                minerals: 400,
                vespene: 0,
                build_ticks: 600,
                supply_provided: 10,
                sight_range: from_int(9),
                can_attack: false,
                attack_damage: 0,
                attack_range: 0,
                attack_cooldown: 0,
                can_lift: true,
                trains: &[UnitKind::Scavenger],
            },
            BuildingKind::Depot => BuildingStats {
                max_health: from_int(400),
                width: 2,
                height: 2,
                minerals: 100,
                vespene: 0,
                build_ticks: 200,
                supply_provided: 8,
                sight_range: from_int(7),
                can_attack: false,
                attack_damage: 0,
                attack_range: 0,
                attack_cooldown: 0,
                can_lift: false,
                trains: &[],
            },
            BuildingKind::Barracks => BuildingStats {
                max_health: from_int(1000),
                width: 3,
                height: 3,
                minerals: 150,
                vespene: 0,
                build_ticks: 400,
                supply_provided: 0,
                sight_range: from_int(8),
                can_attack: false,
                attack_damage: 0,
                attack_range: 0,
                attack_cooldown: 0,
                can_lift: true,
                trains: &[
                    UnitKind::Trooper,
                    UnitKind::Ravager,
                    UnitKind::Arbalest,
                    UnitKind::Skywing,
                ],
            },
            BuildingKind::Extractor => BuildingStats {
                max_health: from_int(500),
                width: 3,
                height: 3,
                minerals: 75,
                vespene: 0,
                build_ticks: 160,
                supply_provided: 0,
                sight_range: from_int(7),
                can_attack: false,
                attack_damage: 0,
                attack_range: 0,
                attack_cooldown: 0,
                can_lift: false,
                trains: &[],
            },
            BuildingKind::Turret => BuildingStats {
                max_health: from_int(250),
                width: 2,
                height: 2,
                minerals: 100,
                vespene: 0,
                build_ticks: 180,
                supply_provided: 0,
                sight_range: from_int(11),
                can_attack: true,
                attack_damage: from_int(12),
                attack_range: from_int(7),
                attack_cooldown: 18,
                can_lift: false,
                trains: &[],
            },
            BuildingKind::Wall => BuildingStats {
                max_health: from_int(300),
                width: 1,
                height: 1,
                minerals: 25,
                vespene: 0,
                build_ticks: 60,
                supply_provided: 0,
                sight_range: from_int(2),
                can_attack: false,
                attack_damage: 0,
                attack_range: 0,
                attack_cooldown: 0,
                can_lift: false,
                trains: &[],
            },
            BuildingKind::Forge => BuildingStats {
                max_health: from_int(750),
                width: 3,
                height: 3,
                minerals: 150,
                vespene: 100,
                build_ticks: 350,
                supply_provided: 0,
                sight_range: from_int(8),
                can_attack: false,
                attack_damage: 0,
                attack_range: 0,
                attack_cooldown: 0,
                can_lift: false,
                trains: &[],
            },
            BuildingKind::WatchTower => BuildingStats {
                max_health: from_int(600),
                width: 2,
                height: 2,
                minerals: 0,
                vespene: 0,
                build_ticks: 1,
                supply_provided: 0,
                sight_range: from_int(14),
                can_attack: false,
                attack_damage: 0,
                attack_range: 0,
                attack_cooldown: 0,
                can_lift: false,
                trains: &[],
            },
            BuildingKind::Rocks => BuildingStats {
                max_health: from_int(800),
                width: 2,
                height: 2,
                minerals: 0,
                vespene: 0,
                build_ticks: 1,
                supply_provided: 0,
                sight_range: 0,
                can_attack: false,
                attack_damage: 0,
                attack_range: 0,
                attack_cooldown: 0,
                can_lift: false,
                trains: &[],
            },
        }
    }
}

/// Research catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResearchId {
    /// +1 attack damage per level for all combat units.
    WeaponUpgrade = 0,
    /// Faster worker gathering trips.
    GatherUpgrade = 1,
    /// +10% movement speed for ground combat units.
    PropulsionUpgrade = 2,
}

/// Static research parameters.
pub struct ResearchStats {
    /// Mineral cost.
    pub minerals: u32,
    /// Vespene cost.
    pub vespene: u32,
    /// Research time in ticks.
    pub ticks: u32,
}

impl ResearchId {
    /// All research ids in order.
    pub const ALL: [ResearchId; 3] = [
        ResearchId::WeaponUpgrade,
        ResearchId::GatherUpgrade,
        ResearchId::PropulsionUpgrade,
    ];

    /// Stat table lookup.
    pub const fn stats(self) -> ResearchStats {
        match self {
            ResearchId::WeaponUpgrade => ResearchStats {
                minerals: 100,
                vespene: 100,
                ticks: 800,
            },
            ResearchId::GatherUpgrade => ResearchStats {
                minerals: 100,
                vespene: 0,
                ticks: 500,
            },
            ResearchId::PropulsionUpgrade => ResearchStats {
                minerals: 150,
                vespene: 150,
                ticks: 900,
            },
        }
    }
}

/// Ability catalog (per-unit active abilities with cooldowns).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AbilityId {
    /// Short self-haste for infantry; costs energy.
    Overdrive = 0,
    /// Arbalest area barrage at a target point, lands after a delay.
    Barrage = 1,
}

/// Static ability parameters.
pub struct AbilityStats {
    /// Cooldown in ticks.
    pub cooldown: u32,
    /// Energy cost (Q16.16).
    pub energy_cost: Fixed,
    /// Effect duration or impact delay, in ticks.
    pub duration: u32,
}

impl AbilityId {
    /// Stat table lookup.
    pub const fn stats(self) -> AbilityStats {
        match self {
            AbilityId::Overdrive => AbilityStats {
                cooldown: 200,
                energy_cost: from_int(25),
                duration: 60,
            },
            AbilityId::Barrage => AbilityStats {
                cooldown: 300,
                energy_cost: from_int(50),
                duration: 30,
            },
        }
    }
}
