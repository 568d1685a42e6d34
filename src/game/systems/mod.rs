//! Simulation Systems
//!
//! The pipeline, declared here in canonical layers:
//!
//! 1. input (selection) → 2. spawn → 3. placement (building-placement,
//! pathfinding) → 4. mechanics → 5. movement → 6. vision (after movement,
//! so fog reflects current positions) → 7. combat (combat, projectile,
//! ability) → 8. economy (resource, production, research) → 9. AI (only
//! when enabled) → 10. meta (game-state, checksum - last, so they observe
//! settled state).
//!
//! Audio sits between AI and meta conceptually, but it is a renderer-side
//! consumer and has no system here.

pub mod ability;
pub mod ai;
pub mod checksum_system;
pub mod combat;
pub mod game_state;
pub mod mechanics;
pub mod movement;
pub mod pathfinding;
pub mod placement;
pub mod production;
pub mod projectile;
pub mod research;
pub mod resource;
pub mod selection;
pub mod spawn;
pub mod vision;

use super::config::MatchOptions;
use super::registry::SystemSpec;

fn always(_: &MatchOptions) -> bool {
    true
}

fn when_ai(options: &MatchOptions) -> bool {
    options.ai_enabled
}

fn when_multiplayer(options: &MatchOptions) -> bool {
    options.is_multiplayer
}

/// The full system declaration table. Order here is the tie-break order for
/// the topological sort, so it mirrors the canonical layering.
pub fn system_specs() -> Vec<SystemSpec> {
    vec![
        SystemSpec {
            name: "selection",
            deps: &[],
            condition: always,
            factory: || Box::new(selection::SelectionSystem::new()),
        },
        SystemSpec {
            name: "spawn",
            deps: &["selection"],
            condition: always,
            factory: || Box::new(spawn::SpawnSystem),
        },
        SystemSpec {
            name: "building-placement",
            deps: &["spawn"],
            condition: always,
            factory: || Box::new(placement::PlacementSystem),
        },
        SystemSpec {
            name: "pathfinding",
            deps: &["building-placement"],
            condition: always,
            factory: || Box::new(pathfinding::PathfindingSystem::new()),
        },
        SystemSpec {
            name: "mechanics",
            deps: &["building-placement"],
            condition: always,
            factory: || Box::new(mechanics::MechanicsSystem),
        },
        SystemSpec {
            name: "movement",
            deps: &["pathfinding", "mechanics"],
            condition: always,
            factory: || Box::new(movement::MovementSystem),
        },
        SystemSpec {
            name: "vision",
            deps: &["movement"],
            condition: always,
            factory: || Box::new(vision::VisionSystem),
        },
        SystemSpec {
            name: "combat",
            deps: &["vision"],
            condition: always,
            factory: || Box::new(combat::CombatSystem),
        },
        SystemSpec {
            name: "projectile",
            deps: &["combat"],
            condition: always,
            factory: || Box::new(projectile::ProjectileSystem),
        },
        SystemSpec {
            name: "ability",
            deps: &["combat"],
            condition: always,
            factory: || Box::new(ability::AbilitySystem),
        },
        SystemSpec {
            name: "resource",
            deps: &["projectile"],
            condition: always,
            factory: || Box::new(resource::ResourceSystem),
        },
        SystemSpec {
            name: "production",
            deps: &["resource"],
            condition: always,
            factory: || Box::new(production::ProductionSystem),
        },
        SystemSpec {
            name: "research",
            deps: &["production"],
            condition: always,
            factory: || Box::new(research::ResearchSystem),
        },
        SystemSpec {
            name: "ai-strategic",
            deps: &["research"],
            condition: when_ai,
            factory: || Box::new(ai::strategic::AiStrategicSystem::new()),
        },
        SystemSpec {
            name: "ai-economy",
            deps: &["ai-strategic"],
            condition: when_ai,
            factory: || Box::new(ai::economy::AiEconomySystem::new()),
        },
        SystemSpec {
            name: "ai-micro",
            deps: &["ai-economy"],
            condition: when_ai,
            factory: || Box::new(ai::micro::AiMicroSystem),
        },
        SystemSpec {
            name: "game-state",
            deps: &["production", "research", "ai-micro"],
            condition: always,
            factory: || Box::new(game_state::GameStateSystem),
        },
        SystemSpec {
            name: "checksum",
            deps: &["game-state"],
            condition: when_multiplayer,
            factory: || Box::new(checksum_system::ChecksumSystem),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::registry::build_pipeline;

    #[test]
    fn test_pipeline_builds_with_canonical_order() {
        let options = MatchOptions {
            ai_enabled: true,
            is_multiplayer: true,
            ..MatchOptions::default()
        };
        let pipeline = build_pipeline(&system_specs(), &options).unwrap();
        let names: Vec<&str> = pipeline.iter().map(|s| s.name()).collect();

        let position = |n: &str| names.iter().position(|x| *x == n).unwrap();
        // Layer ordering invariants.
        assert!(position("spawn") < position("building-placement"));
        assert!(position("pathfinding") < position("movement"));
        assert!(position("movement") < position("vision"));
        assert!(position("vision") < position("combat"));
        assert!(position("combat") < position("projectile"));
        assert!(position("projectile") < position("resource"));
        assert!(position("research") < position("ai-strategic"));
        assert!(position("ai-micro") < position("game-state"));
        assert_eq!(*names.last().unwrap(), "checksum");
    }

    #[test]
    fn test_conditions_prune_systems() {
        let single = MatchOptions::default(); // no AI, no multiplayer
        let pipeline = build_pipeline(&system_specs(), &single).unwrap();
        let names: Vec<&str> = pipeline.iter().map(|s| s.name()).collect();

        assert!(!names.contains(&"ai-strategic"));
        assert!(!names.contains(&"checksum"));
        assert!(names.contains(&"game-state"));
    }
}
