//! Determinism laws: same inputs, bit-identical trajectories.

use ashfall::game::config::{AiDifficulty, MatchOptions};
use ashfall::sync::checksum::world_checksum;
use ashfall::sync::merkle::{build_merkle, locate_divergence};
use ashfall::world::tag;
use ashfall::{Blueprint, CommandKind, FixedVec2, Game, PlayerId};

fn options() -> MatchOptions {
    MatchOptions {
        is_multiplayer: true, // enables the checksum system
        ..MatchOptions::default()
    }
}

fn scripted_run(ticks: u32) -> Vec<(u32, u32)> {
    let blueprint = Blueprint::flat_test_map("det-scripted", 128, 128);
    let mut game = Game::new(&blueprint, options()).unwrap();
    game.start().unwrap();

    let workers = game.world().entities_with(tag::UNIT);
    for t in 1..=ticks {
        // Scripted orders at fixed ticks, no transport: single-player
        // immediate dispatch keeps the script trivially aligned.
        game.step();
        if t == 10 {
            game.issue_command(CommandKind::Move {
                units: vec![workers[0]],
                target: FixedVec2::from_cell(60, 60),
            });
        }
        if t == 30 {
            game.issue_command(CommandKind::Move {
                units: vec![workers[1], workers[2]],
                target: FixedVec2::from_cell(20, 70),
            });
        }
    }
    game.world().checksum_history.entries().collect()
}

#[test]
fn identical_scripts_identical_digests() {
    let run1 = scripted_run(100);
    let run2 = scripted_run(100);
    assert_eq!(run1.len(), 20);
    assert_eq!(run1, run2);
}

#[test]
fn ai_match_is_deterministic() {
    // The heavyweight law: full pipeline with AI on both sides, twice,
    // digest-equal at every interval.
    let run = || {
        let blueprint = Blueprint::flat_test_map("det-ai", 128, 128);
        let opts = MatchOptions {
            is_multiplayer: true,
            ai_enabled: true,
            ai_difficulty: AiDifficulty::Hard,
            // The "local player" is also AI-driven here: slot 255 is nobody.
            player_id: PlayerId(250),
            ..MatchOptions::default()
        };
        let mut game = Game::new(&blueprint, opts).unwrap();
        game.start().unwrap();
        for _ in 0..300 {
            game.step();
        }
        let digests: Vec<(u32, u32)> = game.world().checksum_history.entries().collect();
        (digests, world_checksum(game.world()))
    };

    let (digests1, final1) = run();
    let (digests2, final2) = run();
    assert_eq!(digests1, digests2);
    assert_eq!(final1, final2);
}

#[test]
fn blueprint_expansion_is_deterministic() {
    let blueprint = Blueprint::flat_test_map("det-map", 128, 128);
    let opts = MatchOptions::default();

    let w1 = blueprint.expand_world(&opts, 99).unwrap();
    let w2 = blueprint.expand_world(&opts, 99).unwrap();
    assert_eq!(world_checksum(&w1), world_checksum(&w2));
    assert_eq!(build_merkle(&w1).root, build_merkle(&w2).root);
}

#[test]
fn merkle_divergence_locates_exactly_the_corrupted_entity() {
    let blueprint = Blueprint::flat_test_map("det-merkle", 128, 128);
    let opts = MatchOptions::default();

    let w1 = blueprint.expand_world(&opts, 99).unwrap();
    let mut w2 = blueprint.expand_world(&opts, 99).unwrap();

    // Corrupt one unit's quantized health on the second "peer".
    let units = w2.entities_with(tag::UNIT);
    let victim = units[3];
    let owner = w2.owner_of(victim).unwrap();
    w2.healths.get_mut(&victim).unwrap().current -= ashfall::FIXED_ONE * 10;

    let local = build_merkle(&w1);
    let remote = build_merkle(&w2);
    assert_ne!(local.root, remote.root);

    let divergence = locate_divergence(&local, &remote).unwrap();
    assert_eq!(divergence.entities, vec![victim.raw()]);
    assert_eq!(
        divergence.path,
        vec![
            "root".to_string(),
            "units".to_string(),
            format!("player{}", owner.0),
            format!("entity:{}", victim.raw()),
        ]
    );

    // O(log n): far fewer comparisons than one per entity.
    let total_entities = w1.entities_with(tag::TRANSFORM).len() as u32;
    assert!(
        divergence.comparisons < total_entities,
        "comparisons {} vs entities {}",
        divergence.comparisons,
        total_entities
    );
}

#[test]
fn snapshot_roundtrip_preserves_checksum() {
    use ashfall::game::command::CommandQueue;
    use ashfall::sync::snapshot::{SealedSnapshot, Snapshot};

    let blueprint = Blueprint::flat_test_map("det-snap", 128, 128);
    let world = blueprint
        .expand_world(&MatchOptions::default(), 42)
        .unwrap();
    let queue = CommandQueue::new();

    let sealed = Snapshot::capture(&world, &queue).seal().unwrap();
    let bytes = sealed.encode().unwrap();
    let decoded = SealedSnapshot::decode(&bytes).unwrap();

    assert_eq!(decoded.snapshot.checksum, world_checksum(&world));
    assert_eq!(
        decoded.snapshot.checksum,
        decoded.snapshot.recompute_checksum()
    );
}

#[test]
fn flood_fill_matches_grid_walkability() {
    // A 20x20 plateau surrounded by unwalkable cells: the editor's flood
    // fill and the grid's walkable accounting agree on exactly 400 cells.
    use ashfall::game::blueprint::{PaintCommand, Rect};

    let mut blueprint = Blueprint::flat_test_map("det-fill", 128, 128);
    blueprint.paint = vec![
        PaintCommand::Void {
            rect: Rect {
                x: 0,
                y: 0,
                w: 128,
                h: 128,
            },
        },
        PaintCommand::Plateau {
            rect: Rect {
                x: 10,
                y: 10,
                w: 20,
                h: 20,
            },
            elevation: 140,
        },
    ];

    let grid = blueprint.expand_terrain();
    assert_eq!(grid.flood_fill_walkable(15, 15), 400);
    assert_eq!(grid.walkable_count(), 400);
}
