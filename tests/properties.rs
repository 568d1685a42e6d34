//! Property tests for the invariant-heavy corners.

use proptest::prelude::*;

use ashfall::core::fixed::{
    fixed_abs, fixed_div, fixed_mul, quantize_amount, quantize_pos, to_int_floor, AMOUNT_QUANT_SHIFT,
    POS_QUANT_SHIFT,
};
use ashfall::game::command::{CommandKind, CommandQueue, GameCommand};
use ashfall::world::grid::SpatialGrid;
use ashfall::{EntityId, FixedVec2, PlayerId};

proptest! {
    #[test]
    fn fixed_mul_commutes(a in -1_000_000i32..1_000_000, b in -1_000_000i32..1_000_000) {
        prop_assert_eq!(fixed_mul(a, b), fixed_mul(b, a));
    }

    #[test]
    fn fixed_div_inverts_mul_roughly(
        a in -500_000i32..500_000,
        b in 1_000i32..500_000,
    ) {
        // (a * b) / b stays within one quantum of a.
        let product = fixed_mul(a, b);
        let back = fixed_div(product, b);
        prop_assert!(fixed_abs(back - a) <= (1 << 16) / b.min(1 << 16) + 2);
    }

    #[test]
    fn quantization_is_idempotent(v in any::<i32>()) {
        // Law: the checksum function applied twice to the same value is
        // stable - re-quantizing a quantized value changes nothing.
        let q = quantize_pos(v);
        prop_assert_eq!(quantize_pos(q << POS_QUANT_SHIFT), q);
        let qa = quantize_amount(v);
        prop_assert_eq!(quantize_amount(qa << AMOUNT_QUANT_SHIFT), qa);
    }

    #[test]
    fn floor_is_monotonic(a in any::<i32>(), b in any::<i32>()) {
        if a <= b {
            prop_assert!(to_int_floor(a) <= to_int_floor(b));
        }
    }

    #[test]
    fn grid_rect_query_is_exact_on_candidates(
        positions in prop::collection::vec((0i32..100, 0i32..100), 1..40),
        rect in (0i32..80, 0i32..80, 1i32..20, 1i32..20),
    ) {
        // Law: every entity whose position lies in the rectangle appears in
        // the result; candidates outside may appear (bucket granularity)
        // but after the caller's exact filter the sets are equal.
        let (rx, ry, rw, rh) = rect;
        let (min_x, min_y, max_x, max_y) = (rx, ry, rx + rw, ry + rh);

        let mut grid = SpatialGrid::new();
        for (i, (x, y)) in positions.iter().enumerate() {
            grid.insert(EntityId(i as u32), FixedVec2::from_cell(*x, *y));
        }

        let candidates = grid.query_rect_cells(min_x, min_y, max_x, max_y);

        for (i, (x, y)) in positions.iter().enumerate() {
            let inside = *x >= min_x && *x <= max_x && *y >= min_y && *y <= max_y;
            if inside {
                prop_assert!(
                    candidates.contains(&EntityId(i as u32)),
                    "entity {} at ({}, {}) missing from rect ({}, {})..({}, {})",
                    i, x, y, min_x, min_y, max_x, max_y
                );
            }
        }

        // Sorted ascending, no duplicates.
        for pair in candidates.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn command_dispatch_order_is_lexicographic(
        seed_cmds in prop::collection::vec((0u8..4, 0u32..50, 0u8..3), 1..30),
    ) {
        // Law: for any two commands on the same tick, dispatch order is
        // uniquely (playerId, type, first entity id) - regardless of
        // enqueue order.
        let mut queue = CommandQueue::new();
        for (player, entity, kind_pick) in &seed_cmds {
            let kind = match kind_pick {
                0 => CommandKind::Move {
                    units: vec![EntityId(*entity)],
                    target: FixedVec2::from_cell(5, 5),
                },
                1 => CommandKind::Stop {
                    units: vec![EntityId(*entity)],
                },
                _ => CommandKind::Patrol {
                    units: vec![EntityId(*entity)],
                    target: FixedVec2::from_cell(9, 9),
                },
            };
            queue
                .enqueue(
                    GameCommand {
                        tick: 7,
                        player: PlayerId(*player),
                        kind,
                    },
                    0,
                )
                .unwrap();
        }

        let drained = queue.drain_tick(7);
        let keys: Vec<_> = drained.iter().map(|c| c.sort_key()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        prop_assert_eq!(keys, sorted);
    }

    #[test]
    fn sort_key_is_insertion_order_independent(
        seed_cmds in prop::collection::vec((0u8..4, 0u32..50), 2..20),
    ) {
        let build = |order: &[(u8, u32)]| {
            let mut queue = CommandQueue::new();
            for (player, entity) in order {
                queue
                    .enqueue(
                        GameCommand {
                            tick: 3,
                            player: PlayerId(*player),
                            kind: CommandKind::Stop {
                                units: vec![EntityId(*entity)],
                            },
                        },
                        0,
                    )
                    .unwrap();
            }
            queue.drain_tick(3)
        };

        let forward = build(&seed_cmds);
        let reversed: Vec<_> = seed_cmds.iter().rev().copied().collect();
        let backward = build(&reversed);
        prop_assert_eq!(forward, backward);
    }
}
