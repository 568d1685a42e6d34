//! # Ashfall Simulation Core
//!
//! Deterministic lockstep simulation for the Ashfall RTS engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ASHFALL SIM CORE                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── fixed.rs    - Q16.16 fixed-point + hash quantization    │
//! │  ├── trig.rs     - Integer-input sin/cos (BAM angles)        │
//! │  ├── vec2.rs     - 2D vector over fixed-point                │
//! │  ├── rng.rs      - Xorshift128+, per-tick reseeding          │
//! │  └── hash.rs     - 32-bit fold checksum + SHA-256 digests    │
//! │                                                              │
//! │  world/          - Entity-component store                    │
//! │  ├── entity.rs   - Monotonic ids, never reused               │
//! │  ├── components  - Transform, Unit, Building, Health, ...    │
//! │  ├── terrain.rs  - Per-cell class/elevation/feature grid     │
//! │  └── grid.rs     - Cell-bucketed spatial indices             │
//! │                                                              │
//! │  game/           - Lockstep machinery + systems              │
//! │  ├── command.rs  - Tick-bucketed queue, authorization        │
//! │  ├── events.rs   - Synchronous event bus                     │
//! │  ├── scheduler.rs- Fixed-timestep accumulator + timer thread │
//! │  ├── registry.rs - Topologically ordered system pipeline     │
//! │  ├── blueprint.rs- Deterministic map expansion               │
//! │  └── systems/    - spawn → ... → combat → economy → AI → meta│
//! │                                                              │
//! │  sync/           - Verification                              │
//! │  ├── checksum.rs - Canonical quantized state walk            │
//! │  ├── merkle.rs   - 3-level hash tree + compact wire form     │
//! │  ├── desync.rs   - Digest reconciliation, divergence reports │
//! │  └── snapshot.rs - Versioned state dumps                     │
//! │                                                              │
//! │  net/            - Edge (non-deterministic territory)        │
//! │  ├── transport.rs- Abstract port + loopback implementation   │
//! │  └── signing.rs  - Canonical-JSON command signatures         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! `core/`, `world/`, `game/` and `sync/` are 100% deterministic:
//! - No floating point in gameplay logic (Q16.16 everywhere)
//! - No HashMap (BTreeMap keeps every iteration in ascending id order)
//! - No wall-clock reads outside the scheduler's accumulator
//! - All randomness from the seeded, per-tick-reseeded Xorshift128+
//!
//! Two peers given the same blueprint, options and ordered command stream
//! produce bit-identical state - and the sync layer proves it every few
//! ticks, or tells you exactly which entity disagrees.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod net;
pub mod sync;
pub mod world;

// Re-export commonly used types
pub use crate::core::fixed::{Fixed, FIXED_HALF, FIXED_ONE};
pub use crate::core::rng::DeterministicRng;
pub use crate::core::vec2::FixedVec2;
pub use game::blueprint::Blueprint;
pub use game::command::{CommandKind, GameCommand};
pub use game::config::{AiDifficulty, MatchOptions};
pub use game::{Game, GamePhase};
pub use world::entity::{EntityId, PlayerId};
pub use world::World;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default simulation tick rate (Hz).
pub const TICK_RATE: u32 = 20;

/// Default lockstep command delay, in ticks (200 ms at 20 TPS).
pub const COMMAND_DELAY_TICKS: u32 = 4;

/// Default checksum emission interval, in ticks.
pub const CHECKSUM_INTERVAL: u32 = 5;
