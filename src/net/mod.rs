//! Networking Edge
//!
//! The abstract transport port, the wire message shapes, and the optional
//! command-signing layer. Everything here is non-deterministic territory;
//! nothing below `game/` may depend on it.

pub mod signing;
pub mod transport;
