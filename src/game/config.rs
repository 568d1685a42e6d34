//! Match Configuration
//!
//! The full option surface a match is created with. Both peers must agree on
//! every field here - options are part of the deterministic initial state.

use serde::{Deserialize, Serialize};

use crate::world::entity::PlayerId;

/// AI difficulty levels; pace and aggression scale with each step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiDifficulty {
    /// Slow decisions, no counter-composition.
    Easy,
    /// Default.
    Medium,
    /// Faster cadence, counter-composition enabled.
    Hard,
    /// Aggressive expansion and harassment.
    VeryHard,
    /// Minimum decision cadence, full toolkit.
    Insane,
}

impl AiDifficulty {
    /// Ticks between AI state-machine evaluations.
    pub fn decision_cadence(self) -> u32 {
        match self {
            AiDifficulty::Easy => 60,
            AiDifficulty::Medium => 40,
            AiDifficulty::Hard => 25,
            AiDifficulty::VeryHard => 15,
            AiDifficulty::Insane => 10,
        }
    }

    /// Whether this difficulty consults the counter-composition matrix.
    pub fn uses_counters(self) -> bool {
        self >= AiDifficulty::Hard
    }
}

/// Recognized match options.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    /// Map width in cells; must match the blueprint canvas.
    pub map_width: u32,
    /// Map height in cells; must match the blueprint canvas.
    pub map_height: u32,
    /// Target ticks per second.
    pub tick_rate: u32,
    /// Enables checksum exchange, desync detection, authorization and
    /// command signing hooks.
    pub is_multiplayer: bool,
    /// Local player identity; the transport must corroborate it.
    pub player_id: PlayerId,
    /// Include AI systems in the pipeline.
    pub ai_enabled: bool,
    /// AI pacing and aggression.
    pub ai_difficulty: AiDifficulty,
    /// Lockstep command delay D, in ticks.
    pub command_delay_ticks: u32,
    /// Ticks between checksum emissions.
    pub checksum_interval: u32,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            map_width: 128,
            map_height: 128,
            tick_rate: 20,
            is_multiplayer: false,
            player_id: PlayerId(0),
            ai_enabled: false,
            ai_difficulty: AiDifficulty::Medium,
            command_delay_ticks: 4,
            checksum_interval: 5,
        }
    }
}

impl MatchOptions {
    /// Tick period in milliseconds.
    pub fn tick_period_ms(&self) -> u64 {
        1000 / self.tick_rate.max(1) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let o = MatchOptions::default();
        assert_eq!(o.tick_rate, 20);
        assert_eq!(o.tick_period_ms(), 50);
        assert_eq!(o.command_delay_ticks, 4);
        assert_eq!(o.checksum_interval, 5);
        assert!(!o.is_multiplayer);
    }

    #[test]
    fn test_difficulty_ordering() {
        assert!(AiDifficulty::Insane.decision_cadence() < AiDifficulty::Easy.decision_cadence());
        assert!(!AiDifficulty::Medium.uses_counters());
        assert!(AiDifficulty::Hard.uses_counters());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let o: MatchOptions =
            serde_json::from_str(r#"{"is_multiplayer": true, "tick_rate": 10}"#).unwrap();
        assert!(o.is_multiplayer);
        assert_eq!(o.tick_rate, 10);
        assert_eq!(o.map_width, 128);
    }
}
