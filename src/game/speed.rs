use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fraction of the gap to the target speed closed per 60 Hz reference step.
pub const SMOOTHING_FACTOR: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Difficulty {
    #[default]
    Easy,
    Hard,
}

/// Per-tier constants for the speed model and the spawner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierTuning {
    pub start_speed: f32,
    pub base_speed: f32,
    pub speed_multiplier: f32,
    /// Bass level (0-255) above which a tempo-gated spawn may happen.
    pub spawn_threshold: f32,
    /// Longest allowed gap between two notes, in milliseconds.
    pub silence_ceiling_ms: f64,
    /// Chance to accept a silence-gated spawn attempt.
    pub accept_chance: f64,
    pub hold_chance: f64,
}

impl Difficulty {
    pub const fn tuning(self) -> TierTuning {
        match self {
            Difficulty::Easy => TierTuning {
                start_speed: 0.2,
                base_speed: 0.3,
                speed_multiplier: 0.7,
                spawn_threshold: 160.0,
                silence_ceiling_ms: 1200.0,
                accept_chance: 0.7,
                hold_chance: 0.08,
            },
            Difficulty::Hard => TierTuning {
                start_speed: 0.2,
                base_speed: 0.5,
                speed_multiplier: 1.0,
                spawn_threshold: 140.0,
                silence_ceiling_ms: 800.0,
                accept_chance: 0.85,
                hold_chance: 0.15,
            },
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => f.write_str("EASY"),
            Difficulty::Hard => f.write_str("HARD"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("easy") {
            Ok(Difficulty::Easy)
        } else if trimmed.eq_ignore_ascii_case("hard") {
            Ok(Difficulty::Hard)
        } else {
            Err(format!("Difficulty '{}' must be EASY or HARD", trimmed))
        }
    }
}

/// Scroll speed driven by bass energy, eased towards its target every tick.
#[derive(Debug, Clone)]
pub struct SpeedModel {
    tuning: TierTuning,
    current: f32,
    target: f32,
}

impl SpeedModel {
    pub fn new(difficulty: Difficulty) -> Self {
        let tuning = difficulty.tuning();
        Self {
            tuning,
            current: tuning.start_speed,
            target: tuning.start_speed,
        }
    }

    pub fn reset(&mut self) {
        self.current = self.tuning.start_speed;
        self.target = self.tuning.start_speed;
    }

    /// Instantaneous speed for a bass reading.
    pub fn target_for(&self, bass: f32) -> f32 {
        let ratio = (bass / 255.0).clamp(0.0, 1.0);
        self.tuning.base_speed + ratio * self.tuning.speed_multiplier
    }

    /// Eases the current speed towards the target for `bass` and returns it.
    pub fn update(&mut self, bass: f32, dt_factor: f32) -> f32 {
        self.target = self.target_for(bass);
        self.current += (self.target - self.current) * SMOOTHING_FACTOR * dt_factor;
        self.current
    }

    #[inline(always)]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline(always)]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline(always)]
    pub fn tuning(&self) -> &TierTuning {
        &self.tuning
    }
}
