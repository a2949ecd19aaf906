//! Core configuration for puppet-core.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Playback defaults shared by every model built from the same configuration.
/// Durations are in milliseconds, matching the host frame clock.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fade used for idle-group motions when neither the manifest nor the payload sets one.
    pub idle_motion_fading_duration_ms: f32,
    /// Fade used for all other motions when neither the manifest nor the payload sets one.
    pub motion_fading_duration_ms: f32,
    /// Fade used for expressions when neither the manifest nor the payload sets one.
    pub expression_fading_duration_ms: f32,

    /// Time constant of the exponential gaze smoothing.
    pub focus_time_constant_ms: f32,

    /// Emit sound requests for motions that carry a sound file.
    pub sound: bool,
    /// Keep the current expression while a non-idle motion plays.
    pub preserve_expression_on_motion: bool,
    /// Weight used when adding the lip-sync value onto lip-sync parameters.
    pub lip_sync_weight: f32,

    /// Seed for blink timing and random motion/expression picks. `None` uses entropy.
    pub random_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            idle_motion_fading_duration_ms: 2000.0,
            motion_fading_duration_ms: 500.0,
            expression_fading_duration_ms: 500.0,
            focus_time_constant_ms: 100.0,
            sound: true,
            preserve_expression_on_motion: true,
            lip_sync_weight: 0.8,
            random_seed: None,
        }
    }
}

impl Config {
    /// Build an rng for one subsystem. `salt` keeps seeded subsystems from sharing a sequence.
    pub fn rng(&self, salt: u64) -> StdRng {
        match self.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(salt)),
            None => StdRng::from_entropy(),
        }
    }
}
