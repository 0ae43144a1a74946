use std::{fs, ops::RangeInclusive, path::Path, time::Duration};

use anyhow::{Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng as _};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const FPS_RANGE: RangeInclusive<f64> = 0.01..=1000.0;
const MIN_FRAME_PERIOD: Duration = Duration::from_millis(1);
const MAX_FRAME_PERIOD: Duration = Duration::from_secs(100);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct TrainingConfig {
    pub(crate) max_episodes: usize,
    pub(crate) max_steps_per_episode: usize,
    pub(crate) learning_rate: f64,
    pub(crate) discount: f64,
    pub(crate) epsilon: f64,
    /// Unseeded runs draw from OS entropy and are not reproducible.
    pub(crate) seed: Option<u64>,
    pub(crate) yield_every_step: bool,
    pub(crate) step_delay_ms: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            max_episodes: 100,
            max_steps_per_episode: 100,
            learning_rate: 0.1,
            discount: 0.95,
            epsilon: 0.2,
            seed: None,
            yield_every_step: false,
            step_delay_ms: 0,
        }
    }
}

impl TrainingConfig {
    pub(crate) fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(ConfigError::LearningRate(self.learning_rate));
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(ConfigError::Discount(self.discount));
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(ConfigError::Epsilon(self.epsilon));
        }
        if self.max_episodes == 0 {
            return Err(ConfigError::ZeroLimit("max_episodes"));
        }
        if self.max_steps_per_episode == 0 {
            return Err(ConfigError::ZeroLimit("max_steps_per_episode"));
        }
        Ok(())
    }

    /// Random streams for the world and the agent, in that order.
    pub(crate) fn rngs(&self) -> (StdRng, StdRng) {
        match self.seed {
            Some(seed) => {
                let mut master = StdRng::seed_from_u64(seed);
                (
                    StdRng::seed_from_u64(master.gen()),
                    StdRng::seed_from_u64(master.gen()),
                )
            }
            None => (StdRng::from_entropy(), StdRng::from_entropy()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ViewConfig {
    pub(crate) fps: f64,
    pub(crate) width: usize,
    pub(crate) height: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        ViewConfig {
            fps: 30.0,
            width: 21,
            height: 21,
        }
    }
}

impl ViewConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !FPS_RANGE.contains(&self.fps) {
            return Err(ConfigError::FrameRate(self.fps));
        }
        if self.width == 0 {
            return Err(ConfigError::ZeroLimit("width"));
        }
        if self.height == 0 {
            return Err(ConfigError::ZeroLimit("height"));
        }
        Ok(())
    }
}

/// Time between frames, kept within what a timer can tick at.
pub(crate) fn frame_period(fps: f64) -> Duration {
    Duration::try_from_secs_f64(1.0 / fps)
        .unwrap_or(MAX_FRAME_PERIOD)
        .clamp(MIN_FRAME_PERIOD, MAX_FRAME_PERIOD)
}
