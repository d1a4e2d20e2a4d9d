//! Engine configuration.
//!
//! Every section deserializes with defaults, so a partial TOML file (or none
//! at all) yields a working engine. [`EngineConfig::validate`] rejects bad
//! values up front; engines are never built from an unvalidated config.

use serde::{Deserialize, Serialize};

use crate::constants::{
    COLLAPSE_THRESHOLD, CYCLE_STATS_CAPACITY, DECAY_FACTOR, DIFFUSION_RATE, EMBEDDING_DIM,
    ENTROPY_HISTORY_CAPACITY, HISTOGRAM_BINS, MAX_COMPARISONS, MAX_DECAY_FACTOR, PRESSURE_SATURATION,
    PRESSURE_WINDOW_SECS, STABILITY_RECENT_SCARS, STABILITY_RECENT_UNITS, SURGE_THRESHOLD,
    TENSION_THRESHOLD,
};
use crate::embedding::BackendKind;
use crate::entropy::Estimator;
use crate::error::{CoreError, Result};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub diffusion: DiffusionConfig,
    pub contradiction: ContradictionConfig,
    pub entropy: EntropyConfig,
    pub cycle: CycleConfig,
    pub stability: StabilityConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiffusionConfig {
    pub diffusion_rate: f64,
    /// Gaussian sigma.
    pub decay_factor: f64,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self {
            diffusion_rate: DIFFUSION_RATE,
            decay_factor: DECAY_FACTOR,
        }
    }
}

/// Thresholds here are empirical and meant to be overridden.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContradictionConfig {
    pub tension_threshold: f64,
    pub collapse_threshold: f64,
    pub surge_threshold: f64,
    pub allow_surges: bool,
}

impl Default for ContradictionConfig {
    fn default() -> Self {
        Self {
            tension_threshold: TENSION_THRESHOLD,
            collapse_threshold: COLLAPSE_THRESHOLD,
            surge_threshold: SURGE_THRESHOLD,
            allow_surges: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EntropyConfig {
    /// `mle`, `miller_madow` or `chao_shen`.
    pub estimator: String,
    pub log_base: f64,
    pub histogram_bins: usize,
    pub history_capacity: usize,
}

impl Default for EntropyConfig {
    fn default() -> Self {
        Self {
            estimator: Estimator::Mle.as_str().to_string(),
            log_base: 2.0,
            histogram_bins: HISTOGRAM_BINS,
            history_capacity: ENTROPY_HISTORY_CAPACITY,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CycleConfig {
    pub max_comparisons: usize,
    pub stats_capacity: usize,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            max_comparisons: MAX_COMPARISONS,
            stats_capacity: CYCLE_STATS_CAPACITY,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StabilityConfig {
    pub recent_units: usize,
    pub recent_scars: usize,
    pub pressure_window_secs: u64,
    pub pressure_saturation: f64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            recent_units: STABILITY_RECENT_UNITS,
            recent_scars: STABILITY_RECENT_SCARS,
            pressure_window_secs: PRESSURE_WINDOW_SECS,
            pressure_saturation: PRESSURE_SATURATION,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub dimension: usize,
    /// Backends in fallback order.
    pub backends: Vec<BackendKind>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: EMBEDDING_DIM,
            backends: vec![BackendKind::Precomputed, BackendKind::FeatureHash, BackendKind::Zero],
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let d = &self.diffusion;
        if !(0.0..=1.0).contains(&d.diffusion_rate) {
            return Err(config_err(format!(
                "diffusion.diffusion_rate must be in [0, 1], got {}",
                d.diffusion_rate
            )));
        }
        if !(d.decay_factor > 0.0 && d.decay_factor <= MAX_DECAY_FACTOR) {
            return Err(config_err(format!(
                "diffusion.decay_factor must be in (0, {MAX_DECAY_FACTOR}], got {}",
                d.decay_factor
            )));
        }

        let c = &self.contradiction;
        for (name, v) in [
            ("tension_threshold", c.tension_threshold),
            ("collapse_threshold", c.collapse_threshold),
            ("surge_threshold", c.surge_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(config_err(format!(
                    "contradiction.{name} must be in [0, 1], got {v}"
                )));
            }
        }
        if c.surge_threshold > c.collapse_threshold {
            return Err(config_err(format!(
                "contradiction.surge_threshold ({}) exceeds collapse_threshold ({})",
                c.surge_threshold, c.collapse_threshold
            )));
        }

        let e = &self.entropy;
        e.estimator.parse::<Estimator>()?;
        if !(e.log_base > 1.0 && e.log_base.is_finite()) {
            return Err(config_err(format!(
                "entropy.log_base must be > 1, got {}",
                e.log_base
            )));
        }
        if e.histogram_bins == 0 {
            return Err(config_err("entropy.histogram_bins must be non-zero"));
        }
        if e.history_capacity == 0 {
            return Err(config_err("entropy.history_capacity must be non-zero"));
        }

        if self.cycle.stats_capacity == 0 {
            return Err(config_err("cycle.stats_capacity must be non-zero"));
        }

        let s = &self.stability;
        if s.recent_units == 0 || s.recent_scars == 0 {
            return Err(config_err("stability windows must be non-zero"));
        }
        if s.pressure_saturation <= 0.0 {
            return Err(config_err(format!(
                "stability.pressure_saturation must be positive, got {}",
                s.pressure_saturation
            )));
        }

        if self.embedding.dimension == 0 {
            return Err(config_err("embedding.dimension must be non-zero"));
        }
        if self.embedding.backends.is_empty() {
            return Err(config_err("embedding.backends must list at least one backend"));
        }

        Ok(())
    }
}

fn config_err(msg: impl Into<String>) -> CoreError {
    CoreError::Configuration(msg.into())
}
