//! Semantic diffusion (SPDE): Gaussian smoothing of a unit's weight signal.
//!
//! The ordered weights of a semantic state are treated as a 1-D signal.
//! A normalized Gaussian kernel smooths it with reflective boundaries, and
//! the result is blended with the original:
//!
//! ```text
//! out = (1 - rate) * original + rate * smoothed
//! ```

use crate::config::DiffusionConfig;
use crate::constants::MAX_DECAY_FACTOR;
use crate::error::{CoreError, Result};
use crate::geoid::SemanticState;

#[derive(Clone, Debug)]
pub struct DiffusionEngine {
    rate: f64,
    kernel: Vec<f64>,
}

impl DiffusionEngine {
    /// Build the engine and its kernel. Rejects a sigma outside
    /// (0, [`MAX_DECAY_FACTOR`]] or a rate outside [0, 1].
    pub fn new(config: &DiffusionConfig) -> Result<Self> {
        if !(0.0..=1.0).contains(&config.diffusion_rate) {
            return Err(CoreError::Configuration(format!(
                "diffusion_rate must be in [0, 1], got {}",
                config.diffusion_rate
            )));
        }
        if !(config.decay_factor > 0.0 && config.decay_factor <= MAX_DECAY_FACTOR) {
            return Err(CoreError::Configuration(format!(
                "decay_factor must be in (0, {MAX_DECAY_FACTOR}], got {}",
                config.decay_factor
            )));
        }
        Ok(Self {
            rate: config.diffusion_rate,
            kernel: gaussian_kernel(config.decay_factor),
        })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn kernel(&self) -> &[f64] {
        &self.kernel
    }

    /// Diffuse a semantic state. Keys and their order are preserved.
    pub fn diffuse(&self, state: &SemanticState) -> SemanticState {
        if state.is_empty() {
            return SemanticState::new();
        }
        let original: Vec<f64> = state.values().collect();
        let smoothed = self.smooth(&original);
        let blended: Vec<f64> = original
            .iter()
            .zip(&smoothed)
            .map(|(o, s)| (1.0 - self.rate) * o + self.rate * s)
            .collect();
        state.with_values(&blended)
    }

    /// Convolve a signal with the kernel using reflective boundaries.
    pub fn smooth(&self, signal: &[f64]) -> Vec<f64> {
        let n = signal.len();
        if n == 0 {
            return Vec::new();
        }
        let radius = (self.kernel.len() / 2) as isize;
        (0..n as isize)
            .map(|i| {
                self.kernel
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * signal[reflect(i + k as isize - radius, n)])
                    .sum()
            })
            .collect()
    }
}

/// Normalized Gaussian kernel. Size is the smallest odd integer ≥ 6σ, at least 3.
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let mut size = (6.0 * sigma).ceil() as usize;
    if size % 2 == 0 {
        size += 1;
    }
    let size = size.max(3);
    let radius = (size / 2) as f64;

    let raw: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - radius;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

/// Mirror an out-of-range tap back into `[0, n)` (`d c b a | a b c d | d c b a`),
/// then clamp for taps that overshoot a short signal.
fn reflect(j: isize, n: usize) -> usize {
    let n = n as isize;
    let mirrored = if j < 0 {
        -j - 1
    } else if j >= n {
        2 * n - j - 1
    } else {
        j
    };
    mirrored.clamp(0, n - 1) as usize
}
