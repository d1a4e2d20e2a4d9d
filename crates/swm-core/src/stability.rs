//! Coarse health metrics derived from recent scars and recent geoids.
//!
//! Pure function of its inputs: the caller supplies the recent scars, the
//! geoid population and the clock.

use serde::{Deserialize, Serialize};

use crate::config::StabilityConfig;
use crate::distance::cosine_distance;
use crate::geoid::Geoid;
use crate::scar::Scar;
use crate::time::iso8601_to_unix;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StabilitySnapshot {
    /// Recent scar rate, saturating at 1.0.
    pub vault_pressure: f64,
    /// `1 - mean pairwise cosine distance` over recent embeddings.
    pub semantic_cohesion: f64,
    /// Mean recent entropy delta mapped from [-1, 1] onto [0, 1].
    pub entropic_stability: f64,
}

impl Default for StabilitySnapshot {
    fn default() -> Self {
        Self {
            vault_pressure: 0.0,
            semantic_cohesion: 1.0,
            entropic_stability: 0.5,
        }
    }
}

impl StabilitySnapshot {
    pub fn axis_convergence(&self) -> f64 {
        self.semantic_cohesion
    }

    pub fn vault_resonance(&self) -> f64 {
        1.0 - self.vault_pressure
    }

    pub fn contradiction_lineage_ambiguity(&self) -> f64 {
        1.0 - self.entropic_stability
    }
}

#[derive(Clone, Debug)]
pub struct StabilityMonitor {
    config: StabilityConfig,
}

impl StabilityMonitor {
    pub fn new(config: &StabilityConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// How many scars the snapshot wants from the vault.
    pub fn scar_window(&self) -> usize {
        self.config.recent_scars
    }

    /// `geoids` is in creation order; only the last `recent_units` count.
    pub fn snapshot(&self, recent_scars: &[Scar], geoids: &[Geoid], now_secs: u64) -> StabilitySnapshot {
        let scars = &recent_scars[..recent_scars.len().min(self.config.recent_scars)];
        let start = geoids.len().saturating_sub(self.config.recent_units);
        StabilitySnapshot {
            vault_pressure: self.vault_pressure(scars, now_secs),
            semantic_cohesion: semantic_cohesion(&geoids[start..]),
            entropic_stability: entropic_stability(scars),
        }
    }

    fn vault_pressure(&self, scars: &[Scar], now_secs: u64) -> f64 {
        let cutoff = now_secs.saturating_sub(self.config.pressure_window_secs);
        let recent = scars
            .iter()
            .filter_map(|s| iso8601_to_unix(&s.timestamp))
            .filter(|&t| t >= cutoff)
            .count();
        (recent as f64 / self.config.pressure_saturation).min(1.0)
    }
}

/// Embeddings are truncated to the shortest non-empty one before comparing.
pub fn semantic_cohesion(geoids: &[Geoid]) -> f64 {
    let vectors: Vec<&[f64]> = geoids
        .iter()
        .filter(|g| g.has_embedding())
        .map(|g| g.embedding_vector.as_slice())
        .collect();
    if vectors.len() < 2 {
        return 1.0;
    }
    let dim = vectors.iter().map(|v| v.len()).min().unwrap_or(0);

    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            // Equal lengths after truncation, so this cannot mismatch.
            if let Ok(d) = cosine_distance(&vectors[i][..dim], &vectors[j][..dim]) {
                total += d;
                pairs += 1;
            }
        }
    }
    let mean = total / pairs as f64;
    if mean.is_nan() {
        return 0.0;
    }
    1.0 - mean
}

pub fn entropic_stability(scars: &[Scar]) -> f64 {
    if scars.is_empty() {
        return 0.5;
    }
    let mean = scars.iter().map(|s| s.delta_entropy).sum::<f64>() / scars.len() as f64;
    (mean + 1.0) / 2.0
}
