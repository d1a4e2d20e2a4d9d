//! Contradiction engine: pairwise tension between geoids.
//!
//! Each unordered pair gets three sub-scores in [0, 1]:
//!
//! - embedding misalignment: cosine distance of the embeddings
//! - layer conflict: mean Jaccard distance of semantic and symbolic key sets
//! - symbolic opposition: share of common symbolic keys whose values differ
//!
//! Their mean is the composite score. Pairs above the tension threshold emit a
//! [`TensionGradient`]; pulse strength then decides collapse, surge or buffer.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::ContradictionConfig;
use crate::distance::{cosine_distance, jaccard_distance};
use crate::error::{CoreError, Result};
use crate::geoid::Geoid;
use crate::governance::{GovernanceHook, Insight};
use crate::stability::StabilitySnapshot;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientKind {
    #[default]
    Composite,
}

impl GradientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Composite => "composite",
        }
    }
}

/// Scored contradiction signal between two geoids. Recomputed every cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TensionGradient {
    pub geoid_a: String,
    pub geoid_b: String,
    pub score: f64,
    pub kind: GradientKind,
}

/// Resolution of a gradient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Collapse,
    Surge,
    Buffer,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collapse => "collapse",
            Self::Surge => "surge",
            Self::Buffer => "buffer",
        }
    }
}

/// Per-caller decision preferences.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSettings {
    pub allow_surges: bool,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self { allow_surges: true }
    }
}

/// Gradients found by a bounded scan.
#[derive(Clone, Debug, Default)]
pub struct Detection {
    pub gradients: Vec<TensionGradient>,
    pub comparisons: usize,
    /// The comparison budget ran out before every pair was scored.
    pub truncated: bool,
}

#[derive(Clone, Debug)]
pub struct ContradictionEngine {
    tension_threshold: f64,
    collapse_threshold: f64,
    surge_threshold: f64,
}

impl ContradictionEngine {
    pub fn new(config: &ContradictionConfig) -> Result<Self> {
        if config.surge_threshold > config.collapse_threshold {
            return Err(CoreError::Configuration(format!(
                "surge_threshold ({}) exceeds collapse_threshold ({})",
                config.surge_threshold, config.collapse_threshold
            )));
        }
        Ok(Self {
            tension_threshold: config.tension_threshold,
            collapse_threshold: config.collapse_threshold,
            surge_threshold: config.surge_threshold,
        })
    }

    pub fn tension_threshold(&self) -> f64 {
        self.tension_threshold
    }

    /// Score every unordered pair once and keep those above the threshold.
    pub fn detect_tension_gradients(&self, geoids: &[Geoid]) -> Result<Vec<TensionGradient>> {
        Ok(self.detect_bounded(geoids, usize::MAX)?.gradients)
    }

    /// Like [`detect_tension_gradients`](Self::detect_tension_gradients), but
    /// stops after `max_comparisons` pairs, visited in (i, j) order.
    pub fn detect_bounded(&self, geoids: &[Geoid], max_comparisons: usize) -> Result<Detection> {
        let mut detection = Detection::default();

        'outer: for i in 0..geoids.len() {
            for j in (i + 1)..geoids.len() {
                if detection.comparisons >= max_comparisons {
                    detection.truncated = true;
                    break 'outer;
                }
                detection.comparisons += 1;

                let (a, b) = (&geoids[i], &geoids[j]);
                let score = self.composite_score(a, b)?;
                if score > self.tension_threshold {
                    detection.gradients.push(TensionGradient {
                        geoid_a: a.id.clone(),
                        geoid_b: b.id.clone(),
                        score,
                        kind: GradientKind::Composite,
                    });
                }
            }
        }

        Ok(detection)
    }

    /// Mean of the three clamped sub-scores.
    pub fn composite_score(&self, a: &Geoid, b: &Geoid) -> Result<f64> {
        let embedding = embedding_misalignment(a, b)?;
        let layer = layer_conflict_intensity(a, b);
        let symbolic = symbolic_opposition(a, b);
        Ok((embedding + layer + symbolic) / 3.0)
    }

    pub fn calculate_pulse_strength(&self, gradient: &TensionGradient) -> f64 {
        gradient.score.min(1.0)
    }

    /// Pure threshold decision. `_stability` is accepted so callers can pass
    /// the current snapshot; the thresholds alone decide today.
    pub fn decide_collapse_or_surge(
        &self,
        pulse: f64,
        _stability: &StabilitySnapshot,
        profile: &ProfileSettings,
    ) -> Decision {
        if pulse > self.collapse_threshold {
            Decision::Collapse
        } else if pulse < self.surge_threshold {
            if profile.allow_surges {
                Decision::Surge
            } else {
                Decision::Collapse
            }
        } else {
            Decision::Buffer
        }
    }

    /// Pass an insight through unless governance refuses it or an existing
    /// insight already carries identical content.
    pub fn check_insight_conflict(
        &self,
        insight: Insight,
        existing: &[Insight],
        hook: &dyn GovernanceHook,
    ) -> Option<Insight> {
        if !hook.validate(&insight.content) {
            tracing::warn!(insight = %insight.id, "insight refused by governance hook");
            return None;
        }
        if existing.iter().any(|e| e.content == insight.content) {
            tracing::debug!(insight = %insight.id, "insight duplicates existing content");
            return None;
        }
        Some(insight)
    }
}

/// Cosine distance clamped to [0, 1]; 0.0 when either embedding is missing.
pub fn embedding_misalignment(a: &Geoid, b: &Geoid) -> Result<f64> {
    if !a.has_embedding() || !b.has_embedding() {
        return Ok(0.0);
    }
    Ok(cosine_distance(&a.embedding_vector, &b.embedding_vector)?.clamp(0.0, 1.0))
}

/// Mean Jaccard distance over semantic and symbolic key sets.
pub fn layer_conflict_intensity(a: &Geoid, b: &Geoid) -> f64 {
    let sem_a: HashSet<&str> = a.semantic_state.keys().collect();
    let sem_b: HashSet<&str> = b.semantic_state.keys().collect();
    let sym_a: HashSet<&str> = a.symbolic_state.keys().map(String::as_str).collect();
    let sym_b: HashSet<&str> = b.symbolic_state.keys().map(String::as_str).collect();

    if sem_a.is_empty() && sem_b.is_empty() && sym_a.is_empty() && sym_b.is_empty() {
        return 0.0;
    }

    let semantic = jaccard_distance(&sem_a, &sem_b);
    let symbolic = jaccard_distance(&sym_a, &sym_b);
    ((semantic + symbolic) / 2.0).clamp(0.0, 1.0)
}

/// Fraction of shared symbolic keys whose values differ.
pub fn symbolic_opposition(a: &Geoid, b: &Geoid) -> f64 {
    let mut shared = 0usize;
    let mut opposed = 0usize;
    for (key, value) in &a.symbolic_state {
        if let Some(other) = b.symbolic_state.get(key) {
            shared += 1;
            if value != other {
                opposed += 1;
            }
        }
    }
    if shared == 0 {
        return 0.0;
    }
    opposed as f64 / shared as f64
}
