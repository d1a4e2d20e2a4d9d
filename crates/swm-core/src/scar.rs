use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contradiction::TensionGradient;
use crate::distance::cosine_similarity;
use crate::error::{CoreError, Result};
use crate::geoid::Geoid;
use crate::time::now_iso8601;

/// One of the two scar partitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VaultId {
    A,
    B,
}

impl VaultId {
    pub const ALL: [VaultId; 2] = [VaultId::A, VaultId::B];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl FromStr for VaultId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "A" | "a" => Ok(Self::A),
            "B" | "b" => Ok(Self::B),
            other => Err(CoreError::Configuration(format!("unknown vault '{other}'"))),
        }
    }
}

impl fmt::Display for VaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of a resolved contradiction.
///
/// Vault membership is tracked by the vault store, not by the scar, so a
/// rebalance never touches scar content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scar {
    pub id: Uuid,
    pub geoid_a: String,
    pub geoid_b: String,
    pub reason: String,
    pub timestamp: String,
    pub pre_entropy: f64,
    pub post_entropy: f64,
    pub delta_entropy: f64,
    /// Angle between the two embeddings in radians; 0.0 without embeddings.
    pub cdp: f64,
    /// Activation imbalance between the two geoids, in [-1, 1].
    pub semantic_polarity: f64,
    /// How many times this pair has collapsed, this scar included.
    pub mutation_frequency: u32,
    /// Balancing weight.
    pub weight: f64,
}

impl Scar {
    /// Build the scar for a collapsed gradient. `prior_collapses` is the
    /// number of scars already recorded for this pair.
    pub fn resolve(
        gradient: &TensionGradient,
        a: &Geoid,
        b: &Geoid,
        pulse: f64,
        pre_entropy: f64,
        post_entropy: f64,
        prior_collapses: usize,
    ) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            geoid_a: gradient.geoid_a.clone(),
            geoid_b: gradient.geoid_b.clone(),
            reason: format!("{} tension {:.3}", gradient.kind.as_str(), gradient.score),
            timestamp: now_iso8601(),
            pre_entropy,
            post_entropy,
            delta_entropy: post_entropy - pre_entropy,
            cdp: divergence_angle(a, b)?,
            semantic_polarity: semantic_polarity(a, b),
            mutation_frequency: u32::try_from(prior_collapses).unwrap_or(u32::MAX).saturating_add(1),
            weight: pulse,
        })
    }

    /// Whether this scar joins the given (unordered) pair.
    pub fn joins(&self, a: &str, b: &str) -> bool {
        (self.geoid_a == a && self.geoid_b == b) || (self.geoid_a == b && self.geoid_b == a)
    }
}

/// Embedding divergence proxy: `acos` of the cosine similarity.
pub fn divergence_angle(a: &Geoid, b: &Geoid) -> Result<f64> {
    if !a.has_embedding() || !b.has_embedding() {
        return Ok(0.0);
    }
    Ok(cosine_similarity(&a.embedding_vector, &b.embedding_vector)?.acos())
}

/// `(Ea - Eb) / (|Ea| + |Eb|)` over total activation; 0.0 when both are zero.
pub fn semantic_polarity(a: &Geoid, b: &Geoid) -> f64 {
    let (ea, eb) = (a.total_activation(), b.total_activation());
    let denom = ea.abs() + eb.abs();
    if denom <= 0.0 {
        return 0.0;
    }
    ((ea - eb) / denom).clamp(-1.0, 1.0)
}
