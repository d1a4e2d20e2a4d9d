//! Vector and set distances shared by the contradiction engine and the
//! stability monitor.
//!
//! Unequal vector lengths are a caller bug and fail loudly. Degenerate input
//! (empty or zero vectors, empty sets) resolves to a neutral value instead.

use std::collections::HashSet;
use std::hash::Hash;

use crate::constants::EPSILON;
use crate::error::{CoreError, Result};

/// Cosine similarity in [-1, 1]. Zero-norm or empty input yields 0.0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(CoreError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a < EPSILON || norm_b < EPSILON {
        return Ok(0.0);
    }
    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

/// Cosine distance `1 - cos` in [0, 2].
///
/// A zero-norm vector has no direction, so the distance is the neutral 1.0.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> Result<f64> {
    Ok(1.0 - cosine_similarity(a, b)?)
}

/// Jaccard distance `1 - |A∩B| / |A∪B|`. Two empty sets are identical (0.0).
pub fn jaccard_distance<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    1.0 - intersection as f64 / union as f64
}
