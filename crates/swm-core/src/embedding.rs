//! Embedding providers.
//!
//! Models live outside this crate. A backend either looks vectors up in a
//! precomputed table, derives them by feature hashing, or returns zeros.
//! [`EmbeddingBackend::select`] walks the configured order once at
//! construction; [`embed_with_fallback`] walks it per call.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\w']+").unwrap());

/// Split text into lowercase word tokens with surrounding apostrophes trimmed.
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().trim_matches('\'').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Produces a fixed-length vector for a piece of text.
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f64>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Precomputed,
    FeatureHash,
    Zero,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Precomputed => "precomputed",
            Self::FeatureHash => "feature_hash",
            Self::Zero => "zero",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EmbeddingBackend {
    Precomputed {
        dimension: usize,
        table: HashMap<String, Vec<f64>>,
    },
    FeatureHash {
        dimension: usize,
    },
    Zero {
        dimension: usize,
    },
}

impl EmbeddingBackend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Precomputed { .. } => BackendKind::Precomputed,
            Self::FeatureHash { .. } => BackendKind::FeatureHash,
            Self::Zero { .. } => BackendKind::Zero,
        }
    }

    /// Build one backend, or explain why it is unusable.
    pub fn build(
        kind: BackendKind,
        dimension: usize,
        table: Option<&HashMap<String, Vec<f64>>>,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(CoreError::Configuration("embedding dimension must be non-zero".into()));
        }
        match kind {
            BackendKind::Precomputed => {
                let table = table
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| CoreError::Configuration("no precomputed table loaded".into()))?;
                if let Some((key, v)) = table.iter().find(|(_, v)| v.len() != dimension) {
                    tracing::debug!(key = %key, len = v.len(), "precomputed vector has wrong length");
                    return Err(CoreError::DimensionMismatch {
                        left: v.len(),
                        right: dimension,
                    });
                }
                Ok(Self::Precomputed {
                    dimension,
                    table: table.clone(),
                })
            }
            BackendKind::FeatureHash => Ok(Self::FeatureHash { dimension }),
            BackendKind::Zero => Ok(Self::Zero { dimension }),
        }
    }

    /// First usable backend in `kinds` order. Every attempt is logged.
    pub fn select(
        kinds: &[BackendKind],
        dimension: usize,
        table: Option<&HashMap<String, Vec<f64>>>,
    ) -> Result<Self> {
        for kind in kinds {
            match Self::build(*kind, dimension, table) {
                Ok(backend) => {
                    tracing::info!(backend = kind.as_str(), dimension, "embedding backend selected");
                    return Ok(backend);
                }
                Err(e) => {
                    tracing::warn!(backend = kind.as_str(), error = %e, "embedding backend skipped");
                }
            }
        }
        Err(CoreError::Configuration(
            "no usable embedding backend in configured order".into(),
        ))
    }

    /// Every backend in `kinds` that can be built, in order.
    pub fn chain(
        kinds: &[BackendKind],
        dimension: usize,
        table: Option<&HashMap<String, Vec<f64>>>,
    ) -> Vec<Self> {
        kinds
            .iter()
            .filter_map(|kind| match Self::build(*kind, dimension, table) {
                Ok(b) => Some(b),
                Err(e) => {
                    tracing::warn!(backend = kind.as_str(), error = %e, "embedding backend skipped");
                    None
                }
            })
            .collect()
    }
}

impl EmbeddingProvider for EmbeddingBackend {
    fn dimension(&self) -> usize {
        match self {
            Self::Precomputed { dimension, .. }
            | Self::FeatureHash { dimension }
            | Self::Zero { dimension } => *dimension,
        }
    }

    fn embed(&self, text: &str) -> Result<Vec<f64>> {
        match self {
            Self::Precomputed { table, .. } => table.get(text).cloned().ok_or_else(|| {
                CoreError::Embedding(format!("no precomputed embedding for '{text}'"))
            }),
            Self::FeatureHash { dimension } => Ok(feature_hash(text, *dimension)),
            Self::Zero { dimension } => Ok(vec![0.0; *dimension]),
        }
    }
}

/// Try each provider in order; the first success wins. Returns the last
/// error when every provider fails.
pub fn embed_with_fallback<P: EmbeddingProvider>(providers: &[P], text: &str) -> Result<Vec<f64>> {
    let mut last_err = CoreError::Embedding("no embedding providers".into());
    for provider in providers {
        match provider.embed(text) {
            Ok(v) => return Ok(v),
            Err(e) => {
                tracing::debug!(error = %e, "embedding provider failed, trying next");
                last_err = e;
            }
        }
    }
    Err(last_err)
}

/// Signed feature hashing of word tokens, L2-normalized. Text without tokens
/// maps to the zero vector.
pub fn feature_hash(text: &str, dimension: usize) -> Vec<f64> {
    let mut v = vec![0.0; dimension];
    if dimension == 0 {
        return v;
    }
    for token in tokenize(text) {
        let h = fnv1a(token.as_bytes());
        let idx = (h % dimension as u64) as usize;
        let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        v[idx] += sign;
    }
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in bytes {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn table() -> HashMap<String, Vec<f64>> {
        HashMap::from([("hello".to_string(), vec![1.0, 0.0, 0.0])])
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Don't STOP, 'now'!"), vec!["don't", "stop", "now"]);
        assert!(tokenize("  ...  ").is_empty());
    }

    #[test]
    fn test_feature_hash_deterministic_and_normalized() {
        let a = feature_hash("the quick brown fox", 64);
        let b = feature_hash("the quick brown fox", 64);
        assert_eq!(a, b);
        let norm = a.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_feature_hash_empty_text() {
        assert_eq!(feature_hash("", 8), vec![0.0; 8]);
    }

    #[test]
    fn test_select_skips_missing_table() {
        let backend =
            EmbeddingBackend::select(&[BackendKind::Precomputed, BackendKind::FeatureHash], 16, None)
                .unwrap();
        assert_eq!(backend.kind(), BackendKind::FeatureHash);
        assert_eq!(backend.dimension(), 16);
    }

    #[test]
    fn test_select_uses_table_when_present() {
        let t = table();
        let backend = EmbeddingBackend::select(&[BackendKind::Precomputed], 3, Some(&t)).unwrap();
        assert_eq!(backend.kind(), BackendKind::Precomputed);
        assert_eq!(backend.embed("hello").unwrap(), vec![1.0, 0.0, 0.0]);
        assert!(matches!(backend.embed("missing"), Err(CoreError::Embedding(_))));
    }

    #[test]
    fn test_select_rejects_wrong_table_dimension() {
        let t = table();
        let result = EmbeddingBackend::select(&[BackendKind::Precomputed], 4, Some(&t));
        assert!(result.is_err());
    }

    #[test]
    fn test_select_exhausted() {
        assert!(EmbeddingBackend::select(&[], 4, None).is_err());
        assert!(EmbeddingBackend::select(&[BackendKind::Zero], 0, None).is_err());
    }

    #[test]
    fn test_embed_with_fallback() {
        let t = table();
        let chain = EmbeddingBackend::chain(
            &[BackendKind::Precomputed, BackendKind::Zero],
            3,
            Some(&t),
        );
        assert_eq!(chain.len(), 2);
        assert_eq!(embed_with_fallback(&chain, "hello").unwrap(), vec![1.0, 0.0, 0.0]);
        assert_eq!(embed_with_fallback(&chain, "other").unwrap(), vec![0.0; 3]);
    }

    #[test]
    fn test_embed_with_fallback_all_fail() {
        let t = table();
        let chain = EmbeddingBackend::chain(&[BackendKind::Precomputed], 3, Some(&t));
        assert!(matches!(
            embed_with_fallback(&chain, "other"),
            Err(CoreError::Embedding(_))
        ));
        let empty: Vec<EmbeddingBackend> = Vec::new();
        assert!(matches!(embed_with_fallback(&empty, "x"), Err(CoreError::Embedding(_))));
    }

    #[test]
    fn test_backend_kind_serde() {
        let json = serde_json::to_string(&BackendKind::FeatureHash).unwrap();
        assert_eq!(json, "\"feature_hash\"");
        let kind: BackendKind = serde_json::from_str("\"precomputed\"").unwrap();
        assert_eq!(kind, BackendKind::Precomputed);
    }
}
