use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::time::now_iso8601;

/// Feature-name → weight mapping that remembers insertion order.
///
/// Diffusion treats the weights as a 1-D signal, so the order in which
/// features were added is part of the state. Serializes as a JSON object
/// whose key order matches insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SemanticState {
    entries: Vec<(String, f64)>,
}

impl SemanticState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a weight. Existing features keep their position.
    pub fn insert(&mut self, feature: impl Into<String>, weight: f64) {
        let feature = feature.into();
        match self.entries.iter_mut().find(|(k, _)| *k == feature) {
            Some(entry) => entry.1 = weight,
            None => self.entries.push((feature, weight)),
        }
    }

    pub fn get(&self, feature: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(k, _)| k == feature)
            .map(|(_, w)| *w)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(_, w)| *w)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, w)| (k.as_str(), *w))
    }

    /// Sum of all weights. Weights need not sum to 1.
    pub fn total(&self) -> f64 {
        self.values().sum()
    }

    /// Build a state with the same keys in the same order and new values.
    /// Extra values are ignored; missing ones keep the old weight.
    pub fn with_values(&self, values: &[f64]) -> Self {
        let entries = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (k, w))| (k.clone(), values.get(i).copied().unwrap_or(*w)))
            .collect();
        Self { entries }
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for SemanticState {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut state = Self::new();
        for (k, w) in iter {
            state.insert(k, w);
        }
        state
    }
}

impl Serialize for SemanticState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, w) in &self.entries {
            map.serialize_entry(k, w)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SemanticState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct StateVisitor;

        impl<'de> Visitor<'de> for StateVisitor {
            type Value = SemanticState;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of feature names to weights")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut state = SemanticState::new();
                while let Some((k, w)) = access.next_entry::<String, f64>()? {
                    state.insert(k, w);
                }
                Ok(state)
            }
        }

        deserializer.deserialize_map(StateVisitor)
    }
}

/// The unit of memory: feature weights, symbolic facts and an embedding.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Geoid {
    pub id: String,
    #[serde(default)]
    pub semantic_state: SemanticState,
    /// Compared by exact value equality only.
    #[serde(default)]
    pub symbolic_state: BTreeMap<String, Value>,
    #[serde(default)]
    pub embedding_vector: Vec<f64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default = "now_iso8601")]
    pub created_at: String,
}

impl Geoid {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            semantic_state: SemanticState::new(),
            symbolic_state: BTreeMap::new(),
            embedding_vector: Vec::new(),
            metadata: BTreeMap::new(),
            created_at: now_iso8601(),
        }
    }

    pub fn with_semantic<K: Into<String>>(mut self, pairs: impl IntoIterator<Item = (K, f64)>) -> Self {
        for (k, w) in pairs {
            self.semantic_state.insert(k, w);
        }
        self
    }

    pub fn with_symbolic<K: Into<String>>(mut self, pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        for (k, v) in pairs {
            self.symbolic_state.insert(k.into(), v);
        }
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f64>) -> Self {
        self.embedding_vector = embedding;
        self
    }

    pub fn has_embedding(&self) -> bool {
        !self.embedding_vector.is_empty()
    }

    /// A present embedding must have exactly `dimension` components. A
    /// missing one passes.
    pub fn check_dimension(&self, dimension: usize) -> Result<()> {
        let len = self.embedding_vector.len();
        if len != 0 && len != dimension {
            return Err(CoreError::DimensionMismatch {
                left: len,
                right: dimension,
            });
        }
        Ok(())
    }

    /// Summed semantic activation, used as pseudo-energy.
    pub fn total_activation(&self) -> f64 {
        self.semantic_state.total()
    }

    /// Mean semantic weight; 0.0 for an empty state.
    pub fn mean_activation(&self) -> f64 {
        if self.semantic_state.is_empty() {
            return 0.0;
        }
        self.total_activation() / self.semantic_state.len() as f64
    }

    /// Serialized size of the symbolic state in bytes, a proxy for its complexity.
    pub fn symbolic_complexity(&self) -> usize {
        serde_json::to_string(&self.symbolic_state)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_preserves_order() {
        let mut state = SemanticState::new();
        state.insert("zeta", 1.0);
        state.insert("alpha", 2.0);
        state.insert("mid", 3.0);
        state.insert("zeta", 4.0);

        let keys: Vec<_> = state.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(state.get("zeta"), Some(4.0));
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn test_json_keeps_insertion_order() {
        let state: SemanticState = [("b", 1.0), ("a", 2.0), ("c", 0.5)].into_iter().collect();
        let encoded = serde_json::to_string(&state).unwrap();
        assert_eq!(encoded, r#"{"b":1.0,"a":2.0,"c":0.5}"#);

        let decoded: SemanticState = serde_json::from_str(r#"{"q":0.1,"p":0.2}"#).unwrap();
        let keys: Vec<_> = decoded.keys().collect();
        assert_eq!(keys, vec!["q", "p"]);
    }

    #[test]
    fn test_with_values_keeps_keys() {
        let state: SemanticState = [("x", 1.0), ("y", 2.0)].into_iter().collect();
        let replaced = state.with_values(&[5.0, 6.0]);
        assert_eq!(replaced.get("x"), Some(5.0));
        assert_eq!(replaced.get("y"), Some(6.0));

        let short = state.with_values(&[9.0]);
        assert_eq!(short.get("y"), Some(2.0));
    }

    #[test]
    fn test_activation_helpers() {
        let g = Geoid::new("g").with_semantic([("a", 1.0), ("b", 3.0)]);
        assert_eq!(g.total_activation(), 4.0);
        assert_eq!(g.mean_activation(), 2.0);
        assert_eq!(Geoid::new("empty").mean_activation(), 0.0);
    }

    #[test]
    fn test_symbolic_complexity_grows_with_content() {
        let small = Geoid::new("s");
        let big = Geoid::new("b").with_symbolic([("status", json!("on")), ("mode", json!(3))]);
        assert!(big.symbolic_complexity() > small.symbolic_complexity());
        assert_eq!(small.symbolic_complexity(), 2); // "{}"
    }

    #[test]
    fn test_geoid_deserializes_with_defaults() {
        let g: Geoid = serde_json::from_str(r#"{"id":"only-id"}"#).unwrap();
        assert_eq!(g.id, "only-id");
        assert!(g.semantic_state.is_empty());
        assert!(!g.has_embedding());
        assert!(!g.created_at.is_empty());
    }

    #[test]
    fn test_check_dimension() {
        assert!(Geoid::new("none").check_dimension(4).is_ok());
        let g = Geoid::new("g").with_embedding(vec![0.1, 0.2, 0.3]);
        assert!(g.check_dimension(3).is_ok());
        assert_eq!(
            g.check_dimension(4),
            Err(CoreError::DimensionMismatch { left: 3, right: 4 })
        );
    }
}
