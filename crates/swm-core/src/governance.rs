//! Governance hook consulted before derived insights are accepted.
//!
//! The engine only calls the hook; the policy itself lives outside.

use serde::{Deserialize, Serialize};

/// A derived insight awaiting acceptance.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Insight {
    pub id: String,
    pub content: String,
}

impl Insight {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

/// External ethics/policy validator.
pub trait GovernanceHook: Send + Sync {
    /// `false` refuses the content.
    fn validate(&self, content: &str) -> bool;
}

/// Accepts everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl GovernanceHook for AllowAll {
    fn validate(&self, _content: &str) -> bool {
        true
    }
}

/// Refuses content containing any listed term (case-insensitive).
#[derive(Clone, Debug, Default)]
pub struct DenyList {
    terms: Vec<String>,
}

impl DenyList {
    pub fn new<S: AsRef<str>>(terms: impl IntoIterator<Item = S>) -> Self {
        Self {
            terms: terms
                .into_iter()
                .map(|t| t.as_ref().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

impl GovernanceHook for DenyList {
    fn validate(&self, content: &str) -> bool {
        let lower = content.to_lowercase();
        !self.terms.iter().any(|t| lower.contains(t.as_str()))
    }
}
