//! Semantic working memory engine.
//!
//! A population of geoids (weighted feature maps with symbolic facts and an
//! embedding) is diffused, scanned for pairwise contradictions and measured
//! for disorder once per cognitive cycle. Contradictions that collapse become
//! scars, balanced across two vaults.
//!
//! Zero I/O. Storage sits behind [`VaultBackend`]; embeddings come from an
//! [`EmbeddingProvider`].

pub mod config;
pub mod constants;
pub mod contradiction;
pub mod cycle;
pub mod diffusion;
pub mod distance;
pub mod embedding;
pub mod entropy;
pub mod error;
pub mod geoid;
pub mod governance;
pub mod scar;
pub mod stability;
pub mod time;
pub mod vault;

pub use config::{
    ContradictionConfig, CycleConfig, DiffusionConfig, EmbeddingConfig, EngineConfig,
    EntropyConfig, StabilityConfig,
};
pub use constants::EPSILON;
pub use contradiction::{
    ContradictionEngine, Decision, Detection, GradientKind, ProfileSettings, TensionGradient,
};
pub use cycle::{CognitiveCycle, CycleError, CycleOutcome, CycleStats};
pub use diffusion::DiffusionEngine;
pub use distance::{cosine_distance, cosine_similarity, jaccard_distance};
pub use embedding::{BackendKind, EmbeddingBackend, EmbeddingProvider, embed_with_fallback, tokenize};
pub use entropy::{
    Baseline, EntropyEngine, EntropyHistory, EntropyMeasurement, Estimator, SystemPhase,
    VaultCounts, sample_entropy,
};
pub use error::{CoreError, PersistenceFailure, Result};
pub use geoid::{Geoid, SemanticState};
pub use governance::{AllowAll, DenyList, GovernanceHook, Insight};
pub use scar::{Scar, VaultId};
pub use stability::{StabilityMonitor, StabilitySnapshot};
pub use vault::{InMemoryVault, VaultBackend, VaultStore};
