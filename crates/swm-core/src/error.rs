use std::fmt;

/// A vault backend could not complete an operation.
///
/// Backends convert their own error types into this so the cycle can treat
/// every storage technology the same way.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceFailure {
    pub message: String,
}

impl PersistenceFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for PersistenceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "persistence failure: {}", self.message)
    }
}

impl std::error::Error for PersistenceFailure {}

#[derive(Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Vectors of unequal length reached a distance function.
    DimensionMismatch { left: usize, right: usize },
    /// Invalid configuration, rejected before any engine is built.
    Configuration(String),
    /// An embedding provider could not embed a text.
    Embedding(String),
    Persistence(PersistenceFailure),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::DimensionMismatch { left, right } => {
                write!(f, "dimension mismatch: {left} vs {right}")
            }
            CoreError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            CoreError::Embedding(msg) => write!(f, "embedding failed: {msg}"),
            CoreError::Persistence(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoreError::Persistence(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PersistenceFailure> for CoreError {
    fn from(e: PersistenceFailure) -> Self {
        CoreError::Persistence(e)
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
