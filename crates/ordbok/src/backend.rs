use crate::model::GenerationEntry;
use async_trait::async_trait;

/// Failure reported by a [`GenerationBackend`].
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be reached or answered with an error.
    #[error("Backend request failed: {0}")]
    Request(String),

    /// The backend answered, but the result is unusable.
    #[error("Malformed backend response: {0}")]
    Malformed(String),

    /// The backend task panicked or was aborted.
    #[error("Backend task aborted: {0}")]
    Aborted(String),
}

/// Produces explanations and related terms for a word.
///
/// Implementations may take seconds per call and must be safe to call
/// concurrently for different keys. `prior` holds the entries already stored
/// for the item, so a retry can avoid repeating the same answer.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(
        &self,
        key: &str,
        prior: &[GenerationEntry],
    ) -> Result<GenerationEntry, BackendError>;
}
