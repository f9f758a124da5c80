//! Model store port: loading trained artifacts by canonical key.

use super::classifier::ModelArtifact;

/// Source of model artifacts.
///
/// A missing artifact is an expected state, reported as `Ok(None)`.
pub trait ModelStore: Send + Sync {
    /// Error type for load failures (corrupt, tampered or unreadable).
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the artifact for a canonical key.
    ///
    /// # Errors
    /// Returns error if an artifact exists but cannot be used.
    fn load(&self, key: &str) -> Result<Option<ModelArtifact>, Self::Error>;

    /// Keys for which an artifact is present.
    ///
    /// # Errors
    /// Returns error if the store cannot be listed.
    fn available(&self) -> Result<Vec<String>, Self::Error>;
}
