//! # BloodXAI
//!
//! Blood-report parameter interpretation with explainable classification.
//!
//! This crate provides:
//! - Parameter name normalization and clinical threshold tables
//! - Statistical classification with reconciled feature attributions
//! - Templated medical text and multi-parameter risk assessments
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types and clinical rules (parameters, statuses, features)
//! - `ports`: Trait definitions for collaborators (models, cache, templates)
//! - `adapters`: Concrete implementations (model formats, filesystem, SQLite)
//! - `application`: The interpretation pipeline orchestrating domain and ports

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use application::InterpretationService;
pub use config::ServiceConfig;
pub use domain::{InterpretRequest, InterpretationResponse, StatusCode};

/// Result type for BloodXAI operations
pub type Result<T> = std::result::Result<T, BloodXaiError>;

/// Main error type for BloodXAI
#[derive(Debug, thiserror::Error)]
pub enum BloodXaiError {
    #[error("Feature schema mismatch: {0}")]
    SchemaMismatch(#[from] domain::SchemaError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Model store error: {0}")]
    ModelStore(#[from] adapters::ModelStoreError),

    #[error("Result cache error: {0}")]
    Cache(String),

    #[error("Template error: {0}")]
    Template(#[from] adapters::TemplateError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<adapters::CacheError> for BloodXaiError {
    fn from(e: adapters::CacheError) -> Self {
        Self::Cache(e.to_string())
    }
}
