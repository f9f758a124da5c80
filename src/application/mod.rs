//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the interpretation pipeline.

mod assembler;
pub mod explain;
mod interpret;
mod model_cache;

pub use assembler::{narrative, ResultAssembler, NO_ATTRIBUTION_NARRATIVE};
pub use explain::{ExplainError, ExplainabilityReconciler, Explanation};
pub use interpret::InterpretationService;
pub use model_cache::{ModelCache, ModelRouter, Route, RulesReason, DEFAULT_LOW_ACCURACY_MODELS};
