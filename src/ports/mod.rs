//! Ports layer: Trait definitions for external collaborators.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the interpretation pipeline and trained models, the result
//! cache and the text templates.

mod classifier;
mod model_store;
mod result_cache;
mod templates;

pub use classifier::{
    argmax, Aggregation, BaseScore, ClassMapping, Classifier, ClassifierError, DecisionTree,
    ModelArtifact, TreeEnsemble, TreeNode,
};
pub use model_store::ModelStore;
pub use result_cache::{CacheKey, ResultCache};
pub use templates::{TemplateBlock, TemplateCatalog};
