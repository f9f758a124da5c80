//! Adapters layer: Concrete implementations of ports.
//!
//! - `models`: serialized classifier formats (boosted trees, forests, logistic)
//! - `filesystem`: model store over a directory with signed-manifest checks
//! - `memory`: in-process TTL result cache
//! - `sqlite`: SQLite result cache
//! - `templates`: JSON template catalog
//! - `sanitize`: identifier and secret filtering for logs

pub mod filesystem;
pub mod memory;
pub mod models;
pub mod sanitize;
pub mod sqlite;
pub mod templates;

pub use filesystem::{FileModelStore, ModelStoreError};
pub use memory::MemoryResultCache;
pub use sqlite::{CacheError, SqliteResultCache};
pub use templates::{JsonTemplateCatalog, TemplateError};
