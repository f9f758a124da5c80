//! Service configuration from `BLOODXAI_*` environment variables.

use std::path::PathBuf;

use crate::adapters::memory::DEFAULT_TTL_SECS;
use crate::application::explain::{DEFAULT_BLACKBOX_PERMUTATIONS, DEFAULT_BLACKBOX_SEED};
use crate::application::DEFAULT_LOW_ACCURACY_MODELS;
use crate::BloodXaiError;

pub const MODELS_DIR_ENV: &str = "BLOODXAI_MODELS_DIR";
pub const LOW_ACCURACY_ENV: &str = "BLOODXAI_LOW_ACCURACY_MODELS";
pub const CACHE_DB_ENV: &str = "BLOODXAI_CACHE_DB";
pub const CACHE_TTL_ENV: &str = "BLOODXAI_CACHE_TTL_SECS";
pub const TEMPLATES_FILE_ENV: &str = "BLOODXAI_TEMPLATES_FILE";
pub const REQUIRE_SIGNED_ENV: &str = "BLOODXAI_REQUIRE_SIGNED_MODELS";
pub const PUBKEY_ENV: &str = "BLOODXAI_MODEL_PUBKEY_B64";
pub const PUBKEY_FILE_ENV: &str = "BLOODXAI_MODEL_PUBKEY_B64_FILE";
pub const BLACKBOX_PERMUTATIONS_ENV: &str = "BLOODXAI_BLACKBOX_PERMUTATIONS";
pub const BLACKBOX_SEED_ENV: &str = "BLOODXAI_BLACKBOX_SEED";

const DEFAULT_MODELS_DIR: &str = "models";

/// Runtime settings for [`crate::application::InterpretationService`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub models_dir: PathBuf,
    pub low_accuracy_models: Vec<String>,
    /// SQLite result cache; in-memory when `None`
    pub cache_db: Option<PathBuf>,
    pub cache_ttl_secs: i64,
    /// Template file overriding the embedded catalog
    pub templates_file: Option<PathBuf>,
    pub require_signed_models: bool,
    /// Base64 Ed25519 verifying key for `manifest.sig`
    pub model_pubkey_b64: Option<String>,
    pub blackbox_permutations: usize,
    pub blackbox_seed: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
            low_accuracy_models: DEFAULT_LOW_ACCURACY_MODELS.iter().map(|s| (*s).to_string()).collect(),
            cache_db: None,
            cache_ttl_secs: DEFAULT_TTL_SECS,
            templates_file: None,
            require_signed_models: cfg!(not(debug_assertions)),
            model_pubkey_b64: None,
            blackbox_permutations: DEFAULT_BLACKBOX_PERMUTATIONS,
            blackbox_seed: DEFAULT_BLACKBOX_SEED,
        }
    }
}

impl ServiceConfig {
    /// Read the process environment.
    ///
    /// # Errors
    /// Returns error if the verifying key file cannot be read.
    pub fn from_env() -> Result<Self, BloodXaiError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unparseable values keep their
    /// defaults and are logged.
    ///
    /// # Errors
    /// Returns error if the verifying key file cannot be read.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BloodXaiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut cfg = Self::default();

        if let Some(dir) = var(MODELS_DIR_ENV) {
            cfg.models_dir = PathBuf::from(dir);
        }
        if let Some(list) = lookup(LOW_ACCURACY_ENV) {
            cfg.low_accuracy_models = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        cfg.cache_db = var(CACHE_DB_ENV).map(PathBuf::from);
        cfg.templates_file = var(TEMPLATES_FILE_ENV).map(PathBuf::from);
        if let Some(ttl) = parsed::<i64>(CACHE_TTL_ENV, var(CACHE_TTL_ENV)) {
            if ttl > 0 {
                cfg.cache_ttl_secs = ttl;
            }
        }
        if let Some(n) = parsed::<usize>(BLACKBOX_PERMUTATIONS_ENV, var(BLACKBOX_PERMUTATIONS_ENV)) {
            if n > 0 {
                cfg.blackbox_permutations = n;
            }
        }
        if let Some(seed) = parsed(BLACKBOX_SEED_ENV, var(BLACKBOX_SEED_ENV)) {
            cfg.blackbox_seed = seed;
        }

        // Release builds always verify.
        if cfg!(debug_assertions) {
            cfg.require_signed_models = var(REQUIRE_SIGNED_ENV).is_some_and(|v| parse_bool(&v));
        }

        cfg.model_pubkey_b64 = match var(PUBKEY_FILE_ENV) {
            Some(path) => {
                let b64 = std::fs::read_to_string(&path).map_err(|e| {
                    BloodXaiError::Config(format!("Failed reading verifying key file {path}: {e}"))
                })?;
                Some(b64.trim().to_string())
            }
            None => var(PUBKEY_ENV),
        };

        Ok(cfg)
    }
}

/// `1`, `true` or `yes`, any case.
#[must_use]
pub fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn parsed<T: std::str::FromStr>(name: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(variable = name, value = %value, "Ignoring unparseable setting");
            None
        }
    }
}
