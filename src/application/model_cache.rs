//! Lazily populated, process-wide model cache and the statistical-vs-rules
//! routing decision.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use crate::ports::{ModelArtifact, ModelStore};

/// Parameters whose trained classifiers are known to be unreliable.
pub const DEFAULT_LOW_ACCURACY_MODELS: [&str; 3] =
    ["monocytes_percent", "eosinophils_percent", "basophils_percent"];

/// Artifacts loaded from a [`ModelStore`], shared across requests.
///
/// Concurrent first access may load the same artifact twice; the last insert
/// wins. Absent artifacts are not remembered, so a model dropped into the
/// store later is picked up on the next request.
pub struct ModelCache<S: ModelStore> {
    store: S,
    loaded: RwLock<HashMap<String, Arc<ModelArtifact>>>,
}

impl<S: ModelStore> ModelCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// Artifact for `key`, loading it on first use.
    ///
    /// Load failures are logged and reported as "no model".
    pub fn get(&self, key: &str) -> Option<Arc<ModelArtifact>> {
        if let Some(artifact) = self
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Some(Arc::clone(artifact));
        }

        let artifact = match self.store.load(key) {
            Ok(Some(artifact)) => Arc::new(artifact),
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to load model artifact; using clinical rules");
                return None;
            }
        };

        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), Arc::clone(&artifact));
        Some(artifact)
    }

    /// Load every artifact the store lists. Returns how many are now cached.
    pub fn preload(&self) -> usize {
        match self.store.available() {
            Ok(keys) => keys.iter().filter(|key| self.get(key).is_some()).count(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list model artifacts");
                0
            }
        }
    }

    /// Keys with a cached artifact, sorted.
    pub fn loaded_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    /// Drop every cached artifact.
    pub fn clear(&self) {
        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Why a request is classified by the clinical tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulesReason {
    NoModel,
    LowAccuracyModel,
}

/// Classification path for one request.
#[derive(Debug, Clone)]
pub enum Route {
    Statistical(Arc<ModelArtifact>),
    ClinicalRules(RulesReason),
}

/// Model decision router.
#[derive(Debug, Clone)]
pub struct ModelRouter {
    low_accuracy: HashSet<String>,
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new(DEFAULT_LOW_ACCURACY_MODELS)
    }
}

impl ModelRouter {
    pub fn new<I, S>(low_accuracy: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            low_accuracy: low_accuracy.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_low_accuracy(&self, key: &str) -> bool {
        self.low_accuracy.contains(key)
    }

    /// Decide the path for `key`.
    ///
    /// The deny-list is consulted before the store, so unreliable models are
    /// never loaded.
    pub fn route<S: ModelStore>(&self, key: &str, models: &ModelCache<S>) -> Route {
        if self.is_low_accuracy(key) {
            return Route::ClinicalRules(RulesReason::LowAccuracyModel);
        }
        match models.get(key) {
            Some(artifact) => Route::Statistical(artifact),
            None => Route::ClinicalRules(RulesReason::NoModel),
        }
    }
}
