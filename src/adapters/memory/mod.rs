//! In-memory result cache with a time-to-live.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::domain::InterpretationResponse;
use crate::ports::{CacheKey, ResultCache};

/// Default entry lifetime.
pub const DEFAULT_TTL_SECS: i64 = 300;

struct Entry {
    stored_at: DateTime<Utc>,
    response: InterpretationResponse,
}

/// Process-local cache. Expired entries are dropped on read and swept on
/// every write.
pub struct MemoryResultCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    ttl: Duration,
}

impl MemoryResultCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl Default for MemoryResultCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TTL_SECS))
    }
}

impl ResultCache for MemoryResultCache {
    type Error = Infallible;

    fn get(&self, key: &CacheKey) -> Result<Option<InterpretationResponse>, Self::Error> {
        let mut entries = self.entries();
        let expired = match entries.get(key) {
            None => return Ok(None),
            Some(entry) if Utc::now() - entry.stored_at < self.ttl => {
                return Ok(Some(entry.response.clone()));
            }
            Some(_) => true,
        };
        if expired {
            entries.remove(key);
            tracing::debug!(key = %key, "Cached interpretation expired");
        }
        Ok(None)
    }

    fn put(&self, key: &CacheKey, response: &InterpretationResponse) -> Result<(), Self::Error> {
        let now = Utc::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| now - entry.stored_at < self.ttl);
        let swept = before - entries.len();
        if swept > 0 {
            tracing::debug!(swept, "Swept expired interpretations");
        }
        entries.insert(
            key.clone(),
            Entry {
                stored_at: now,
                response: response.clone(),
            },
        );
        Ok(())
    }

    fn clear(&self) -> Result<usize, Self::Error> {
        let mut entries = self.entries();
        let removed = entries.len();
        entries.clear();
        tracing::info!(removed, "Cleared interpretation cache");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::tests::sample_response;
    use crate::domain::InterpretRequest;
    use serde_json::json;

    fn key(parameter: &str) -> CacheKey {
        CacheKey::from_request(&InterpretRequest::from_json(&json!({
            "parameter": parameter,
            "value": 5.0
        })))
    }

    #[test]
    fn test_roundtrip_and_clear() {
        let cache = MemoryResultCache::default();
        assert!(cache.is_empty());
        let response = sample_response("wbc_10e9_L");
        cache.put(&key("WBC"), &response).expect("put");
        cache.put(&key("RDW"), &response).expect("put");
        assert_eq!(cache.get(&key("WBC")).expect("get"), Some(response));
        assert_eq!(cache.clear().expect("clear"), 2);
        assert!(cache.get(&key("WBC")).expect("get").is_none());
    }

    #[test]
    fn test_entries_expire() {
        let cache = MemoryResultCache::new(Duration::zero());
        cache.put(&key("WBC"), &sample_response("wbc_10e9_L")).expect("put");
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("WBC")).expect("get").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_sweeps_other_expired_entries() {
        let cache = MemoryResultCache::new(Duration::zero());
        let response = sample_response("wbc_10e9_L");
        cache.put(&key("WBC"), &response).expect("put");
        cache.put(&key("RDW"), &response).expect("put");
        cache.put(&key("MCV"), &response).expect("put");
        assert_eq!(cache.len(), 1);

        let fresh = MemoryResultCache::default();
        fresh.put(&key("WBC"), &response).expect("put");
        fresh.put(&key("RDW"), &response).expect("put");
        assert_eq!(fresh.len(), 2);
    }
}
