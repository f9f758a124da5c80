//! Result cache port: memoized interpretation responses.

use sha2::{Digest, Sha256};

use crate::domain::{InterpretRequest, InterpretationResponse, CO_PARAMETERS};

/// Cache key derived from the request fields that affect the result.
///
/// Payload metadata outside this subset never changes the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// SHA-256 over the sorted JSON of parameter, value, age, gender,
    /// diabetic, pregnant and the co-parameters.
    ///
    /// Co-parameters sent as top-level fields are folded in under
    /// `otherParameters`, which wins on conflict as it does in the
    /// feature builder. An absent gender keys differently from an
    /// unrecognised one.
    #[must_use]
    pub fn from_request(request: &InterpretRequest) -> Self {
        let patient = &request.patient;
        let gender = if patient.gender_supplied {
            patient.gender.as_str()
        } else {
            ""
        };
        let mut subset = serde_json::Map::new();
        subset.insert("parameter".into(), request.parameter.clone().into());
        subset.insert("value".into(), request.value.into());
        subset.insert("patientAge".into(), patient.age.into());
        subset.insert("patientGender".into(), gender.into());
        subset.insert("diabetic".into(), patient.diabetic.into());
        subset.insert("pregnant".into(), patient.pregnant.into());

        let mut others = serde_json::Map::new();
        for (name, value) in &request.extra_fields {
            if CO_PARAMETERS.contains(&name.as_str()) {
                others.insert(name.clone(), (*value).into());
            }
        }
        for (name, value) in &request.other_parameters {
            others.insert(name.clone(), (*value).into());
        }
        if !others.is_empty() {
            subset.insert("otherParameters".into(), others.into());
        }
        // serde_json::Map is ordered by key, so the encoding is canonical.
        let canonical = serde_json::Value::Object(subset).to_string();
        let digest = Sha256::digest(canonical.as_bytes());
        Self(hex(&digest))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Storage for assembled interpretations.
///
/// Callers treat every error as a cache miss.
pub trait ResultCache: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// # Errors
    /// Returns error if the backend is unavailable.
    fn get(&self, key: &CacheKey) -> Result<Option<InterpretationResponse>, Self::Error>;

    /// # Errors
    /// Returns error if the backend is unavailable.
    fn put(&self, key: &CacheKey, response: &InterpretationResponse) -> Result<(), Self::Error>;

    /// Remove every entry and return how many were removed.
    ///
    /// # Errors
    /// Returns error if the backend is unavailable.
    fn clear(&self) -> Result<usize, Self::Error>;
}
