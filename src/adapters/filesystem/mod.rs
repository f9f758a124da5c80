//! Filesystem model store.
//!
//! Artifacts live as `<dir>/<canonical_key>.json`. The directory may carry a
//! signed manifest binding each artifact to its SHA-256:
//!
//! - `manifest.json`: `{version, serial, created_at, files: {name: sha256}}`
//! - `manifest.sig`: raw 64-byte Ed25519 signature over `manifest.json`
//!
//! # Security
//!
//! - When signing is required, artifacts without a valid signed manifest
//!   binding them are refused
//! - When a manifest is present, a bound artifact whose hash differs is
//!   refused regardless of the signing policy
//! - Release builds of the service always require signing (see config)

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::adapters::models::{parse_artifact, ArtifactError};
use crate::ports::{ModelArtifact, ModelStore};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SIGNATURE_FILE: &str = "manifest.sig";
pub const MANIFEST_VERSION: u32 = 1;

/// Error type for model loading.
#[derive(Debug, thiserror::Error)]
pub enum ModelStoreError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid artifact '{key}': {source}")]
    Artifact {
        key: String,
        #[source]
        source: ArtifactError,
    },

    #[error("Invalid manifest: {0}")]
    Manifest(String),

    #[error("Signature check failed: {0}")]
    Signature(String),

    #[error("Integrity check failed: {0}")]
    Integrity(String),
}

/// Signed list of artifact hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub version: u32,
    #[serde(default)]
    pub serial: Option<u64>,
    #[serde(default)]
    pub created_at: Option<i64>,
    pub files: BTreeMap<String, String>,
}

/// Lowercase hex SHA-256.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes).iter().map(|b| format!("{b:02x}")).collect()
}

/// Decode a base64 Ed25519 verifying key.
///
/// # Errors
/// Returns [`ModelStoreError::Signature`] if the text is not a 32-byte key.
pub fn verifying_key_from_b64(b64: &str) -> Result<VerifyingKey, ModelStoreError> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|e| ModelStoreError::Signature(format!("invalid public key base64: {e}")))?;
    let bytes: [u8; 32] = raw
        .as_slice()
        .try_into()
        .map_err(|_| ModelStoreError::Signature(format!("public key must be 32 bytes, got {}", raw.len())))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| ModelStoreError::Signature(format!("invalid public key: {e}")))
}

fn constant_time_eq_str(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes().iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Canonical keys are plain identifiers; anything else cannot name a file.
fn is_storable_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Model store backed by a directory of JSON artifacts.
#[derive(Debug, Clone)]
pub struct FileModelStore {
    dir: PathBuf,
    verifying_key: Option<VerifyingKey>,
    require_signed: bool,
}

impl FileModelStore {
    /// Store over `dir` with no signing requirement.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            verifying_key: None,
            require_signed: false,
        }
    }

    #[must_use]
    pub fn with_verifying_key(mut self, key: VerifyingKey) -> Self {
        self.verifying_key = Some(key);
        self
    }

    #[must_use]
    pub fn require_signed(mut self, required: bool) -> Self {
        self.require_signed = required;
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read(path: &Path) -> Result<Vec<u8>, ModelStoreError> {
        fs::read(path).map_err(|source| ModelStoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read and, where required, authenticate the manifest.
    fn read_manifest(&self) -> Result<Option<ModelManifest>, ModelStoreError> {
        let manifest_path = self.dir.join(MANIFEST_FILE);
        let sig_path = self.dir.join(SIGNATURE_FILE);

        if !manifest_path.exists() {
            if self.require_signed {
                return Err(ModelStoreError::Signature(format!(
                    "{MANIFEST_FILE} not found in {:?}; signed models are required",
                    self.dir
                )));
            }
            return Ok(None);
        }

        let manifest_bytes = Self::read(&manifest_path)?;

        if self.require_signed || sig_path.exists() {
            let key = self.verifying_key.as_ref().ok_or_else(|| {
                ModelStoreError::Signature("no verifying key configured".into())
            })?;
            if !sig_path.exists() {
                return Err(ModelStoreError::Signature(format!("{SIGNATURE_FILE} not found")));
            }
            let sig_bytes = Self::read(&sig_path)?;
            let sig_array: [u8; 64] = sig_bytes.as_slice().try_into().map_err(|_| {
                ModelStoreError::Signature("invalid signature length (expected 64 bytes)".into())
            })?;
            key.verify(&manifest_bytes, &Signature::from_bytes(&sig_array))
                .map_err(|_| ModelStoreError::Signature("manifest signature does not verify".into()))?;
        }

        let manifest: ModelManifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| ModelStoreError::Manifest(format!("invalid {MANIFEST_FILE} format: {e}")))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ModelStoreError::Manifest(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        if manifest.files.is_empty() {
            return Err(ModelStoreError::Manifest(format!("{MANIFEST_FILE} contains no files")));
        }
        Ok(Some(manifest))
    }

    fn check_integrity(&self, file_name: &str, bytes: &[u8]) -> Result<(), ModelStoreError> {
        let Some(manifest) = self.read_manifest()? else {
            return Ok(());
        };
        match manifest.files.get(file_name) {
            Some(expected) => {
                if constant_time_eq_str(&sha256_hex(bytes), expected) {
                    Ok(())
                } else {
                    Err(ModelStoreError::Integrity(format!("hash mismatch for {file_name}")))
                }
            }
            None if self.require_signed => Err(ModelStoreError::Integrity(format!(
                "{file_name} is not bound by {MANIFEST_FILE}"
            ))),
            None => {
                tracing::warn!(file = file_name, "Loading artifact not bound by manifest");
                Ok(())
            }
        }
    }
}

impl ModelStore for FileModelStore {
    type Error = ModelStoreError;

    fn load(&self, key: &str) -> Result<Option<ModelArtifact>, Self::Error> {
        if !is_storable_key(key) {
            tracing::debug!(key, "Key cannot name a model artifact");
            return Ok(None);
        }
        let file_name = format!("{key}.json");
        let path = self.dir.join(&file_name);
        if !path.is_file() {
            return Ok(None);
        }

        let bytes = Self::read(&path)?;
        self.check_integrity(&file_name, &bytes)?;
        let artifact = parse_artifact(&bytes, key).map_err(|source| ModelStoreError::Artifact {
            key: key.to_string(),
            source,
        })?;

        tracing::info!(
            key,
            kind = artifact.classifier.kind(),
            classes = artifact.class_mapping.len(),
            "Loaded model artifact"
        );
        Ok(Some(artifact))
    }

    fn available(&self) -> Result<Vec<String>, Self::Error> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ModelStoreError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };
        let mut keys: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name != MANIFEST_FILE)
            .filter_map(|name| name.strip_suffix(".json").map(str::to_string))
            .filter(|key| is_storable_key(key))
            .collect();
        keys.sort();
        Ok(keys)
    }
}
