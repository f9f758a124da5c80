//! Model signing utility for BloodXAI model artifacts.
//!
//! Creates a signed manifest (`manifest.json`) and Ed25519 signature
//! (`manifest.sig`) binding every artifact in a models directory, enabling
//! verification when the service loads them.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin sign_models -- <models_dir> [--serial <n>]
//! ```
//!
//! # Security
//!
//! - Signing key sourced from secure locations (FD, file, Docker secret)
//! - Manifest includes SHA-256 hashes of all bound artifacts
//! - Private key material zeroized after use

use std::collections::BTreeMap;
use std::env;
use std::fs;
#[cfg(unix)]
use std::os::unix::io::FromRawFd;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use bloodxai::adapters::filesystem::{
    sha256_hex, ModelManifest, MANIFEST_FILE, MANIFEST_VERSION, SIGNATURE_FILE,
};

const KEY_FD_ENV: &str = "BLOODXAI_MODEL_SIGNING_KEY_B64_FD";
const KEY_FILE_ENV: &str = "BLOODXAI_MODEL_SIGNING_KEY_B64_FILE";
const KEY_ENV: &str = "BLOODXAI_MODEL_SIGNING_KEY_B64";
const DOCKER_SECRET_PATH: &str = "/run/secrets/bloodxai_model_signing_key_b64";

#[derive(Zeroize, ZeroizeOnDrop)]
struct Seed([u8; 32]);

fn non_empty_secret(raw: &str) -> Result<Zeroizing<String>> {
    let secret = raw.trim_end_matches(['\n', '\r']).to_string();
    if secret.is_empty() {
        bail!("Empty signing key");
    }
    Ok(Zeroizing::new(secret))
}

fn read_signing_seed_b64() -> Result<Zeroizing<String>> {
    #[cfg(unix)]
    if let Ok(fd_str) = env::var(KEY_FD_ENV) {
        let fd: i32 = fd_str.trim().parse().map_err(|_| anyhow!("Invalid key FD"))?;
        if fd <= 2 {
            bail!("Refusing to read signing key from stdio FD");
        }
        // SAFETY: take ownership of FD for one-time secret read.
        let mut file = unsafe { fs::File::from_raw_fd(fd) };
        let mut buf = Zeroizing::new(String::new());
        use std::io::Read;
        file.read_to_string(&mut buf)
            .context("Failed reading signing key from FD")?;
        return non_empty_secret(&buf);
    }

    if let Ok(path) = env::var(KEY_FILE_ENV) {
        let content = Zeroizing::new(
            fs::read_to_string(path.trim()).context("Failed reading signing key file")?,
        );
        return non_empty_secret(&content);
    }

    if Path::new(DOCKER_SECRET_PATH).exists() {
        let content = Zeroizing::new(
            fs::read_to_string(DOCKER_SECRET_PATH).context("Failed reading docker secret")?,
        );
        return non_empty_secret(&content);
    }

    // Dev-only fallback for convenience.
    if cfg!(debug_assertions) {
        if let Ok(v) = env::var(KEY_ENV) {
            return non_empty_secret(&v);
        }
    }

    bail!(
        "Missing signing key. Provide one of: {KEY_FD_ENV}, {KEY_FILE_ENV}, or {DOCKER_SECRET_PATH} ({KEY_ENV} only in debug builds)."
    )
}

fn read_signing_seed() -> Result<Seed> {
    let v = read_signing_seed_b64()?;
    let raw = Zeroizing::new(
        general_purpose::STANDARD
            .decode(v.trim())
            .context("Invalid base64 in signing key")?,
    );
    if raw.len() != 32 {
        bail!(
            "Signing key seed must be 32 bytes after base64 decode (got {})",
            raw.len()
        );
    }
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&raw);
    Ok(Seed(seed))
}

fn usage() -> anyhow::Error {
    anyhow!("Usage: sign_models <models_dir> [--serial <u64>]")
}

fn parse_args() -> Result<(PathBuf, Option<u64>)> {
    let mut args = env::args().skip(1);
    let mut models_dir: Option<PathBuf> = None;
    let mut serial: Option<u64> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--serial" => {
                let v = args.next().ok_or_else(usage)?;
                serial = Some(v.trim().parse().map_err(|_| anyhow!("--serial must be a u64"))?);
            }
            "-h" | "--help" => return Err(usage()),
            _ if models_dir.is_none() => models_dir = Some(PathBuf::from(arg)),
            _ => return Err(usage()),
        }
    }

    Ok((models_dir.ok_or_else(usage)?, serial))
}

/// SHA-256 of every `*.json` artifact in `dir`, excluding the manifest.
fn hash_artifacts(dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {dir:?}"))? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == MANIFEST_FILE || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let bytes = fs::read(&path).with_context(|| format!("Failed to read {path:?}"))?;
        files.insert(name.to_string(), sha256_hex(&bytes));
    }
    Ok(files)
}

fn main() -> Result<()> {
    let (models_dir, serial_arg) = parse_args()?;

    let files = hash_artifacts(&models_dir)?;
    if files.is_empty() {
        bail!("No model artifacts (*.json) found in {models_dir:?}");
    }

    let mut seed = read_signing_seed()?;
    let signing_key = SigningKey::from_bytes(&seed.0);
    seed.zeroize();

    let created_at = chrono::Utc::now().timestamp();
    let serial = serial_arg.unwrap_or_else(|| u64::try_from(created_at).unwrap_or(1));

    let manifest = ModelManifest {
        version: MANIFEST_VERSION,
        serial: Some(serial),
        created_at: Some(created_at),
        files,
    };
    let manifest_bytes =
        serde_json::to_vec_pretty(&manifest).context("Failed to serialize manifest")?;

    let manifest_path = models_dir.join(MANIFEST_FILE);
    fs::write(&manifest_path, &manifest_bytes)
        .with_context(|| format!("Failed to write {manifest_path:?}"))?;

    let sig: Signature = signing_key.sign(&manifest_bytes);
    let sig_path = models_dir.join(SIGNATURE_FILE);
    fs::write(&sig_path, sig.to_bytes()).with_context(|| format!("Failed to write {sig_path:?}"))?;

    println!("Signed {} artifact(s): {manifest_path:?}", manifest.files.len());
    println!("Wrote signature: {sig_path:?}");
    println!(
        "BLOODXAI_MODEL_PUBKEY_B64={}",
        general_purpose::STANDARD.encode(signing_key.verifying_key().as_bytes())
    );

    Ok(())
}
