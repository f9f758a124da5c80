//! BloodXAI: blood-report parameter interpretation
//!
//! Main entry point for the command-line service. Reads a request payload
//! (JSON) from a file or stdin and writes the response JSON to stdout.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bloodxai::adapters::filesystem::verifying_key_from_b64;
use bloodxai::adapters::sanitize::SanitizingMakeWriter;
use bloodxai::adapters::{FileModelStore, JsonTemplateCatalog, MemoryResultCache, SqliteResultCache};
use bloodxai::application::{ExplainabilityReconciler, ModelRouter};
use bloodxai::ports::ResultCache;
use bloodxai::{InterpretationService, ServiceConfig};

const USAGE: &str = "Usage: bloodxai <interpret|risk> [FILE]\n       bloodxai models\n       bloodxai clear-cache\n\nReads the request JSON from FILE, or stdin when FILE is omitted or '-'.";

enum Command {
    Interpret(Option<PathBuf>),
    Risk(Option<PathBuf>),
    Models,
    ClearCache,
}

fn parse_args() -> Result<Command> {
    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_default();
    let input = args.next().filter(|a| a != "-").map(PathBuf::from);
    if args.next().is_some() {
        bail!(USAGE);
    }
    Ok(match command.as_str() {
        "interpret" => Command::Interpret(input),
        "risk" => Command::Risk(input),
        "models" => Command::Models,
        "clear-cache" => Command::ClearCache,
        _ => bail!(USAGE),
    })
}

fn read_payload(input: Option<&Path>) -> Result<serde_json::Value> {
    let text = match input {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Failed to read {path:?}"))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("Failed to read stdin")?;
            buf
        }
    };
    serde_json::from_str(&text).context("Request is not valid JSON")
}

fn main() -> Result<()> {
    // Initialize logging.
    //
    // stdout carries the response JSON, so logs go to stderr unless a log
    // file is requested.
    let log_mode = std::env::var("BLOODXAI_LOG_MODE").unwrap_or_else(|_| "stderr".to_string());

    let (writer, _guard) = if log_mode == "file" {
        let log_file = std::env::var("BLOODXAI_LOG_FILE").unwrap_or_else(|_| "bloodxai.log".to_string());

        if let Some(parent) = Path::new(&log_file).parent() {
            // Best-effort: don't fail startup just because the directory is missing.
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stderr())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(SanitizingMakeWriter::new(writer)),
        )
        .init();

    let command = parse_args()?;
    let config = ServiceConfig::from_env()?;
    tracing::debug!(?config, "Loaded configuration");

    let ttl = Duration::seconds(config.cache_ttl_secs);
    match &config.cache_db {
        Some(path) => {
            let cache = SqliteResultCache::new(path)
                .with_context(|| format!("Failed to open result cache {path:?}"))?
                .with_ttl(ttl);
            run(&config, cache, command)
        }
        None => run(&config, MemoryResultCache::new(ttl), command),
    }
}

fn run<C: ResultCache>(config: &ServiceConfig, cache: C, command: Command) -> Result<()> {
    let mut store = FileModelStore::new(&config.models_dir).require_signed(config.require_signed_models);
    if let Some(b64) = &config.model_pubkey_b64 {
        store = store.with_verifying_key(verifying_key_from_b64(b64)?);
    }

    let templates = match &config.templates_file {
        Some(path) => JsonTemplateCatalog::from_path(path)?,
        None => JsonTemplateCatalog::embedded()?,
    };

    let service = InterpretationService::new(store, cache, templates)
        .with_router(ModelRouter::new(config.low_accuracy_models.iter().cloned()))
        .with_reconciler(ExplainabilityReconciler::new(
            config.blackbox_permutations,
            config.blackbox_seed,
        ));

    let output = match command {
        Command::Interpret(input) => {
            let payload = read_payload(input.as_deref())?;
            serde_json::to_string_pretty(&service.interpret(&payload)?)?
        }
        Command::Risk(input) => {
            let payload = read_payload(input.as_deref())?;
            serde_json::to_string_pretty(&service.assess_risks(&payload))?
        }
        Command::Models => {
            service.preload_models();
            serde_json::to_string_pretty(&service.loaded_models())?
        }
        Command::ClearCache => {
            let removed = service.clear_cache()?;
            serde_json::to_string(&serde_json::json!({ "removed": removed }))?
        }
    };

    println!("{output}");
    Ok(())
}
