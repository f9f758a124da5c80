//! SQLite adapter: persistent result cache.
//!
//! Stores assembled interpretations keyed by [`CacheKey`], so repeated
//! requests survive a restart.
//!
//! # Mutex Behavior
//!
//! The connection is protected by `Mutex`. A poisoned mutex is recovered:
//! every statement runs in its own implicit transaction, so a panic in
//! another thread cannot leave a half-written row behind.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::InterpretationResponse;
use crate::ports::{CacheKey, ResultCache};

/// Error type for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// SQLite-backed result cache.
pub struct SqliteResultCache {
    conn: Mutex<Connection>,
    ttl: Option<Duration>,
}

impl SqliteResultCache {
    /// Open (or create) a cache database at the given path.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        let cache = Self {
            conn: Mutex::new(conn),
            ttl: None,
        };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Create an in-memory SQLite database (for testing).
    ///
    /// # Errors
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        let cache = Self {
            conn: Mutex::new(conn),
            ttl: None,
        };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Ignore entries older than `ttl` on read and delete them on write.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> Result<(), CacheError> {
        self.conn().execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS interpretations (
                cache_key TEXT PRIMARY KEY,
                parameter TEXT NOT NULL,
                response TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_interpretations_created
                ON interpretations(created_at DESC);
            ",
        )?;
        Ok(())
    }

    fn is_fresh(&self, created_at: &str) -> bool {
        let Some(ttl) = self.ttl else {
            return true;
        };
        DateTime::parse_from_rfc3339(created_at)
            .map(|dt| Utc::now() - dt.with_timezone(&Utc) < ttl)
            .unwrap_or(false)
    }

    /// Delete every row that is no longer fresh. Timestamps are fixed-width
    /// UTC, so text order is time order.
    fn sweep_expired(&self, conn: &Connection, now: DateTime<Utc>) -> Result<usize, CacheError> {
        let Some(ttl) = self.ttl else {
            return Ok(0);
        };
        let cutoff = timestamp(now - ttl);
        let swept = conn.execute(
            "DELETE FROM interpretations WHERE created_at <= ?1",
            params![cutoff],
        )?;
        if swept > 0 {
            tracing::debug!(swept, "Swept expired interpretations");
        }
        Ok(swept)
    }

    /// Number of stored entries, fresh or not.
    ///
    /// # Errors
    /// Returns error if the count query fails.
    pub fn len(&self) -> Result<usize, CacheError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM interpretations", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl ResultCache for SqliteResultCache {
    type Error = CacheError;

    fn get(&self, key: &CacheKey) -> Result<Option<InterpretationResponse>, Self::Error> {
        let row: Option<(String, String)> = self
            .conn()
            .query_row(
                "SELECT response, created_at FROM interpretations WHERE cache_key = ?1",
                params![key.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((response, created_at)) if self.is_fresh(&created_at) => {
                Ok(Some(serde_json::from_str(&response)?))
            }
            Some(_) => {
                tracing::debug!(key = %key, "Cached interpretation expired");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &CacheKey, response: &InterpretationResponse) -> Result<(), Self::Error> {
        let body = serde_json::to_string(response)?;
        let now = Utc::now();
        let conn = self.conn();
        self.sweep_expired(&conn, now)?;
        conn.execute(
            r"
            INSERT OR REPLACE INTO interpretations (cache_key, parameter, response, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![
                key.as_str(),
                response.interpretation.parameter,
                body,
                timestamp(now),
            ],
        )?;
        tracing::debug!(key = %key, "Stored interpretation");
        Ok(())
    }

    fn clear(&self) -> Result<usize, Self::Error> {
        let removed = self.conn().execute("DELETE FROM interpretations", [])?;
        tracing::info!(removed, "Cleared interpretation cache");
        Ok(removed)
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
