//! Replay and abuse guards for task completion.
//!
//! - [`NonceStore`]: each authorization token nonce is accepted at most once.
//!   A nonce is kept until its token's `exp` (plus clock skew) has passed;
//!   after that the token itself is rejected, so [`NonceStore::purge_expired`]
//!   may drop it.
//! - [`SecurityFailureTracker`]: counts security-band failures per context and
//!   rate-limits a context once it reaches the threshold. Counts are kept until
//!   [`SecurityFailureTracker::reset`]; a limited context stays limited.

use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

pub const NONCE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS used_nonces (
    nonce       TEXT PRIMARY KEY,
    context_id  TEXT NOT NULL,
    claimed_at  TEXT NOT NULL,
    expires_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_used_nonces_context ON used_nonces(context_id);
CREATE INDEX IF NOT EXISTS idx_used_nonces_expiry ON used_nonces(expires_at);
"#;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Nonce store lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for GuardError {
    fn from(e: rusqlite::Error) -> Self {
        GuardError::Database(e.to_string())
    }
}

/// Records accepted nonces.
pub trait NonceStore: Send + Sync {
    /// Claim `nonce` for `context_id` until `expires_at` (unix seconds, the
    /// token's `exp`). `Ok(true)` if it was unused, `Ok(false)` if it was
    /// already claimed.
    fn claim(&self, nonce: &str, context_id: &str, expires_at: i64) -> Result<bool, GuardError>;

    /// Forget nonces with `expires_at <= cutoff`. Returns how many were dropped.
    fn purge_expired(&self, cutoff: i64) -> Result<usize, GuardError>;
}

#[derive(Debug, Default)]
pub struct MemoryNonceStore {
    used: Mutex<HashMap<String, i64>>,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.used.lock().map(|u| u.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NonceStore for MemoryNonceStore {
    fn claim(&self, nonce: &str, _context_id: &str, expires_at: i64) -> Result<bool, GuardError> {
        let mut used = self.used.lock().map_err(|_| GuardError::Poisoned)?;
        if used.contains_key(nonce) {
            return Ok(false);
        }
        used.insert(nonce.to_string(), expires_at);
        Ok(true)
    }

    fn purge_expired(&self, cutoff: i64) -> Result<usize, GuardError> {
        let mut used = self.used.lock().map_err(|_| GuardError::Poisoned)?;
        let before = used.len();
        used.retain(|_, expires_at| *expires_at > cutoff);
        Ok(before - used.len())
    }
}

/// SQLite-backed nonce store. The primary key makes a claim atomic across
/// engines sharing one database file.
#[derive(Clone)]
pub struct SqliteNonceStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteNonceStore {
    pub fn open(path: &Path) -> Result<Self, GuardError> {
        let conn = Connection::open(path)?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> Result<Self, GuardError> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_connection(conn: &Connection) -> Result<(), GuardError> {
        // WAL only applies to file-backed databases
        if let Err(e) = conn.execute_batch("PRAGMA journal_mode = WAL;") {
            tracing::debug!(reason = "W_NONCE_WAL", error = %e, "WAL journal mode unavailable");
        }
        conn.execute_batch(NONCE_SCHEMA)?;
        Ok(())
    }

    /// Number of nonces claimed by `context_id`.
    pub fn count_for_context(&self, context_id: &str) -> Result<u64, GuardError> {
        let conn = self.conn.lock().map_err(|_| GuardError::Poisoned)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM used_nonces WHERE context_id = ?1",
            params![context_id],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

impl NonceStore for SqliteNonceStore {
    fn claim(&self, nonce: &str, context_id: &str, expires_at: i64) -> Result<bool, GuardError> {
        let conn = self.conn.lock().map_err(|_| GuardError::Poisoned)?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO used_nonces (nonce, context_id, claimed_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![nonce, context_id, Utc::now().to_rfc3339(), expires_at],
        )?;
        Ok(changed == 1)
    }

    fn purge_expired(&self, cutoff: i64) -> Result<usize, GuardError> {
        let conn = self.conn.lock().map_err(|_| GuardError::Poisoned)?;
        let removed = conn.execute(
            "DELETE FROM used_nonces WHERE expires_at <= ?1",
            params![cutoff],
        )?;
        Ok(removed)
    }
}

/// Counts security failures per context id.
///
/// A threshold of zero disables limiting.
#[derive(Debug, Default)]
pub struct SecurityFailureTracker {
    threshold: u32,
    failures: Mutex<HashMap<String, u32>>,
}

impl SecurityFailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Record one failure. Returns the new count.
    pub fn record(&self, context_id: &str) -> u32 {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let count = failures.entry(context_id.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn failures(&self, context_id: &str) -> u32 {
        let failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        failures.get(context_id).copied().unwrap_or(0)
    }

    pub fn is_limited(&self, context_id: &str) -> bool {
        self.threshold > 0 && self.failures(context_id) >= self.threshold
    }

    pub fn reset(&self, context_id: &str) {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        failures.remove(context_id);
    }
}
