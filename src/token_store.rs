// 🗝️ Token Store - durable cache for the signed credential
//
// One entry per key. Writes replace the whole entry in a single step so
// concurrent writers never leave a half-written credential behind.

use crate::clock::{Clock, SystemClock};
use crate::credential::SealedCredential;
use crate::error::CredentialStoreError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

pub trait TokenStore: Send + Sync {
    /// Replace the entry under `key`; it is evicted once `ttl` elapses.
    fn put(&self, key: &str, credential: &SealedCredential, ttl: Duration) -> Result<(), CredentialStoreError>;

    /// Current entry under `key`, or `None` if missing or evicted.
    fn get(&self, key: &str) -> Result<Option<SealedCredential>, CredentialStoreError>;
}

fn evict_at(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
    now + ttl
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

struct MemoryEntry {
    credential: SealedCredential,
    evict_at: DateTime<Utc>,
}

/// Process-local store. Lost on restart.
pub struct MemoryTokenStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        MemoryTokenStore {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for MemoryTokenStore {
    fn put(&self, key: &str, credential: &SealedCredential, ttl: Duration) -> Result<(), CredentialStoreError> {
        let entry = MemoryEntry {
            credential: credential.clone(),
            evict_at: evict_at(self.clock.now(), ttl),
        };
        let mut entries = self.entries.write().map_err(|_| CredentialStoreError::Poisoned)?;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<SealedCredential>, CredentialStoreError> {
        let entries = self.entries.read().map_err(|_| CredentialStoreError::Poisoned)?;
        let now = self.clock.now();
        Ok(entries
            .get(key)
            .filter(|entry| entry.evict_at > now)
            .map(|entry| entry.credential.clone()))
    }
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// File-backed store; the credential survives process restarts.
pub struct SqliteTokenStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteTokenStore {
    pub fn open(path: &Path) -> Result<Self, CredentialStoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::from_connection(conn, Arc::new(SystemClock))
    }

    pub fn in_memory() -> Result<Self, CredentialStoreError> {
        Self::from_connection(Connection::open_in_memory()?, Arc::new(SystemClock))
    }

    pub fn from_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self, CredentialStoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS credential_cache (
                cache_key TEXT PRIMARY KEY,
                sealed_token TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                name TEXT NOT NULL,
                evict_at INTEGER NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        Ok(SqliteTokenStore {
            conn: Mutex::new(conn),
            clock,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl TokenStore for SqliteTokenStore {
    fn put(&self, key: &str, credential: &SealedCredential, ttl: Duration) -> Result<(), CredentialStoreError> {
        let evict_at = evict_at(self.clock.now(), ttl).timestamp();
        let conn = self.conn.lock().map_err(|_| CredentialStoreError::Poisoned)?;

        conn.execute(
            "INSERT INTO credential_cache (cache_key, sealed_token, expires_at, name, evict_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, CURRENT_TIMESTAMP)
             ON CONFLICT(cache_key) DO UPDATE SET
                sealed_token = excluded.sealed_token,
                expires_at = excluded.expires_at,
                name = excluded.name,
                evict_at = excluded.evict_at,
                updated_at = CURRENT_TIMESTAMP",
            params![
                key,
                credential.token,
                credential.expires_at.to_rfc3339(),
                credential.name,
                evict_at,
            ],
        )?;

        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<SealedCredential>, CredentialStoreError> {
        let now = self.clock.now().timestamp();
        let conn = self.conn.lock().map_err(|_| CredentialStoreError::Poisoned)?;

        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT sealed_token, expires_at, name FROM credential_cache
                 WHERE cache_key = ?1 AND evict_at > ?2",
                params![key, now],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((token, expires_at, name)) = row else {
            return Ok(None);
        };

        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map_err(|e| CredentialStoreError::Unreadable(format!("expires_at: {e}")))?
            .with_timezone(&Utc);

        Ok(Some(SealedCredential {
            token,
            expires_at,
            name,
        }))
    }
}
