use crate::entities::{Franchise, FranchiseLookup, NaturalKey, StoreCandidate, StoreField, StoreRecord};
use crate::error::PersistenceError;
use crate::reconciliation::UpsertBatch;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Event for the audit trail. One is written per committed import run.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SyncEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl SyncEvent {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Franchises (read-only for imports)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS franchises (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            status INTEGER DEFAULT 1,
            alias TEXT,
            owner_type TEXT,
            description TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            deleted_at TEXT
        )",
        [],
    )
    .context("creating franchises table")?;

    // ==========================================================================
    // Stores (authoritative; cnpj is the natural key)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS stores (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cnpj TEXT UNIQUE NOT NULL,
            cigam_id TEXT,
            franchise_id INTEGER REFERENCES franchises(id),
            status INTEGER,
            name TEXT,
            name_legal TEXT,
            inaugurated_at TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            deleted_at TEXT
        )",
        [],
    )
    .context("creating stores table")?;

    // ==========================================================================
    // Sync events (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sync_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("creating sync_events table")?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    // Cigam may reuse a code across CNPJs, so this one stays non-unique.
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_stores_cigam_id_lookup ON stores(cigam_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_stores_franchise ON stores(franchise_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_franchises_alias ON franchises(alias)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON sync_events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON sync_events(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// REPOSITORY CONTRACT
// ============================================================================

/// Persistence the import runner depends on.
pub trait StoreRepository {
    /// Every franchise not soft-deleted, indexed by alias.
    fn load_franchise_lookup(&self) -> Result<FranchiseLookup, PersistenceError>;

    /// Apply the batch atomically. Returns the number of rows inserted or
    /// updated.
    fn persist_upsert_batch(&mut self, batch: &UpsertBatch) -> Result<usize, PersistenceError>;

    fn record_event(&self, event: &SyncEvent) -> Result<(), PersistenceError>;
}

/// Build the single upsert statement for a batch.
pub fn upsert_sql(batch: &UpsertBatch) -> Result<String, PersistenceError> {
    let key = batch.natural_key.field();

    if !batch.insert_fields.contains(&key) {
        return Err(PersistenceError::InvalidBatch(format!(
            "natural key `{key}` is not among the inserted columns"
        )));
    }
    if let Some(stray) = batch.update_fields.iter().find(|f| !batch.insert_fields.contains(f)) {
        return Err(PersistenceError::InvalidBatch(format!(
            "update field `{stray}` is not among the inserted columns"
        )));
    }

    let columns: Vec<&str> = batch.insert_fields.iter().map(StoreField::column).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();

    let on_conflict = if batch.update_fields.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let assignments: Vec<String> = batch
            .update_fields
            .iter()
            .map(|f| format!("{col} = excluded.{col}", col = f.column()))
            .collect();
        format!("DO UPDATE SET {}, updated_at = CURRENT_TIMESTAMP", assignments.join(", "))
    };

    Ok(format!(
        "INSERT INTO stores ({}) VALUES ({}) ON CONFLICT({}) {}",
        columns.join(", "),
        placeholders.join(", "),
        key.column(),
        on_conflict
    ))
}

/// Only created once a batch is keyed on `cigam_id`.
const CIGAM_ID_UNIQUE_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_stores_cigam_id ON stores(cigam_id)";

fn column_value(candidate: &StoreCandidate, field: StoreField) -> SqlValue {
    match field {
        StoreField::Cnpj => SqlValue::Text(candidate.cnpj.clone()),
        StoreField::CigamId => candidate.external_id.clone().map_or(SqlValue::Null, SqlValue::Text),
        StoreField::Name => candidate.display_name.clone().map_or(SqlValue::Null, SqlValue::Text),
        StoreField::FranchiseId => candidate.franchise_id.map_or(SqlValue::Null, SqlValue::Integer),
        StoreField::Status => candidate
            .status
            .map_or(SqlValue::Null, |s| SqlValue::Integer(i64::from(s))),
    }
}

// ============================================================================
// SQLITE REPOSITORY
// ============================================================================

pub struct SqliteStoreRepository {
    conn: Connection,
}

impl SqliteStoreRepository {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("opening stores database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteStoreRepository { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn insert_franchise(&self, franchise: &Franchise) -> Result<(), PersistenceError> {
        self.conn.execute(
            "INSERT INTO franchises (id, name, status, alias) VALUES (?1, ?2, ?3, ?4)",
            params![franchise.id, franchise.name, franchise.status, franchise.alias],
        )?;
        Ok(())
    }

    pub fn get_store_by_cnpj(&self, cnpj: &str) -> Result<Option<StoreRecord>, PersistenceError> {
        let store = self
            .conn
            .query_row(
                &format!("SELECT {STORE_COLUMNS} FROM stores WHERE cnpj = ?1"),
                params![cnpj],
                store_from_row,
            )
            .optional()?;
        Ok(store)
    }

    pub fn get_all_stores(&self) -> Result<Vec<StoreRecord>, PersistenceError> {
        let mut stmt = self.conn.prepare(&format!("SELECT {STORE_COLUMNS} FROM stores ORDER BY id"))?;
        let stores = stmt
            .query_map([], store_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stores)
    }

    pub fn verify_count(&self) -> Result<i64, PersistenceError> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM stores", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Events for one entity, newest first.
    pub fn get_events_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<SyncEvent>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
             FROM sync_events
             WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY timestamp DESC",
        )?;

        let events = stmt
            .query_map(params![entity_type, entity_id], |row| {
                let timestamp_str: String = row.get(1)?;
                let data_json: String = row.get(5)?;

                Ok(SyncEvent {
                    event_id: row.get(0)?,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
                        .with_timezone(&Utc),
                    event_type: row.get(2)?,
                    entity_type: row.get(3)?,
                    entity_id: row.get(4)?,
                    data: serde_json::from_str(&data_json)
                        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                    actor: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }
}

const STORE_COLUMNS: &str = "id, cnpj, cigam_id, franchise_id, status, name, name_legal, \
                             inaugurated_at, created_at, updated_at, deleted_at";

fn store_from_row(row: &Row<'_>) -> rusqlite::Result<StoreRecord> {
    Ok(StoreRecord {
        id: row.get(0)?,
        cnpj: row.get(1)?,
        cigam_id: row.get(2)?,
        franchise_id: row.get(3)?,
        status: row.get(4)?,
        name: row.get(5)?,
        name_legal: row.get(6)?,
        inaugurated_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        deleted_at: row.get(10)?,
    })
}

impl StoreRepository for SqliteStoreRepository {
    fn load_franchise_lookup(&self) -> Result<FranchiseLookup, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, alias, name, status FROM franchises
             WHERE deleted_at IS NULL
             ORDER BY id",
        )?;

        let franchises = stmt
            .query_map([], |row| {
                Ok(Franchise {
                    id: row.get(0)?,
                    alias: row.get(1)?,
                    name: row.get(2)?,
                    status: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FranchiseLookup::from_franchises(franchises))
    }

    fn persist_upsert_batch(&mut self, batch: &UpsertBatch) -> Result<usize, PersistenceError> {
        let sql = upsert_sql(batch)?;
        if batch.is_empty() {
            return Ok(0);
        }

        // Dropping the transaction without commit rolls every row back.
        let tx = self.conn.transaction()?;
        if batch.natural_key == NaturalKey::CigamId {
            // ON CONFLICT(cigam_id) needs a unique index; NULLs never collide.
            tx.execute(CIGAM_ID_UNIQUE_INDEX, [])?;
        }
        let mut affected = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in &batch.rows {
                let values = batch.insert_fields.iter().map(|f| column_value(row, *f));
                affected += stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;

        debug!(rows = batch.len(), affected, key = batch.natural_key.column(), "upsert batch committed");
        Ok(affected)
    }

    fn record_event(&self, event: &SyncEvent) -> Result<(), PersistenceError> {
        let data_json = serde_json::to_string(&event.data)?;

        self.conn.execute(
            "INSERT INTO sync_events (
                event_id, timestamp, event_type, entity_type, entity_id, data, actor
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.event_id,
                event.timestamp.to_rfc3339(),
                event.event_type,
                event.entity_type,
                event.entity_id,
                data_json,
                event.actor,
            ],
        )?;

        Ok(())
    }
}
