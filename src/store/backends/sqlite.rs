//! SQLite backend implementation.
//!
//! Durable records in a `plugins` table; config is stored as JSON text and
//! timestamps as RFC 3339 text.

use crate::core::{ConfigMap, Error, Result, Timestamp};
use crate::store::backend::{BackendType, PluginStore};
use crate::store::config::SqliteConfig;
use crate::store::record::PluginRecord;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const SELECT_COLUMNS: &str = "SELECT id, name, version, description, enabled, config,
        installed_at, last_enabled_at, last_disabled_at, last_error FROM plugins";

/// SQLite plugin store.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: String,
}

impl SqliteStore {
    /// Open (or create) the database described by `config`.
    pub fn new(config: &SqliteConfig) -> Result<Self> {
        if config.path == ":memory:" {
            return Self::from_connection(Connection::open_in_memory()?, ":memory:");
        }
        if let Some(parent) = Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(&config.path)?, &config.path)
    }

    /// Private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::new(&SqliteConfig {
            path: ":memory:".to_string(),
        })
    }

    fn from_connection(conn: Connection, path: &str) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS plugins (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                description TEXT,
                enabled INTEGER NOT NULL DEFAULT 0,
                config TEXT NOT NULL DEFAULT '{}',
                installed_at TEXT NOT NULL,
                last_enabled_at TEXT,
                last_disabled_at TEXT,
                last_error TEXT
            )",
            [],
        )?;

        info!(path, "Plugin store ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_string(),
        })
    }

    /// Database path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Column values as stored, before parsing.
struct RawRecord {
    id: String,
    name: String,
    version: String,
    description: Option<String>,
    enabled: bool,
    config: String,
    installed_at: String,
    last_enabled_at: Option<String>,
    last_disabled_at: Option<String>,
    last_error: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            version: row.get(2)?,
            description: row.get(3)?,
            enabled: row.get(4)?,
            config: row.get(5)?,
            installed_at: row.get(6)?,
            last_enabled_at: row.get(7)?,
            last_disabled_at: row.get(8)?,
            last_error: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<PluginRecord> {
        let config: ConfigMap = serde_json::from_str(&self.config)?;
        Ok(PluginRecord {
            installed_at: parse_timestamp(&self.installed_at)?,
            last_enabled_at: self.last_enabled_at.as_deref().map(parse_timestamp).transpose()?,
            last_disabled_at: self.last_disabled_at.as_deref().map(parse_timestamp).transpose()?,
            id: self.id,
            name: self.name,
            version: self.version,
            description: self.description.unwrap_or_default(),
            enabled: self.enabled,
            config,
            last_error: self.last_error,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<Timestamp> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|e| Error::SerializationError(format!("bad timestamp {:?}: {}", value, e)))
}

#[async_trait]
impl PluginStore for SqliteStore {
    async fn save(&self, record: PluginRecord) -> Result<PluginRecord> {
        let config = serde_json::to_string(&record.config)?;
        let conn = self.conn.lock().await;

        conn.execute(
            "INSERT INTO plugins
                (id, name, version, description, enabled, config,
                 installed_at, last_enabled_at, last_disabled_at, last_error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                version = excluded.version,
                description = excluded.description,
                enabled = excluded.enabled,
                config = excluded.config,
                installed_at = excluded.installed_at,
                last_enabled_at = excluded.last_enabled_at,
                last_disabled_at = excluded.last_disabled_at,
                last_error = excluded.last_error",
            params![
                record.id,
                record.name,
                record.version,
                record.description,
                record.enabled,
                config,
                record.installed_at.to_rfc3339(),
                record.last_enabled_at.map(|t| t.to_rfc3339()),
                record.last_disabled_at.map(|t| t.to_rfc3339()),
                record.last_error,
            ],
        )?;

        debug!(plugin_id = %record.id, enabled = record.enabled, "Saved plugin record");
        Ok(record)
    }

    async fn find(&self, id: &str) -> Result<Option<PluginRecord>> {
        let conn = self.conn.lock().await;
        let raw = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                RawRecord::from_row,
            )
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    async fn find_all(&self) -> Result<Vec<PluginRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!("{} ORDER BY id", SELECT_COLUMNS))?;
        let raws = stmt
            .query_map([], RawRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawRecord::into_record).collect()
    }

    async fn find_enabled(&self) -> Result<Vec<PluginRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!("{} WHERE enabled = 1 ORDER BY id", SELECT_COLUMNS))?;
        let raws = stmt
            .query_map([], RawRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawRecord::into_record).collect()
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Sqlite
    }

    async fn health_check(&self) -> Result<bool> {
        let conn = self.conn.lock().await;
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(one == 1)
    }

    async fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM plugins", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
