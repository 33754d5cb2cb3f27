//! SQLite persistence for settings and peer trust.
//!
//! Two tables: `app_settings` holds JSON-encoded values by key, `peers` holds
//! one trust row per origin host. Times are stored as unix seconds.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use webfs_types::{NtStatus, PeerIdentity, TrustRecord, TrustState};

use crate::constants::{DATA_DIR_NAME, DB_FILE_NAME};

const SCHEMA: &str = r#"
-- Key/value settings, values are JSON
CREATE TABLE IF NOT EXISTS app_settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Peer trust, one row per origin host
CREATE TABLE IF NOT EXISTS peers (
    host TEXT PRIMARY KEY,
    trust INTEGER NULL,
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    url TEXT NOT NULL DEFAULT ''
);
"#;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("setting {key:?} is not valid JSON for the requested type: {source}")]
    Setting {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<DbError> for NtStatus {
    fn from(_: DbError) -> Self {
        NtStatus::Unsuccessful
    }
}

pub type DbResult<T> = Result<T, DbError>;

// ============================================================================
// Store traits
// ============================================================================

/// Typed key/value settings.
pub trait SettingsStore {
    /// Value for `key`, or `default` when unset.
    fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> DbResult<T>;

    fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> DbResult<()>;

    fn exists(&self, key: &str) -> DbResult<bool>;

    fn remove(&self, key: &str) -> DbResult<()>;
}

/// Per-peer trust records.
pub trait TrustStore: Send + Sync {
    fn lookup(&self, host: &PeerIdentity) -> DbResult<Option<TrustRecord>>;

    /// Note a connection from `host`. Creates an `Unset` record on first
    /// contact; otherwise refreshes `last_seen` and `url` and leaves trust
    /// alone. Returns the record and whether it was new.
    fn observe(&self, host: &PeerIdentity, url: &str, now: SystemTime) -> DbResult<(TrustRecord, bool)>;

    /// Set the trust decision, creating the record if needed.
    fn set_trust(&self, host: &PeerIdentity, trust: TrustState) -> DbResult<TrustRecord>;

    /// All records, ordered by host.
    fn list(&self) -> DbResult<Vec<TrustRecord>>;
}

// ============================================================================
// AppDb
// ============================================================================

/// SQLite-backed [`SettingsStore`] and [`TrustStore`].
pub struct AppDb {
    conn: Mutex<Connection>,
}

fn to_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

fn from_secs(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<TrustRecord> {
    let host: String = row.get(0)?;
    let trust: Option<bool> = row.get(1)?;
    Ok(TrustRecord {
        host: PeerIdentity::new(host),
        trust: TrustState::from_option(trust),
        first_seen: from_secs(row.get(2)?),
        last_seen: from_secs(row.get(3)?),
        url: row.get(4)?,
    })
}

impl AppDb {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| DbError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "opened database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Default database location under the platform data directory.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DATA_DIR_NAME)
            .join(DB_FILE_NAME)
    }

    fn select_peer(conn: &Connection, host: &PeerIdentity) -> DbResult<Option<TrustRecord>> {
        Ok(conn
            .query_row(
                "SELECT host, trust, first_seen, last_seen, url FROM peers WHERE host = ?1",
                params![host.as_str()],
                row_to_record,
            )
            .optional()?)
    }
}

impl SettingsStore for AppDb {
    fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> DbResult<T> {
        let raw: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT value FROM app_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(json) => serde_json::from_str(&json).map_err(|source| DbError::Setting {
                key: key.to_string(),
                source,
            }),
            None => Ok(default),
        }
    }

    fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> DbResult<()> {
        let json = serde_json::to_string(value).map_err(|source| DbError::Setting {
            key: key.to_string(),
            source,
        })?;
        self.conn.lock().execute(
            "INSERT INTO app_settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, json],
        )?;
        Ok(())
    }

    fn exists(&self, key: &str) -> DbResult<bool> {
        let found: Option<i64> = self
            .conn
            .lock()
            .query_row(
                "SELECT 1 FROM app_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn remove(&self, key: &str) -> DbResult<()> {
        self.conn
            .lock()
            .execute("DELETE FROM app_settings WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl TrustStore for AppDb {
    fn lookup(&self, host: &PeerIdentity) -> DbResult<Option<TrustRecord>> {
        Self::select_peer(&self.conn.lock(), host)
    }

    fn observe(&self, host: &PeerIdentity, url: &str, now: SystemTime) -> DbResult<(TrustRecord, bool)> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let existing = Self::select_peer(&tx, host)?;
        let (record, is_new) = match existing {
            Some(mut record) => {
                tx.execute(
                    "UPDATE peers SET last_seen = ?2, url = ?3 WHERE host = ?1",
                    params![host.as_str(), to_secs(now), url],
                )?;
                record.last_seen = from_secs(to_secs(now));
                record.url = url.to_string();
                (record, false)
            }
            None => {
                tx.execute(
                    "INSERT INTO peers (host, trust, first_seen, last_seen, url)
                     VALUES (?1, NULL, ?2, ?2, ?3)",
                    params![host.as_str(), to_secs(now), url],
                )?;
                let stamp = from_secs(to_secs(now));
                (TrustRecord::first_contact(host.clone(), url, stamp), true)
            }
        };
        tx.commit()?;
        Ok((record, is_new))
    }

    fn set_trust(&self, host: &PeerIdentity, trust: TrustState) -> DbResult<TrustRecord> {
        let conn = self.conn.lock();
        let now = to_secs(SystemTime::now());
        conn.execute(
            "INSERT INTO peers (host, trust, first_seen, last_seen, url)
             VALUES (?1, ?2, ?3, ?3, '')
             ON CONFLICT(host) DO UPDATE SET trust = excluded.trust",
            params![host.as_str(), trust.as_option(), now],
        )?;
        Self::select_peer(&conn, host)?.ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    fn list(&self) -> DbResult<Vec<TrustRecord>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT host, trust, first_seen, last_seen, url FROM peers ORDER BY host")?;
        let rows = stmt.query_map([], row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
