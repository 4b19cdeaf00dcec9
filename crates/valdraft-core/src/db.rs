// SQLite persistence layer for picks and cached draft state.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::ledger::{NewPick, PickRecord, PickStore, StoreError};

/// How long a writer waits on another process's lock before giving up.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed pick table plus a key-value table for cached state.
///
/// Several processes may open the same file; the `UNIQUE(name_key)`
/// constraint is what keeps picks unique across all of them.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at `path` with the default busy timeout.
    /// Pass `":memory:"` for an ephemeral database (useful for tests).
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open (or create) a database at `path`, waiting at most `busy_timeout`
    /// for locks held by other connections.
    pub fn open_with_timeout(path: &str, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.busy_timeout(busy_timeout)
            .context("failed to set busy timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS picks (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                player_name TEXT NOT NULL,
                name_key    TEXT NOT NULL UNIQUE,
                picked_by   TEXT,
                player_id   INTEGER,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS draft_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Number of committed picks.
    pub fn pick_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM picks", [], |row| row.get(0))
            .context("failed to count picks")?;
        Ok(count as usize)
    }

    /// Persist an arbitrary JSON value under `key`, replacing any previous
    /// value.
    pub fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let json_str =
            serde_json::to_string(value).context("failed to serialize state value")?;
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO draft_state (key, value) VALUES (?1, ?2)",
                params![key, json_str],
            )
            .context("failed to save state")?;
        Ok(())
    }

    /// Load a previously saved JSON value by `key`. Returns `None` if the key
    /// does not exist.
    pub fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let json_str: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM draft_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query draft state")?;

        json_str
            .map(|s| serde_json::from_str(&s).context("failed to deserialize state value"))
            .transpose()
    }

    fn select_picks(&self, sql: &str, after_id: i64) -> Result<Vec<PickRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(sql)
            .context("failed to prepare pick query")?;
        let picks = stmt
            .query_map(params![after_id], pick_from_row)
            .context("failed to query picks")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map pick rows")?;
        Ok(picks)
    }
}

const PICK_COLUMNS: &str = "id, player_name, name_key, picked_by, player_id, created_at";

fn pick_from_row(row: &Row<'_>) -> rusqlite::Result<PickRecord> {
    let created_at: String = row.get(5)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);
    Ok(PickRecord {
        id: row.get(0)?,
        player_name: row.get(1)?,
        name_key: row.get(2)?,
        picked_by: row.get(3)?,
        player_id: row.get(4)?,
        created_at,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl PickStore for Database {
    fn insert_pick(&self, pick: &NewPick) -> Result<PickRecord, StoreError> {
        // Millisecond precision so the returned record equals what is read back.
        let created_at = Utc::now().trunc_subsecs(3);
        let inserted = self.conn().query_row(
            "INSERT INTO picks (player_name, name_key, picked_by, player_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id",
            params![
                pick.player_name,
                pick.name_key,
                pick.picked_by,
                pick.player_id,
                created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ],
            |row| row.get::<_, i64>(0),
        );

        match inserted {
            Ok(id) => Ok(PickRecord {
                id,
                player_name: pick.player_name.clone(),
                name_key: pick.name_key.clone(),
                picked_by: pick.picked_by.clone(),
                player_id: pick.player_id,
                created_at,
            }),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict {
                name_key: pick.name_key.clone(),
            }),
            Err(e) => Err(StoreError::Backend(
                anyhow::Error::new(e).context("failed to record pick"),
            )),
        }
    }

    fn find_pick(&self, name_key: &str) -> Result<Option<PickRecord>, StoreError> {
        let sql = format!("SELECT {PICK_COLUMNS} FROM picks WHERE name_key = ?1");
        self.conn()
            .query_row(&sql, params![name_key], pick_from_row)
            .optional()
            .context("failed to look up pick")
            .map_err(StoreError::Backend)
    }

    fn picked_keys(&self) -> Result<HashSet<String>, StoreError> {
        let conn = self.conn();
        let keys = conn
            .prepare("SELECT name_key FROM picks")
            .and_then(|mut stmt| {
                stmt.query_map([], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<HashSet<_>>>()
            })
            .context("failed to list picked players")
            .map_err(StoreError::Backend)?;
        Ok(keys)
    }

    fn picks_after(&self, after_id: i64) -> Result<Vec<PickRecord>, StoreError> {
        let sql = format!("SELECT {PICK_COLUMNS} FROM picks WHERE id > ?1 ORDER BY id");
        self.select_picks(&sql, after_id)
            .map_err(StoreError::Backend)
    }

    fn latest_pick_id(&self) -> Result<i64, StoreError> {
        self.conn()
            .query_row("SELECT COALESCE(MAX(id), 0) FROM picks", [], |row| row.get(0))
            .context("failed to read latest pick id")
            .map_err(StoreError::Backend)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
