use autohunt_config::HuntConfig;
use autohunt_core::{EndReason, HuntError, SessionStats};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

fn storage_err(e: impl std::fmt::Display) -> HuntError {
    HuntError::Storage(e.to_string())
}

/// Aggregates over every stored session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTotals {
    pub sessions: u64,
    pub time_running_secs: u64,
    pub creatures_killed: u64,
    pub items_looted: u64,
    pub heals_used: u64,
    pub attacks_made: u64,
}

/// A stored hunt profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedProfile {
    pub id: i64,
    pub name: String,
    pub saved_at: DateTime<Utc>,
    pub config: HuntConfig,
}

/// Session history and profile storage backed by one SQLite database.
#[derive(Clone)]
pub struct SessionStore {
    db: Arc<Mutex<Connection>>,
}

impl SessionStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> autohunt_core::Result<Self> {
        info!(?path, "opening session store");

        let conn = Connection::open(path).map_err(storage_err)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(storage_err)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                heals_used INTEGER NOT NULL DEFAULT 0,
                food_used INTEGER NOT NULL DEFAULT 0,
                attacks_made INTEGER NOT NULL DEFAULT 0,
                creatures_killed INTEGER NOT NULL DEFAULT 0,
                items_looted INTEGER NOT NULL DEFAULT 0,
                items_discarded INTEGER NOT NULL DEFAULT 0,
                exp_gained INTEGER NOT NULL DEFAULT 0,
                time_running_secs INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                ended_at TEXT,
                end_reason TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_created ON sessions(created_at);

            CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                config_json TEXT NOT NULL,
                saved_at TEXT NOT NULL
            );
            ",
        )
        .map_err(storage_err)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> autohunt_core::Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    // ── Sessions ───────────────────────────────────────────────

    /// Write a session record. Saving the same session again overwrites it.
    pub fn save_session(&self, record: &SessionStats) -> autohunt_core::Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT OR REPLACE INTO sessions (
                id, heals_used, food_used, attacks_made, creatures_killed, items_looted,
                items_discarded, exp_gained, time_running_secs, created_at, ended_at, end_reason
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            rusqlite::params![
                record.session_id.to_string(),
                record.heals_used as i64,
                record.food_used as i64,
                record.attacks_made as i64,
                record.creatures_killed as i64,
                record.items_looted as i64,
                record.items_discarded as i64,
                record.exp_gained as i64,
                record.time_running_secs as i64,
                record.created_at.to_rfc3339(),
                record.ended_at.map(|t| t.to_rfc3339()),
                record.end_reason.map(end_reason_str),
            ],
        )
        .map_err(storage_err)?;
        debug!(session_id = %record.session_id, "session record saved");
        Ok(())
    }

    /// Most recent sessions first.
    pub fn recent_sessions(&self, limit: usize) -> autohunt_core::Result<Vec<SessionStats>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT id, heals_used, food_used, attacks_made, creatures_killed, items_looted,
                        items_discarded, exp_gained, time_running_secs, created_at, ended_at, end_reason
                 FROM sessions ORDER BY created_at DESC LIMIT ?1",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([limit as i64], session_from_row)
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    pub fn totals(&self) -> autohunt_core::Result<HistoryTotals> {
        let db = self.db.lock();
        db.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(time_running_secs), 0),
                    COALESCE(SUM(creatures_killed), 0),
                    COALESCE(SUM(items_looted), 0),
                    COALESCE(SUM(heals_used), 0),
                    COALESCE(SUM(attacks_made), 0)
             FROM sessions",
            [],
            |r| {
                Ok(HistoryTotals {
                    sessions: r.get::<_, i64>(0)? as u64,
                    time_running_secs: r.get::<_, i64>(1)? as u64,
                    creatures_killed: r.get::<_, i64>(2)? as u64,
                    items_looted: r.get::<_, i64>(3)? as u64,
                    heals_used: r.get::<_, i64>(4)? as u64,
                    attacks_made: r.get::<_, i64>(5)? as u64,
                })
            },
        )
        .map_err(storage_err)
    }

    // ── Profiles ───────────────────────────────────────────────

    /// Store a profile. Every save is kept; the newest one wins on load.
    pub fn save_profile(&self, config: &HuntConfig) -> autohunt_core::Result<i64> {
        let json = serde_json::to_string(config)?;
        let db = self.db.lock();
        db.execute(
            "INSERT INTO profiles (name, config_json, saved_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![config.name, json, Utc::now().to_rfc3339()],
        )
        .map_err(storage_err)?;
        let id = db.last_insert_rowid();
        info!(profile = %config.name, id, "hunt profile saved");
        Ok(id)
    }

    pub fn latest_profile(&self) -> autohunt_core::Result<Option<SavedProfile>> {
        let row = {
            let db = self.db.lock();
            db.query_row(
                "SELECT id, name, config_json, saved_at FROM profiles ORDER BY id DESC LIMIT 1",
                [],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(storage_err)?
        };

        let Some((id, name, json, saved_at)) = row else {
            return Ok(None);
        };
        Ok(Some(SavedProfile {
            id,
            name,
            saved_at: parse_time(&saved_at).map_err(storage_err)?,
            config: serde_json::from_str(&json)?,
        }))
    }
}

fn end_reason_str(reason: EndReason) -> &'static str {
    match reason {
        EndReason::Stopped => "stopped",
        EndReason::Emergency => "emergency",
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc))
}

fn conversion_err(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn session_from_row(r: &Row<'_>) -> rusqlite::Result<SessionStats> {
    let id: String = r.get(0)?;
    let created_at: String = r.get(9)?;
    let ended_at: Option<String> = r.get(10)?;
    let end_reason: Option<String> = r.get(11)?;
    let count = |idx: usize| r.get::<_, i64>(idx).map(|v| v.max(0) as u64);

    Ok(SessionStats {
        session_id: Uuid::parse_str(&id).map_err(|e| conversion_err(0, e))?,
        heals_used: count(1)?,
        food_used: count(2)?,
        attacks_made: count(3)?,
        creatures_killed: count(4)?,
        items_looted: count(5)?,
        items_discarded: count(6)?,
        exp_gained: count(7)?,
        time_running_secs: count(8)?,
        created_at: parse_time(&created_at).map_err(|e| conversion_err(9, e))?,
        ended_at: ended_at
            .as_deref()
            .map(parse_time)
            .transpose()
            .map_err(|e| conversion_err(10, e))?,
        end_reason: match end_reason.as_deref() {
            Some("emergency") => Some(EndReason::Emergency),
            Some(_) => Some(EndReason::Stopped),
            None => None,
        },
    })
}
