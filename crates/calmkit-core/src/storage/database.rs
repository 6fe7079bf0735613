//! SQLite-based routine history and key-value storage.
//!
//! Provides persistent storage for:
//! - Finished routine runs (completed and cancelled)
//! - Practice statistics (today and all-time)
//! - Key-value store for routine definitions and application state

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::DatabaseError;
use crate::routine::RoutineSummary;

use super::data_dir;

/// One row of the `routine_runs` history table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecordRow {
    pub id: i64,
    pub routine_id: String,
    pub routine_name: String,
    pub outcome: String,
    pub planned_secs: u64,
    pub elapsed_secs: f64,
    pub steps_completed: u32,
    pub steps_total: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Stats {
    pub total_runs: u64,
    pub completed_runs: u64,
    pub cancelled_runs: u64,
    pub total_practice_secs: f64,
    pub today_runs: u64,
    pub today_practice_secs: f64,
}

/// SQLite database for routine history.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data dir>/calmkit.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let dir = data_dir().map_err(|e| DatabaseError::DataDir(e.to_string()))?;
        Self::open_at(&dir.join("calmkit.db"))
    }

    /// Open (or create) the database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        debug!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS routine_runs (
                    id              INTEGER PRIMARY KEY AUTOINCREMENT,
                    routine_id      TEXT NOT NULL,
                    routine_name    TEXT NOT NULL DEFAULT '',
                    outcome         TEXT NOT NULL,
                    planned_secs    INTEGER NOT NULL,
                    elapsed_secs    REAL NOT NULL,
                    steps_completed INTEGER NOT NULL,
                    steps_total     INTEGER NOT NULL,
                    started_at      TEXT NOT NULL,
                    finished_at     TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS kv (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_routine_runs_finished_at ON routine_runs(finished_at);
                CREATE INDEX IF NOT EXISTS idx_routine_runs_outcome ON routine_runs(outcome);",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    /// Record a finished routine run.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn record_run(&self, summary: &RoutineSummary) -> Result<i64, DatabaseError> {
        self.conn.execute(
            "INSERT INTO routine_runs (routine_id, routine_name, outcome, planned_secs,
                elapsed_secs, steps_completed, steps_total, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                summary.routine_id,
                summary.routine_name,
                summary.outcome.as_str(),
                summary.total_planned_secs,
                summary.total_elapsed_secs,
                summary.completed_steps() as u32,
                summary.steps.len() as u32,
                summary.started_at.to_rfc3339(),
                summary.finished_at.to_rfc3339(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, routine = %summary.routine_name, "run recorded");
        Ok(id)
    }

    /// Most recent runs first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecordRow>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, routine_id, routine_name, outcome, planned_secs, elapsed_secs,
                    steps_completed, steps_total, started_at, finished_at
             FROM routine_runs
             ORDER BY finished_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, u64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, u32>(6)?,
                row.get::<_, u32>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, String>(9)?,
            ))
        })?;

        let mut runs = Vec::new();
        for row in rows {
            let (
                id,
                routine_id,
                routine_name,
                outcome,
                planned_secs,
                elapsed_secs,
                steps_completed,
                steps_total,
                started_at,
                finished_at,
            ) = row?;
            runs.push(RunRecordRow {
                id,
                routine_id,
                routine_name,
                outcome,
                planned_secs,
                elapsed_secs,
                steps_completed,
                steps_total,
                started_at: parse_timestamp(&started_at)?,
                finished_at: parse_timestamp(&finished_at)?,
            });
        }
        Ok(runs)
    }

    pub fn stats(&self) -> Result<Stats, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT outcome, COUNT(*), COALESCE(SUM(elapsed_secs), 0.0)
             FROM routine_runs
             GROUP BY outcome",
        )?;

        let mut stats = Stats::default();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        for row in rows {
            let (outcome, count, secs) = row?;
            stats.total_runs += count;
            stats.total_practice_secs += secs;
            match outcome.as_str() {
                "completed" => stats.completed_runs += count,
                "cancelled" => stats.cancelled_runs += count,
                _ => {}
            }
        }

        // Today's runs
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let (today_runs, today_secs) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(elapsed_secs), 0.0)
             FROM routine_runs
             WHERE finished_at >= ?1",
            params![format!("{today}T00:00:00+00:00")],
            |row| Ok((row.get::<_, u64>(0)?, row.get::<_, f64>(1)?)),
        )?;
        stats.today_runs = today_runs;
        stats.today_practice_secs = today_secs;

        Ok(stats)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Returns whether a row was removed.
    pub fn kv_delete(&self, key: &str) -> Result<bool, DatabaseError> {
        let removed = self
            .conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    /// All `(key, value)` pairs whose key starts with `prefix`, ordered by key.
    pub fn kv_keys_with_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT key, value FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let rows = stmt.query_map(params![prefix], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::QueryFailed(format!("bad timestamp '{raw}': {e}")))
}
