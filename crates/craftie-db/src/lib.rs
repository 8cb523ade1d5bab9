//! Session store for craftie.
//!
//! Finished sessions are recorded here after the live loop ends, along with
//! whether they already reached the spreadsheet. `craftie sync` later flushes
//! the unsynced ones in bulk.
//!
//! # Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 UTC with millisecond precision
//! (e.g., `2025-03-10T09:00:00.000Z`), so lexicographic order matches
//! chronological order.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use craftie_core::Session;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp for session {session_id}: {timestamp}")]
    TimestampParse {
        session_id: i64,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

/// A session row as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub id: i64,
    pub session: Session,
    pub synced: bool,
    /// Spreadsheet row created for this session by the live loop.
    pub sheet_row: Option<u32>,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema. Idempotent.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_name TEXT NOT NULL,
                task TEXT NOT NULL DEFAULT '',
                notes TEXT NOT NULL DEFAULT '',
                start_time TEXT NOT NULL,
                end_time TEXT,
                synced_to_sheets INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                sheet_row INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_start ON sessions(start_time);
            CREATE INDEX IF NOT EXISTS idx_sessions_synced ON sessions(synced_to_sheets);
            ",
        )?;
        self.add_column_if_missing("sheet_row", "INTEGER")?;
        Ok(())
    }

    /// Appends a column to `sessions` when an older store lacks it.
    fn add_column_if_missing(&self, column: &str, definition: &str) -> Result<(), DbError> {
        let exists: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('sessions') WHERE name = ?1",
            [column],
            |row| row.get(0),
        )?;
        if !exists {
            tracing::debug!(column, "adding missing sessions column");
            self.conn
                .execute_batch(&format!("ALTER TABLE sessions ADD COLUMN {column} {definition}"))?;
        }
        Ok(())
    }

    /// Records a session and returns its row ID.
    ///
    /// `sheet_row` is the spreadsheet row the live loop created, so a later
    /// batch sync rewrites it instead of appending a duplicate.
    pub fn insert_session(
        &self,
        session: &Session,
        synced: bool,
        sheet_row: Option<u32>,
    ) -> Result<i64, DbError> {
        let now = format_timestamp(Utc::now());
        self.conn.execute(
            "
            INSERT INTO sessions
                (project_name, task, notes, start_time, end_time, synced_to_sheets, created_at, updated_at, sheet_row)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8)
            ",
            params![
                session.project(),
                session.task(),
                session.notes(),
                format_timestamp(session.start_time()),
                session.end_time().map(format_timestamp),
                synced,
                now,
                sheet_row,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(id, synced, project = session.project(), "recorded session");
        Ok(id)
    }

    /// Lists completed sessions not yet synced to the spreadsheet, oldest first.
    pub fn unsynced_sessions(&self) -> Result<Vec<StoredSession>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, project_name, task, notes, start_time, end_time, synced_to_sheets, sheet_row
            FROM sessions
            WHERE synced_to_sheets = 0 AND end_time IS NOT NULL
            ORDER BY start_time ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RawSession {
                id: row.get(0)?,
                project: row.get(1)?,
                task: row.get(2)?,
                notes: row.get(3)?,
                start_time: row.get(4)?,
                end_time: row.get(5)?,
                synced: row.get(6)?,
                sheet_row: row.get(7)?,
            })
        })?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?.into_stored()?);
        }
        Ok(sessions)
    }

    /// Marks the given sessions as synced in one transaction.
    ///
    /// Returns how many rows flipped; rows already synced are left alone.
    pub fn mark_sessions_synced(&mut self, ids: &[i64]) -> Result<usize, DbError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let now = format_timestamp(Utc::now());
        let tx = self.conn.transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare(
                "
                UPDATE sessions
                SET synced_to_sheets = 1, updated_at = ?2
                WHERE id = ?1 AND synced_to_sheets = 0
                ",
            )?;
            for id in ids {
                updated += stmt.execute(params![id, now])?;
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    /// Total number of recorded sessions.
    pub fn session_count(&self) -> Result<u64, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Looks up one session by ID.
    pub fn get_session(&self, id: i64) -> Result<Option<StoredSession>, DbError> {
        let raw = self
            .conn
            .query_row(
                "
                SELECT id, project_name, task, notes, start_time, end_time, synced_to_sheets, sheet_row
                FROM sessions
                WHERE id = ?1
                ",
                [id],
                |row| {
                    Ok(RawSession {
                        id: row.get(0)?,
                        project: row.get(1)?,
                        task: row.get(2)?,
                        notes: row.get(3)?,
                        start_time: row.get(4)?,
                        end_time: row.get(5)?,
                        synced: row.get(6)?,
                        sheet_row: row.get(7)?,
                    })
                },
            )
            .optional()?;
        raw.map(RawSession::into_stored).transpose()
    }
}

struct RawSession {
    id: i64,
    project: String,
    task: String,
    notes: String,
    start_time: String,
    end_time: Option<String>,
    synced: bool,
    sheet_row: Option<u32>,
}

impl RawSession {
    fn into_stored(self) -> Result<StoredSession, DbError> {
        let start = parse_timestamp(&self.start_time, self.id)?;
        let end = self
            .end_time
            .as_deref()
            .map(|end| parse_timestamp(end, self.id))
            .transpose()?;
        Ok(StoredSession {
            id: self.id,
            session: Session::from_parts(start, end, self.project, self.task, self.notes),
            synced: self.synced,
            sheet_row: self.sheet_row,
        })
    }
}

fn parse_timestamp(timestamp: &str, session_id: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            session_id,
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
