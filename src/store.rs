//! Durable storage for job records.
//!
//! One `print_jobs` table holds every job; the queue and the history are two
//! read paths over it, not separate tables. All access is serialized through
//! a `Mutex<Connection>`, which is what gives status updates their
//! compare-and-set semantics: the current status is read and checked under
//! the same lock that applies the write.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use thiserror::Error;

use crate::job::{Job, JobId, JobStatus, PrintOptions};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS print_jobs (
    job_id          INTEGER PRIMARY KEY,
    file_ref        TEXT NOT NULL,
    original_name   TEXT NOT NULL,
    file_size_bytes INTEGER NOT NULL,
    copies          INTEGER NOT NULL,
    duplex          INTEGER NOT NULL,
    status          TEXT NOT NULL,
    submitted_at    TEXT NOT NULL,
    completed_at    TEXT
);
CREATE INDEX IF NOT EXISTS idx_print_jobs_submitted_at ON print_jobs(submitted_at);
";

/// Cloneable handle to the job table.
#[derive(Clone)]
pub struct JobStore {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend handed out an id we already track. Should not happen;
    /// treated as a corruption signal by callers.
    #[error("job {0} already exists in the store")]
    DuplicateJobId(JobId),
    /// The requested status change violates the monotonic transition graph.
    /// Indicates a race between two reconciliation passes, not a fault.
    #[error("job {id}: illegal status transition {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("no job found with id {0}")]
    NotFound(JobId),
    #[error("store lock poisoned")]
    LockPoisoned,
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl JobStore {
    /// Opens (or creates) the job database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// Opens an in-memory store, used in tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }

    /// Inserts a freshly submitted job.
    pub fn insert(&self, job: &Job) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO print_jobs
                 (job_id, file_ref, original_name, file_size_bytes, copies, duplex,
                  status, submitted_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    i64::from(job.id),
                    job.file_ref.to_string_lossy(),
                    job.original_name,
                    job.file_size_bytes,
                    job.options.copies(),
                    job.options.duplex(),
                    job.status.as_str(),
                    job.submitted_at.to_rfc3339(),
                    job.completed_at.map(|at| at.to_rfc3339()),
                ],
            )?;
            if inserted == 0 {
                return Err(StoreError::DuplicateJobId(job.id));
            }
            Ok(())
        })
    }

    /// Moves a job to `status`, enforcing the monotonic transition graph.
    ///
    /// `completed_at` must be provided exactly when `status` is terminal.
    /// The read-check-write runs under the connection lock, so two
    /// concurrent updates to the same job serialize and the loser gets
    /// [`StoreError::InvalidTransition`].
    pub fn update_status(
        &self,
        id: JobId,
        status: JobStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        debug_assert_eq!(status.is_terminal(), completed_at.is_some());
        self.with_conn(|conn| {
            let current = current_status(conn, id)?;
            if !current.can_transition_to(status) {
                return Err(StoreError::InvalidTransition {
                    id,
                    from: current,
                    to: status,
                });
            }
            conn.execute(
                "UPDATE print_jobs SET status = ?2, completed_at = ?3 WHERE job_id = ?1",
                params![
                    i64::from(id),
                    status.as_str(),
                    completed_at.map(|at| at.to_rfc3339()),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM print_jobs WHERE job_id = ?1")?;
            let mut rows = stmt.query_map(params![i64::from(id)], job_from_row)?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })
    }

    /// Jobs not yet in a terminal status, oldest first (FIFO display order).
    pub fn list_queue(&self) -> Result<Vec<Job>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM print_jobs
                 WHERE status IN ('pending', 'processing')
                 ORDER BY submitted_at ASC",
            )?;
            let jobs = stmt
                .query_map([], job_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(jobs)
        })
    }

    /// All jobs submitted at or after `since`, newest first.
    pub fn list_history(&self, since: DateTime<Utc>) -> Result<Vec<Job>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM print_jobs
                 WHERE submitted_at >= ?1
                 ORDER BY submitted_at DESC",
            )?;
            let jobs = stmt
                .query_map(params![since.to_rfc3339()], job_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(jobs)
        })
    }

    /// Jobs submitted before `cutoff`, with the file each one references.
    ///
    /// The sweeper deletes the backing file first and only then calls
    /// [`JobStore::remove`], so a crash between the two leaves an orphan
    /// file rather than a row pointing at nothing.
    pub fn list_expired(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<(JobId, PathBuf)>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT job_id, file_ref FROM print_jobs WHERE submitted_at < ?1",
            )?;
            let rows = stmt
                .query_map(params![cutoff.to_rfc3339()], |row| {
                    let id: i64 = row.get("job_id")?;
                    let file_ref: String = row.get("file_ref")?;
                    Ok((JobId::from(id), PathBuf::from(file_ref)))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Removes a job row. Returns whether a row was deleted.
    pub fn remove(&self, id: JobId) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM print_jobs WHERE job_id = ?1",
                params![i64::from(id)],
            )?;
            Ok(deleted > 0)
        })
    }
}

fn current_status(conn: &Connection, id: JobId) -> Result<JobStatus, StoreError> {
    let mut stmt = conn.prepare("SELECT status FROM print_jobs WHERE job_id = ?1")?;
    let mut rows = stmt.query_map(params![i64::from(id)], |row| row.get::<_, String>(0))?;
    match rows.next() {
        Some(raw) => parse_status(&raw?),
        None => Err(StoreError::NotFound(id)),
    }
}

fn job_from_row(row: &Row<'_>) -> Result<Job, rusqlite::Error> {
    let id: i64 = row.get("job_id")?;
    let file_ref: String = row.get("file_ref")?;
    let status: String = row.get("status")?;
    let submitted_at: String = row.get("submitted_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    let copies: u8 = row.get("copies")?;
    let duplex: bool = row.get("duplex")?;
    Ok(Job {
        id: id.into(),
        file_ref: PathBuf::from(file_ref),
        original_name: row.get("original_name")?,
        file_size_bytes: row.get("file_size_bytes")?,
        options: PrintOptions::new(copies, duplex).map_err(|_| bad_column("copies"))?,
        status: JobStatus::parse(&status).ok_or_else(|| bad_column("status"))?,
        submitted_at: parse_timestamp(&submitted_at)?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn parse_status(raw: &str) -> Result<JobStatus, StoreError> {
    JobStatus::parse(raw).ok_or_else(|| StoreError::Sqlite(bad_column("status")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| bad_column("timestamp"))
}

fn bad_column(column: &str) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnName(column.to_owned())
}
