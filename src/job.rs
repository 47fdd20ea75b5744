//! The job data model: identifiers, statuses, print options, and the job
//! record itself.

use std::fmt::Display;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// The identifier assigned to a job by the print backend at submission time.
///
/// Ids are issued by the backend, never by this crate, and are never reused.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash, Serialize)]
pub struct JobId(i64);

impl From<i64> for JobId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<JobId> for i64 {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

/// The lifecycle state of a job.
///
/// Transitions are monotonic: `Pending` < `Processing` < terminal, and a
/// terminal status (`Completed`, `Failed`, `Cancelled`) accepts no further
/// transition. Reconciliation may skip `Processing` entirely when the backend
/// reports completion before the job was ever observed printing.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` respects the monotonic graph.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        !self.is_terminal() && self.rank() < next.rank()
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed | Self::Cancelled => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Print options fixed at submission time.
///
/// Immutable once a job is created; a reprint creates a new job carrying the
/// same options.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct PrintOptions {
    copies: u8,
    duplex: bool,
}

impl PrintOptions {
    pub const MAX_COPIES: u8 = 10;

    /// Validates the copies range (1..=10) at construction so every
    /// `PrintOptions` in the system is well-formed.
    pub fn new(copies: u8, duplex: bool) -> Result<Self, InvalidOptions> {
        if copies == 0 || copies > Self::MAX_COPIES {
            return Err(InvalidOptions::Copies(copies));
        }
        Ok(Self { copies, duplex })
    }

    pub fn copies(&self) -> u8 {
        self.copies
    }

    pub fn duplex(&self) -> bool {
        self.duplex
    }
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            copies: 1,
            duplex: false,
        }
    }
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum InvalidOptions {
    #[error("copies must be between 1 and 10, got {0}")]
    Copies(u8),
}

/// A tracked print job.
///
/// Created only by a successful backend submission, mutated only by
/// reconciliation or an explicit cancel, and removed only by the retention
/// sweeper.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    /// Reference to the stored document. Owned by the upload pipeline; this
    /// crate only reads it (reprint) and deletes it (retention sweep).
    pub file_ref: PathBuf,
    /// Display name for presentation only.
    pub original_name: String,
    pub file_size_bytes: u64,
    pub options: PrintOptions,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    /// Set exactly once, when the job enters a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}
