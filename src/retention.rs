//! Bounded retention over job records and their backing files.
//!
//! The sweeper deletes the backing file before its row: a crash mid-sweep
//! leaves an orphan file that the next cycle removes, never a row whose
//! file is already gone and which the UI could still offer to reprint.

use chrono::{DateTime, TimeDelta, Utc};

use crate::store::{JobStore, StoreError};

pub(crate) mod runner;

/// Removes expired job records together with their backing files.
pub struct RetentionSweeper {
    store: JobStore,
    retention: TimeDelta,
}

/// What one sweep cycle removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub files_deleted: usize,
    pub records_deleted: usize,
}

impl RetentionSweeper {
    pub fn new(store: JobStore, retention: TimeDelta) -> Self {
        Self { store, retention }
    }

    /// Runs one sweep with `now` as the reference time.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepOutcome, StoreError> {
        let cutoff = now - self.retention;
        let expired = self.store.list_expired(cutoff)?;
        let mut outcome = SweepOutcome::default();

        for (id, file_ref) in expired {
            match tokio::fs::remove_file(&file_ref).await {
                Ok(()) => outcome.files_deleted += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    // Already gone; still authorization to drop the row.
                    tracing::debug!(%id, file = %file_ref.display(), "Backing file already removed");
                }
                Err(err) => {
                    // Keep the row so the job stays visible; retried next cycle.
                    tracing::warn!(?err, %id, file = %file_ref.display(),
                        "Failed to delete backing file for job {id}, keeping its record");
                    continue;
                }
            }
            if self.store.remove(id)? {
                outcome.records_deleted += 1;
            }
        }

        if outcome.records_deleted > 0 || outcome.files_deleted > 0 {
            tracing::info!(
                files = outcome.files_deleted,
                records = outcome.records_deleted,
                "Retention sweep removed {} files and {} records",
                outcome.files_deleted,
                outcome.records_deleted
            );
        }
        Ok(outcome)
    }
}
