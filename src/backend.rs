//! The typed boundary to the external print subsystem.
//!
//! The subsystem's status vocabulary is untyped text; implementations report
//! it raw and [`normalize_status`] folds it into the crate's status model so
//! the orchestrator never touches the wire format.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::job::{JobId, JobStatus, PrintOptions};

pub mod cups;

/// A client of the external, authoritative print subsystem.
///
/// Implementations hold no job state of their own; every call reflects the
/// subsystem's view at the moment it was made.
#[async_trait]
pub trait PrintBackend: Clone {
    /// Submits the file for printing and returns the id the subsystem
    /// assigned to it.
    async fn submit(
        &self,
        file_ref: &std::path::Path,
        options: &PrintOptions,
    ) -> Result<JobId, BackendError>;

    /// The subsystem's live queue. An empty queue is an empty `Vec`, not an
    /// error.
    async fn list_active(&self) -> Result<Vec<ActiveJob>, BackendError>;

    /// The subsystem's short-lived completed-job history. Entries are only
    /// retained briefly by the subsystem, so this supplements rather than
    /// replaces the local store.
    async fn list_completed_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<CompletedJob>, BackendError>;

    async fn cancel(&self, id: JobId) -> Result<(), BackendError>;

    /// Health probe. Must never fail on subsystem absence, only answer false.
    async fn available(&self) -> bool;
}

/// An entry in the backend's live queue.
#[derive(Debug, Clone)]
pub struct ActiveJob {
    pub id: JobId,
    pub raw_status: String,
}

/// An entry in the backend's recently-completed history.
#[derive(Debug, Clone)]
pub struct CompletedJob {
    pub id: JobId,
    pub raw_status: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// The subsystem could not be reached, or did not answer in time.
    /// Transient: callers may retry.
    #[error("print backend unavailable: {0}")]
    Unavailable(String),
    /// The subsystem refused the job. Permanent: surfaced to the user, no
    /// record is created.
    #[error("print backend rejected the job: {0}")]
    Rejected(String),
    /// The job already left the active queue. An expected race, not a fault.
    #[error("job {0} can no longer be cancelled")]
    NotCancellable(JobId),
}

/// Folds the backend's textual status vocabulary into the typed model.
///
/// Unrecognized vocabulary maps to [`JobStatus::Processing`] with a warning:
/// a job the backend still talks about is assumed to be in flight, and
/// vocabulary drift must never crash reconciliation.
pub fn normalize_status(raw: &str) -> JobStatus {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pending" | "queued" | "held" | "waiting" => JobStatus::Pending,
        "processing" | "printing" | "started" => JobStatus::Processing,
        "completed" | "complete" | "done" | "finished" => JobStatus::Completed,
        "aborted" | "error" | "stopped" => JobStatus::Failed,
        "canceled" | "cancelled" => JobStatus::Cancelled,
        other => {
            tracing::warn!(raw_status = other, "Unrecognized backend status vocabulary");
            JobStatus::Processing
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// A scripted backend for driving the lifecycle manager in tests.
    ///
    /// Submit and cancel results are queued with `expect_*` and popped per
    /// call; the active and completed views are plain shared state that a
    /// test mutates between reconcile passes.
    #[derive(Clone, Default)]
    pub(crate) struct TestBackend {
        submit_returns: Arc<Mutex<Vec<Result<JobId, BackendError>>>>,
        cancel_returns: Arc<Mutex<HashMap<i64, Result<(), BackendError>>>>,
        active: Arc<Mutex<Vec<ActiveJob>>>,
        completed: Arc<Mutex<Vec<CompletedJob>>>,
        fail_listings: Arc<Mutex<bool>>,
        available: Arc<Mutex<bool>>,
        submit_calls: Arc<Mutex<u32>>,
    }

    impl TestBackend {
        pub(crate) fn new() -> Self {
            Self {
                available: Arc::new(Mutex::new(true)),
                ..Default::default()
            }
        }

        pub(crate) fn expect_submit_returning(&self, result: Result<JobId, BackendError>) {
            // Popped from the back, so queue in call order.
            self.submit_returns.lock().unwrap().insert(0, result);
        }

        pub(crate) fn expect_cancel_returning(
            &self,
            id: JobId,
            result: Result<(), BackendError>,
        ) {
            self.cancel_returns.lock().unwrap().insert(id.into(), result);
        }

        pub(crate) fn set_active(&self, jobs: Vec<ActiveJob>) {
            *self.active.lock().unwrap() = jobs;
        }

        pub(crate) fn set_completed(&self, jobs: Vec<CompletedJob>) {
            *self.completed.lock().unwrap() = jobs;
        }

        pub(crate) fn set_fail_listings(&self, fail: bool) {
            *self.fail_listings.lock().unwrap() = fail;
        }

        pub(crate) fn set_available(&self, available: bool) {
            *self.available.lock().unwrap() = available;
        }

        pub(crate) fn submit_calls(&self) -> u32 {
            *self.submit_calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl PrintBackend for TestBackend {
        async fn submit(
            &self,
            _file_ref: &Path,
            _options: &PrintOptions,
        ) -> Result<JobId, BackendError> {
            *self.submit_calls.lock().unwrap() += 1;
            self.submit_returns
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Ok(1.into()))
        }

        async fn list_active(&self) -> Result<Vec<ActiveJob>, BackendError> {
            if *self.fail_listings.lock().unwrap() {
                return Err(BackendError::Unavailable("scripted outage".to_owned()));
            }
            Ok(self.active.lock().unwrap().clone())
        }

        async fn list_completed_since(
            &self,
            since: DateTime<Utc>,
        ) -> Result<Vec<CompletedJob>, BackendError> {
            if *self.fail_listings.lock().unwrap() {
                return Err(BackendError::Unavailable("scripted outage".to_owned()));
            }
            Ok(self
                .completed
                .lock()
                .unwrap()
                .iter()
                .filter(|job| job.completed_at >= since)
                .cloned()
                .collect())
        }

        async fn cancel(&self, id: JobId) -> Result<(), BackendError> {
            self.cancel_returns
                .lock()
                .unwrap()
                .remove(&i64::from(id))
                .unwrap_or(Ok(()))
        }

        async fn available(&self) -> bool {
            *self.available.lock().unwrap()
        }
    }

    #[test]
    fn known_vocabulary_is_normalized() {
        assert_eq!(normalize_status("pending"), JobStatus::Pending);
        assert_eq!(normalize_status("Held"), JobStatus::Pending);
        assert_eq!(normalize_status("printing"), JobStatus::Processing);
        assert_eq!(normalize_status(" completed "), JobStatus::Completed);
        assert_eq!(normalize_status("aborted"), JobStatus::Failed);
        assert_eq!(normalize_status("canceled"), JobStatus::Cancelled);
        assert_eq!(normalize_status("cancelled"), JobStatus::Cancelled);
    }

    #[test]
    fn unknown_vocabulary_maps_to_processing() {
        assert_eq!(normalize_status("spooling-v2"), JobStatus::Processing);
        assert_eq!(normalize_status(""), JobStatus::Processing);
        assert_eq!(normalize_status("???"), JobStatus::Processing);
    }
}
