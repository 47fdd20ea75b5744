//! The job lifecycle manager.
//!
//! [`JobLifecycle`] is the only component that creates, mutates, or
//! re-submits jobs. It submits documents to the [`PrintBackend`], persists
//! accepted jobs, aligns persisted status with backend-reported status on
//! each reconcile pass, and serves cancel/reprint requests.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::backend::{normalize_status, BackendError, PrintBackend};
use crate::backoff::{BackoffStrategy, Exponential, Strategy};
use crate::job::{Job, JobId, JobStatus, PrintOptions};
use crate::store::{JobStore, StoreError};

pub(crate) mod runner;

/// Delay before the single permitted re-submission after an unavailable
/// backend. One retry only: a second duplicate-print risk is worse than a
/// surfaced error.
const SUBMIT_RETRY_BACKOFF: BackoffStrategy<Exponential> =
    BackoffStrategy::exponential(TimeDelta::seconds(2)).with_max(TimeDelta::seconds(30));

#[derive(Debug, Error)]
pub enum SpoolError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// The job already reached a terminal status. Informational, not a
    /// fault: the caller surfaces the status it carries.
    #[error("job {id} already finished as {status}")]
    AlreadyTerminal { id: JobId, status: JobStatus },
    /// The backing file was removed by retention; the job can no longer be
    /// reprinted.
    #[error("source file for job {0} is no longer available")]
    SourceFileMissing(JobId),
    #[error("no job found with id {0}")]
    NotFound(JobId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Engine health as exposed to the presentation layer.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EngineStatus {
    pub backend_available: bool,
}

/// Orchestrates the lifecycle of print jobs against a backend and a store.
///
/// Cloneable; all clones share the same store handle and backend, so the
/// periodic reconcile task and request handlers can hold their own copies.
#[derive(Clone)]
pub struct JobLifecycle<B: PrintBackend> {
    backend: B,
    store: JobStore,
}

impl<B> JobLifecycle<B>
where
    B: PrintBackend + Send + Sync,
{
    pub fn new(backend: B, store: JobStore) -> Self {
        Self { backend, store }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Submits a document for printing.
    ///
    /// The job record is inserted only after the backend accepted the
    /// submission; a rejected or unreachable backend leaves no trace in the
    /// store. An unavailable backend is retried exactly once after a
    /// backoff delay.
    pub async fn submit(
        &self,
        file_ref: PathBuf,
        original_name: String,
        file_size_bytes: u64,
        options: PrintOptions,
    ) -> Result<Job, SpoolError> {
        let id = match self.backend.submit(&file_ref, &options).await {
            Ok(id) => id,
            Err(BackendError::Unavailable(reason)) => {
                let delay = SUBMIT_RETRY_BACKOFF.backoff(1);
                tracing::warn!(
                    %reason,
                    "Print backend unavailable, retrying submission once in {delay}"
                );
                tokio::time::sleep(delay.to_std().unwrap_or_default()).await;
                self.backend.submit(&file_ref, &options).await?
            }
            Err(err) => return Err(err.into()),
        };

        let job = Job {
            id,
            file_ref,
            original_name,
            file_size_bytes,
            options,
            status: JobStatus::Pending,
            submitted_at: Utc::now(),
            completed_at: None,
        };
        self.store.insert(&job).inspect_err(|err| {
            // The backend re-issued an id we already track, or the store is
            // unwritable. Either way the backend has the job and we lost it.
            tracing::error!(?err, %id, "Failed to record accepted job {id}: {err}");
        })?;
        tracing::debug!(%id, name = %job.original_name, "Submitted print job {id}");
        Ok(job)
    }

    /// Aligns every non-terminal job with the backend's reported state.
    ///
    /// Runs periodically; a backend query failure aborts the pass and is
    /// retried on the next one. Lack of information never fails a job.
    pub async fn reconcile(&self) -> Result<(), SpoolError> {
        let open_jobs = self.store.list_queue()?;
        let Some(oldest) = open_jobs.iter().map(|job| job.submitted_at).min() else {
            return Ok(());
        };

        let active: HashMap<JobId, JobStatus> = self
            .backend
            .list_active()
            .await?
            .into_iter()
            .map(|job| (job.id, normalize_status(&job.raw_status)))
            .collect();
        let completed: HashMap<JobId, (JobStatus, DateTime<Utc>)> = self
            .backend
            .list_completed_since(oldest)
            .await?
            .into_iter()
            .map(|job| (job.id, (normalize_status(&job.raw_status), job.completed_at)))
            .collect();

        let now = Utc::now();
        for job in open_jobs {
            self.observe(&job, &active, &completed, now)?;
        }
        Ok(())
    }

    /// Applies one backend observation to one job.
    fn observe(
        &self,
        job: &Job,
        active: &HashMap<JobId, JobStatus>,
        completed: &HashMap<JobId, (JobStatus, DateTime<Utc>)>,
        now: DateTime<Utc>,
    ) -> Result<(), SpoolError> {
        if let Some(&observed) = active.get(&job.id) {
            if observed == job.status {
                return Ok(());
            }
            let completed_at = observed.is_terminal().then_some(now);
            self.apply(job.id, observed, completed_at)
        } else if let Some(&(outcome, at)) = completed.get(&job.id) {
            self.apply(job.id, final_outcome(outcome), Some(at))
        } else {
            // Gone from the live queue and already purged from the backend's
            // short completed-history window. Fail open: a job that vanished
            // from the queue is assumed to have printed.
            tracing::info!(
                id = %job.id,
                "Job {} no longer reported by the backend; completion inferred, not observed",
                job.id
            );
            self.apply(job.id, JobStatus::Completed, Some(now))
        }
    }

    /// Writes a status change, swallowing the benign races.
    ///
    /// An [`StoreError::InvalidTransition`] means another pass (or a cancel)
    /// got there first; [`StoreError::NotFound`] means the sweeper removed
    /// the row mid-pass. Neither is a fault.
    fn apply(
        &self,
        id: JobId,
        status: JobStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), SpoolError> {
        match self.store.update_status(id, status, completed_at) {
            Ok(()) => {
                tracing::debug!(%id, %status, "Job {id} moved to {status}");
                Ok(())
            }
            Err(StoreError::InvalidTransition { from, to, .. }) => {
                tracing::warn!(%id, %from, %to, "Ignoring stale status observation for job {id}");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(%id, "Job {id} disappeared from the store mid-reconcile");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Cancels a job, returning the status it ended up in.
    ///
    /// When the backend reports the job as no longer cancellable it most
    /// likely just completed; a single-job reconcile pass determines the
    /// real outcome, which is reported instead of an error.
    pub async fn cancel(&self, id: JobId) -> Result<JobStatus, SpoolError> {
        let job = self.store.get(id)?.ok_or(SpoolError::NotFound(id))?;
        if job.status.is_terminal() {
            return Err(SpoolError::AlreadyTerminal {
                id,
                status: job.status,
            });
        }

        match self.backend.cancel(id).await {
            Ok(()) => {
                self.apply(id, JobStatus::Cancelled, Some(Utc::now()))?;
            }
            Err(BackendError::NotCancellable(_)) => {
                tracing::debug!(%id, "Job {id} left the queue before cancel; reconciling it");
                self.reconcile_one(&job).await?;
            }
            Err(err) => return Err(err.into()),
        }
        self.current_status(id)
    }

    /// Submits a brand-new job with the same document and options as `id`.
    ///
    /// Purely additive: the source job record is never touched.
    pub async fn reprint(&self, id: JobId) -> Result<Job, SpoolError> {
        let source = self.store.get(id)?.ok_or(SpoolError::NotFound(id))?;
        let present = tokio::fs::try_exists(&source.file_ref)
            .await
            .unwrap_or(false);
        if !present {
            return Err(SpoolError::SourceFileMissing(id));
        }
        self.submit(
            source.file_ref,
            source.original_name,
            source.file_size_bytes,
            source.options,
        )
        .await
    }

    /// Non-terminal jobs in FIFO display order.
    pub fn queue(&self) -> Result<Vec<Job>, SpoolError> {
        Ok(self.store.list_queue()?)
    }

    /// All jobs from the last `window_days` days, newest first.
    pub fn history(&self, window_days: i64) -> Result<Vec<Job>, SpoolError> {
        let since = Utc::now() - TimeDelta::days(window_days);
        Ok(self.store.list_history(since)?)
    }

    pub async fn status(&self) -> EngineStatus {
        EngineStatus {
            backend_available: self.backend.available().await,
        }
    }

    /// Reconcile pass scoped to a single job.
    async fn reconcile_one(&self, job: &Job) -> Result<(), SpoolError> {
        let active: HashMap<JobId, JobStatus> = self
            .backend
            .list_active()
            .await?
            .into_iter()
            .map(|entry| (entry.id, normalize_status(&entry.raw_status)))
            .collect();
        let completed: HashMap<JobId, (JobStatus, DateTime<Utc>)> = self
            .backend
            .list_completed_since(job.submitted_at)
            .await?
            .into_iter()
            .map(|entry| {
                (
                    entry.id,
                    (normalize_status(&entry.raw_status), entry.completed_at),
                )
            })
            .collect();
        self.observe(job, &active, &completed, Utc::now())
    }

    fn current_status(&self, id: JobId) -> Result<JobStatus, SpoolError> {
        Ok(self
            .store
            .get(id)?
            .ok_or(SpoolError::NotFound(id))?
            .status)
    }
}

/// Folds a normalized completed-history status into a terminal one.
///
/// The completed history only ever describes finished jobs, so non-terminal
/// vocabulary (including drift that normalized to `Processing`) is read as a
/// successful completion.
fn final_outcome(observed: JobStatus) -> JobStatus {
    if observed.is_terminal() {
        observed
    } else {
        JobStatus::Completed
    }
}
