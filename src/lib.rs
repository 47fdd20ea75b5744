//! A print job lifecycle and reconciliation engine.
//!
//! `respool` tracks documents submitted to a shared printer. Jobs are handed
//! to an external, authoritative print subsystem through the
//! [`backend::PrintBackend`] seam; accepted jobs are persisted in a
//! [`store::JobStore`] and periodically reconciled against the subsystem's
//! live queue and short-lived completed history. A retention sweeper removes
//! expired records together with their backing files.
//!
//! # Example
//!
//! ```no_run
//! # use std::path::Path;
//! # use respool::{JobStore, PrintOptions, Respool, SpoolConfig};
//! # use respool::backend::cups::CupsBackend;
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = JobStore::open(Path::new("/var/lib/respool/jobs.db"))?;
//! let engine = Respool::new(CupsBackend::default(), store, SpoolConfig::new());
//! let handle = engine.spawn();
//!
//! let job = handle
//!     .lifecycle()
//!     .submit(
//!         "/var/spool/respool/report.pdf".into(),
//!         "report.pdf".into(),
//!         48_213,
//!         PrintOptions::new(2, true)?,
//!     )
//!     .await?;
//! println!("submitted as {}", job.id);
//!
//! handle.graceful_shutdown().await?;
//! # Ok(())
//! # }
//! ```

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod backend;
pub mod backoff;
pub mod config;
pub mod job;
pub mod lifecycle;
pub mod retention;
pub mod store;

use backend::PrintBackend;
use lifecycle::runner::ReconcileRunner;
use retention::runner::SweeperRunner;
use retention::RetentionSweeper;

pub use config::SpoolConfig;
pub use job::{Job, JobId, JobStatus, PrintOptions};
pub use lifecycle::{EngineStatus, JobLifecycle, SpoolError};
pub use store::JobStore;

/// The assembled engine, ready to be spawned.
pub struct Respool<B: PrintBackend> {
    lifecycle: JobLifecycle<B>,
    config: SpoolConfig,
}

impl<B> Respool<B>
where
    B: PrintBackend + Send + Sync + 'static,
{
    pub fn new(backend: B, store: JobStore, config: SpoolConfig) -> Self {
        Self {
            lifecycle: JobLifecycle::new(backend, store),
            config,
        }
    }

    /// Starts the reconcile and retention background tasks.
    pub fn spawn(self) -> RespoolHandle<B> {
        let cancellation_token = CancellationToken::new();
        let reconciler = ReconcileRunner::new(self.lifecycle.clone(), self.config.poll_interval)
            .spawn(cancellation_token.clone());
        let sweeper = SweeperRunner::new(
            RetentionSweeper::new(self.lifecycle.store().clone(), self.config.retention),
            self.config.sweep_interval,
        )
        .spawn(cancellation_token.clone());

        RespoolHandle {
            lifecycle: self.lifecycle,
            cancellation_token,
            handles: vec![reconciler, sweeper],
        }
    }
}

/// A running engine: serves requests and owns the background tasks.
pub struct RespoolHandle<B: PrintBackend> {
    lifecycle: JobLifecycle<B>,
    cancellation_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl<B> RespoolHandle<B>
where
    B: PrintBackend + Send + Sync + 'static,
{
    /// The request-serving surface: submit, cancel, reprint, and the views.
    pub fn lifecycle(&self) -> &JobLifecycle<B> {
        &self.lifecycle
    }

    /// Stops the background tasks and waits for them to finish.
    pub async fn graceful_shutdown(self) -> Result<(), RespoolError> {
        tracing::debug!("Shutting down respool tasks");
        self.cancellation_token.cancel();
        futures::future::join_all(self.handles)
            .await
            .into_iter()
            .collect::<Result<Vec<()>, _>>()
            .map_err(|_| RespoolError::GracefulShutdownFailed)?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum RespoolError {
    #[error("Failed to gracefully shut down")]
    GracefulShutdownFailed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test::TestBackend;

    #[tokio::test]
    async fn spawn_and_shutdown() {
        let store = JobStore::open_in_memory().unwrap();
        let engine = Respool::new(TestBackend::new(), store, SpoolConfig::new());
        let handle = engine.spawn();
        assert!(handle.lifecycle().queue().unwrap().is_empty());
        handle.graceful_shutdown().await.unwrap();
    }
}
