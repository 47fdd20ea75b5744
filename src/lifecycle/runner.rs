use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::PrintBackend;

use super::JobLifecycle;

/// Periodic driver of [`JobLifecycle::reconcile`].
pub(crate) struct ReconcileRunner<B: PrintBackend> {
    lifecycle: JobLifecycle<B>,
    interval: Duration,
}

impl<B> ReconcileRunner<B>
where
    B: PrintBackend + Send + Sync + 'static,
{
    pub fn new(lifecycle: JobLifecycle<B>, interval: Duration) -> Self {
        Self {
            lifecycle,
            interval,
        }
    }

    pub fn spawn(self, cancellation_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {
                        if let Err(err) = self.lifecycle.reconcile().await {
                            // Retried on the next pass; never fails a job.
                            tracing::warn!(?err, "Reconcile pass failed: {err}");
                        }
                    }
                    _ = cancellation_token.cancelled() => {
                        tracing::debug!("Shutting down the reconciler");
                        break;
                    },
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Utc;

    use super::*;
    use crate::backend::test::TestBackend;
    use crate::backend::CompletedJob;
    use crate::job::{JobStatus, PrintOptions};
    use crate::store::JobStore;

    #[tokio::test(start_paused = true)]
    async fn runner_reconciles_on_its_interval() {
        let backend = TestBackend::new();
        let store = JobStore::open_in_memory().unwrap();
        let lifecycle = JobLifecycle::new(backend.clone(), store.clone());

        backend.expect_submit_returning(Ok(3.into()));
        lifecycle
            .submit(
                PathBuf::from("/tmp/f.pdf"),
                "f.pdf".to_owned(),
                1,
                PrintOptions::default(),
            )
            .await
            .unwrap();
        backend.set_completed(vec![CompletedJob {
            id: 3.into(),
            raw_status: "completed".to_owned(),
            completed_at: Utc::now(),
        }]);

        let token = CancellationToken::new();
        let handle = ReconcileRunner::new(lifecycle, Duration::from_secs(5)).spawn(token.clone());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(
            store.get(3.into()).unwrap().unwrap().status,
            JobStatus::Completed
        );

        token.cancel();
        handle.await.unwrap();
    }
}
