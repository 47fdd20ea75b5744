use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::RetentionSweeper;

/// Periodic driver of [`RetentionSweeper::sweep`].
pub(crate) struct SweeperRunner {
    sweeper: RetentionSweeper,
    interval: Duration,
}

impl SweeperRunner {
    pub fn new(sweeper: RetentionSweeper, interval: Duration) -> Self {
        Self { sweeper, interval }
    }

    pub fn spawn(self, cancellation_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {
                        if let Err(err) = self.sweeper.sweep(Utc::now()).await {
                            tracing::error!(?err, "Retention sweep failed: {err}");
                        }
                    }
                    _ = cancellation_token.cancelled() => {
                        tracing::debug!("Shutting down the retention sweeper");
                        break;
                    },
                }
            }
        })
    }
}
