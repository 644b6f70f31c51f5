use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info};

use crate::orchestrator::Orchestrator;
use crate::repository::RepositoryResult;

/// Periodically fails documents left in `processing` by a crashed or
/// restarted process.
pub struct Sweeper {
    orchestrator: Arc<Orchestrator>,
    stale_after: Duration,
    poll_interval: Duration,
}

impl Sweeper {
    pub fn new(orchestrator: Arc<Orchestrator>, stale_after: Duration, poll_interval: Duration) -> Self {
        Self {
            orchestrator,
            stale_after,
            poll_interval,
        }
    }

    pub async fn run(&self) {
        info!(
            stale_after_secs = self.stale_after.as_secs(),
            interval_secs = self.poll_interval.as_secs(),
            "stale document sweeper started"
        );
        loop {
            if let Err(err) = self.tick().await {
                error!(error = %err, "stale document sweep failed");
            }
            sleep(self.poll_interval).await;
        }
    }

    pub async fn tick(&self) -> RepositoryResult<usize> {
        let swept = self.orchestrator.sweep_stale(self.stale_after).await?;
        if swept > 0 {
            info!(swept, "failed stale processing documents");
        }
        Ok(swept)
    }
}
