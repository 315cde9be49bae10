use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Runs a task on a fixed period until cancelled.
///
/// The first run happens immediately. Runs never overlap: a slow run delays
/// the next tick and ticks missed meanwhile are skipped.
pub struct IntervalScheduler {
    period: Duration,
    shutdown_token: CancellationToken,
}

impl IntervalScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub async fn run<F, Fut>(self, mut task: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(period_secs = self.period.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    tracing::info!("Scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    task().await;
                }
            }
        }
    }
}
