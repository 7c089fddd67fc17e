//! Token refresh cycle for jobs on bearer-token locations

use log::{debug, warn};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::constants::JOB_LOG_TARGET;
use crate::location::TokenRefresher;
use crate::models::JobId;

/// Periodically invokes a [`TokenRefresher`] until stopped or dropped
#[derive(Debug)]
pub struct RefreshCycle {
    handle: JoinHandle<()>,
}

impl RefreshCycle {
    pub fn start(job: JobId, refresher: TokenRefresher, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the token is fresh at start
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let refresher = refresher.clone();
                match tokio::task::spawn_blocking(move || refresher.refresh()).await {
                    Ok(Ok(())) => debug!(target: JOB_LOG_TARGET, "Refreshed access token for job {}", job),
                    Ok(Err(e)) => warn!(target: JOB_LOG_TARGET, "Token refresh failed for job {}: {:#}", job, e),
                    Err(e) => warn!(target: JOB_LOG_TARGET, "Token refresh for job {} did not complete: {}", job, e),
                }
            }
        });

        Self { handle }
    }

    pub fn stop(self) {
        drop(self);
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for RefreshCycle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
