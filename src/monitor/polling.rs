//! Polling driver
//!
//! Drives one job to completion from the caller's side: reads snapshots at a
//! fixed interval, feeds the progress tracker, hands pending prompts to a
//! resolver and turns an interrupt into cancel-then-kill.

use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{ConfigError, EngineConfiguration};
use crate::constants::JOB_LOG_TARGET;
use crate::jobs::JobController;
use crate::models::{JobError, JobId, JobInfo, JobStatus, PromptMessage};
use crate::output::progress::{ProgressUnit, TransferProgress};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingConfiguration {
    pub interval: Duration,
    /// How long a cancel may take before the process is killed
    pub cancel_grace: Duration,
}

impl PollingConfiguration {
    pub fn from_config(config: &EngineConfiguration) -> Self {
        Self {
            interval: config.polling_duration(),
            cancel_grace: config.cancel_grace(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroPeriod("Polling interval"));
        }
        Ok(())
    }
}

impl Default for PollingConfiguration {
    fn default() -> Self {
        Self::from_config(&EngineConfiguration::default())
    }
}

/// Resolves prompts the executable raised (file conflicts and the like)
pub trait PromptHandler: Send {
    /// Response code to write back, or `None` to leave the prompt pending
    fn choose(&mut self, prompt: &PromptMessage) -> Option<String>;
}

impl<F> PromptHandler for F
where
    F: FnMut(&PromptMessage) -> Option<String> + Send,
{
    fn choose(&mut self, prompt: &PromptMessage) -> Option<String> {
        self(prompt)
    }
}

/// Poll until the job reports a terminal status or its record is finished
pub async fn poll_until_complete(
    controller: &JobController,
    job: JobId,
    config: &PollingConfiguration,
    progress: &mut TransferProgress,
    mut prompts: Option<&mut dyn PromptHandler>,
    interrupted: Option<Arc<AtomicBool>>,
) -> Result<JobInfo, JobError> {
    config.validate()?;
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cancel_requested: Option<Instant> = None;
    let mut kill_requested = false;

    loop {
        ticker.tick().await;
        let info = controller.get_job_info(job)?;

        if let Some(status) = &info.latest_status {
            report_status(progress, status);
        }

        if info.is_terminal() || info.is_finished() {
            if info.state().is_some_and(|state| state.is_completed()) {
                progress.complete();
            }
            debug!(target: JOB_LOG_TARGET, "Stopped polling job {}", job);
            return Ok(info);
        }

        if let (Some(prompt), Some(handler)) = (&info.prompt_message, prompts.as_mut()) {
            if let Some(response) = handler.choose(prompt) {
                match controller.respond_to_prompt(job, &response).await {
                    Ok(()) => {}
                    // Resolved in the meantime
                    Err(JobError::NoPendingPrompt(_)) => {}
                    Err(JobError::InvalidPromptResponse { response, .. }) => {
                        warn!(target: JOB_LOG_TARGET, "Ignoring invalid prompt response '{}'", response);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let Some(flag) = interrupted.as_ref() else {
            continue;
        };
        match cancel_requested {
            None if flag.load(Ordering::SeqCst) => {
                info!(target: JOB_LOG_TARGET, "Interrupted; cancelling job {}", job);
                controller.cancel_job(job).await?;
                cancel_requested = Some(Instant::now());
            }
            Some(at) if !kill_requested && at.elapsed() >= config.cancel_grace => {
                warn!(
                    target: JOB_LOG_TARGET,
                    "Job {} still running {}s after cancel; killing it",
                    job,
                    config.cancel_grace.as_secs()
                );
                controller.kill_job(job)?;
                kill_requested = true;
            }
            _ => {}
        }
    }
}

/// Bytes when the executable enumerated them, otherwise transfer counts
fn report_status(progress: &mut TransferProgress, status: &JobStatus) {
    if status.total_bytes_enumerated > 0 {
        progress.set_unit(ProgressUnit::Bytes);
        progress.report(status.total_bytes_transferred, Some(status.total_bytes_enumerated));
    } else if status.total_transfers > 0 {
        progress.set_unit(ProgressUnit::Items);
        progress.report(status.transfers_completed, Some(status.total_transfers));
    }
}
