//! Structured logging for job lifecycle events
//!
//! Events are emitted through the `log` facade as `"<summary> | <json>"` so
//! any installed backend (ULS on macOS, env_logger elsewhere) receives both a
//! readable line and machine-parsable detail. Per-file failures and skips of
//! finished jobs go to the `azjobs::transfer` target.

use anyhow::Result;
use log::{debug, error, info, warn, LevelFilter};
use serde_json::json;

use crate::constants::{
    EVENT_JOB_CANCELED, EVENT_JOB_FINISHED, EVENT_JOB_KILLED, EVENT_JOB_STARTED, EVENT_PROTOCOL_ANOMALY,
    EVENT_TRANSFER_FAILED, EVENT_TRANSFER_SKIPPED, JOB_LOG_TARGET, TRANSFER_LOG_TARGET,
};
use crate::models::{JobId, JobInfo, JobStatus};
use crate::protocol::DecodeAnomaly;

/// Log levels for job events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

/// Emits one structured event per job lifecycle transition
#[derive(Debug, Clone)]
pub struct JobLogger {
    /// Most verbose level that is still emitted
    level: LogLevel,
}

impl Default for JobLogger {
    fn default() -> Self {
        Self::new(LogLevel::Debug)
    }
}

impl JobLogger {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    pub fn log_job_started(&self, job: &JobInfo, pid: Option<u32>) {
        let data = json!({
            "event": EVENT_JOB_STARTED,
            "job_id": job.id.to_string(),
            "kind": job.kind,
            "pid": pid,
            "command": job.command,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        self.log_structured(JOB_LOG_TARGET, LogLevel::Info, &format!("Job {} started", job.id), &data);
    }

    pub fn log_job_canceled(&self, job: JobId) {
        let data = json!({
            "event": EVENT_JOB_CANCELED,
            "job_id": job.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        self.log_structured(JOB_LOG_TARGET, LogLevel::Info, &format!("Cancel requested for job {}", job), &data);
    }

    pub fn log_job_killed(&self, job: JobId) {
        let data = json!({
            "event": EVENT_JOB_KILLED,
            "job_id": job.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        self.log_structured(JOB_LOG_TARGET, LogLevel::Warn, &format!("Killing job {}", job), &data);
    }

    pub fn log_job_finished(&self, job: &JobInfo) {
        let status = job.latest_status.as_ref();
        let data = json!({
            "event": EVENT_JOB_FINISHED,
            "job_id": job.id.to_string(),
            "azcopy_job_id": job.azcopy_job_id,
            "state": status.map(|s| s.state.to_string()),
            "transfers_completed": status.map(|s| s.transfers_completed),
            "transfers_failed": status.map(|s| s.transfers_failed),
            "transfers_skipped": status.map(|s| s.transfers_skipped),
            "canceled": job.canceled,
            "killed": job.killed,
            "anomaly": job.anomaly,
            "error": job.error_message,
            "exit_code": job.exit_code,
            "log_file": job.log_file_location,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let level = match (&job.error_message, status) {
            (Some(_), _) => LogLevel::Error,
            (None, Some(s)) if s.has_transfer_issues() => LogLevel::Warn,
            _ => LogLevel::Info,
        };
        self.log_structured(JOB_LOG_TARGET, level, &format!("Job {} finished", job.id), &data);
    }

    /// One event per failed and per skipped transfer
    pub fn log_transfer_details(&self, job: JobId, status: &JobStatus) {
        for (event, level, transfers) in [
            (EVENT_TRANSFER_FAILED, LogLevel::Warn, &status.failed_transfers),
            (EVENT_TRANSFER_SKIPPED, LogLevel::Info, &status.skipped_transfers),
        ] {
            for transfer in transfers {
                let data = json!({
                    "event": event,
                    "job_id": job.to_string(),
                    "source": transfer.source,
                    "destination": transfer.destination,
                    "status": transfer.status,
                    "error_code": transfer.error_code,
                });
                let summary = format!("{} -> {} ({})", transfer.source, transfer.destination, transfer.status);
                self.log_structured(TRANSFER_LOG_TARGET, level, &summary, &data);
            }
        }
    }

    pub fn log_protocol_anomaly(&self, job: JobId, anomaly: &DecodeAnomaly, line: &str) {
        let data = json!({
            "event": EVENT_PROTOCOL_ANOMALY,
            "job_id": job.to_string(),
            "reason": anomaly.to_string(),
            "line": line,
        });

        self.log_structured(JOB_LOG_TARGET, LogLevel::Warn, "Unexpected output from transfer process", &data);
    }

    /// Forward a line the executable wrote to stderr
    pub fn log_stderr(&self, job: JobId, line: &str) {
        if self.should_log(LogLevel::Warn) {
            warn!(target: JOB_LOG_TARGET, "[{}] {}", job, line);
        }
    }

    fn log_structured(&self, target: &str, level: LogLevel, message: &str, data: &serde_json::Value) {
        if !self.should_log(level) {
            return;
        }

        let full_message = format!("{} | {}", message, data);

        match level {
            LogLevel::Error => error!(target: target, "{}", full_message),
            LogLevel::Warn => warn!(target: target, "{}", full_message),
            LogLevel::Info => info!(target: target, "{}", full_message),
            LogLevel::Debug => debug!(target: target, "{}", full_message),
        }
    }

    fn should_log(&self, level: LogLevel) -> bool {
        level <= self.level
    }
}

/// Install the process-wide log backend
pub fn init_logger(level: LevelFilter) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        let logger = oslog::OsLogger::new(crate::constants::APP_SUBSYSTEM);
        log::set_boxed_logger(Box::new(logger))
            .map_err(|e| anyhow::anyhow!("Failed to set logger: {}", e))?;
        log::set_max_level(level);
    }

    #[cfg(not(target_os = "macos"))]
    {
        env_logger::Builder::new()
            .filter_level(level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to set logger: {}", e))?;
    }

    Ok(())
}
