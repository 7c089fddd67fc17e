//! Outcome presentation
//!
//! Classifies a finished job and renders it for humans or as JSON. Completed
//! jobs with failed or skipped transfers are a partial success, not an error;
//! the per-file detail lives in the log.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use crate::models::{JobInfo, JobState};

pub mod progress;

/// Final classification of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded,
    PartialSuccess { failed: u64, skipped: u64 },
    Cancelled,
    Killed,
    Failed { message: String },
    /// No terminal status yet
    Unfinished,
}

const UNEXPLAINED_FAILURE: &str = "The transfer failed without reporting a reason";

impl JobOutcome {
    pub fn from_info(info: &JobInfo) -> Self {
        if info.killed {
            return JobOutcome::Killed;
        }

        let Some(status) = info.latest_status.as_ref().filter(|status| status.is_terminal()) else {
            return JobOutcome::Unfinished;
        };

        let failure = || JobOutcome::Failed {
            message: info
                .error_message
                .clone()
                .or_else(|| status.error_message.clone())
                .unwrap_or_else(|| UNEXPLAINED_FAILURE.to_string()),
        };

        match status.state {
            state if state.is_completed() => {
                if status.has_transfer_issues() {
                    JobOutcome::PartialSuccess {
                        failed: status.transfers_failed.max(status.failed_transfers.len() as u64),
                        skipped: status.transfers_skipped.max(status.skipped_transfers.len() as u64),
                    }
                } else {
                    JobOutcome::Succeeded
                }
            }
            JobState::Cancelled if info.canceled => JobOutcome::Cancelled,
            _ => failure(),
        }
    }

    /// Success or partial success
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded | JobOutcome::PartialSuccess { .. })
    }
}

/// Human-readable summary of a finished job
pub fn format_human(info: &JobInfo) -> String {
    let outcome = JobOutcome::from_info(info);
    let mut lines = Vec::new();

    let headline = match &outcome {
        JobOutcome::Succeeded => "✓ Transfer completed".to_string(),
        JobOutcome::PartialSuccess { failed, skipped } => format!(
            "⚠ Transfer completed with {} failed and {} skipped transfers",
            failed, skipped
        ),
        JobOutcome::Cancelled => "Transfer cancelled".to_string(),
        JobOutcome::Killed => "Transfer process was terminated".to_string(),
        JobOutcome::Failed { message } => format!("✗ Transfer failed: {}", message),
        JobOutcome::Unfinished => "Transfer has not finished".to_string(),
    };
    lines.push(headline);

    if let Some(status) = &info.latest_status {
        lines.push(format!(
            "  Transfers: {} completed, {} failed, {} skipped of {}",
            status.transfers_completed, status.transfers_failed, status.transfers_skipped, status.total_transfers
        ));
        if status.total_bytes_transferred > 0 {
            lines.push(format!("  Bytes transferred: {}", status.total_bytes_transferred));
        }
    }
    if let Some(job_id) = &info.azcopy_job_id {
        lines.push(format!("  AzCopy job: {}", job_id));
    }
    if let Some(log_file) = &info.log_file_location {
        lines.push(format!("  Log file: {}", log_file.display()));
    }
    if let (Some(finished_at), JobOutcome::Succeeded | JobOutcome::PartialSuccess { .. }) =
        (info.finished_at, &outcome)
    {
        let elapsed = finished_at - info.started_at;
        let secs = elapsed.num_milliseconds() as f64 / 1000.0;
        if secs < 1.0 {
            lines.push(format!("  Duration: {}ms", elapsed.num_milliseconds()));
        } else {
            lines.push(format!("  Duration: {:.2}s", secs));
        }
    }

    lines.join("\n")
}

/// JSON document describing a finished job
pub fn format_json(info: &JobInfo) -> Result<String> {
    let document = json!({
        "job_id": info.id.to_string(),
        "kind": info.kind,
        "result": JobOutcome::from_info(info),
        "azcopy_job_id": info.azcopy_job_id,
        "log_file": info.log_file_location,
        "status": info.latest_status,
        "error": info.error_message,
        "anomaly": info.anomaly,
        "exit_code": info.exit_code,
        "started_at": info.started_at.to_rfc3339(),
        "finished_at": info.finished_at.map(|t| t.to_rfc3339()),
    });
    Ok(serde_json::to_string_pretty(&document)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobAnomaly, JobId, JobKind, JobStatus, StatusType, TransferDetail};

    fn finished(state: JobState) -> JobInfo {
        let mut info = JobInfo::new(JobId::new(), JobKind::Copy, "azcopy copy a b".to_string());
        let mut status = JobStatus::synthesized_failure();
        status.state = state;
        status.status_type = StatusType::EndOfJob;
        status.total_transfers = 3;
        status.transfers_completed = 3;
        info.latest_status = Some(status);
        info.finished_at = Some(chrono::Utc::now());
        info
    }

    #[test]
    fn test_completed_is_success() {
        let info = finished(JobState::Completed);
        assert_eq!(JobOutcome::from_info(&info), JobOutcome::Succeeded);
        assert!(format_human(&info).contains("Transfer completed"));
    }

    #[test]
    fn test_completed_with_issues_is_partial_success() {
        let mut info = finished(JobState::CompletedWithErrorsAndSkipped);
        let status = info.latest_status.as_mut().unwrap();
        status.transfers_failed = 1;
        status.skipped_transfers = vec![
            TransferDetail {
                source: "a".to_string(),
                destination: "b".to_string(),
                status: "Skipped".to_string(),
                error_code: 0,
            };
            2
        ];

        let outcome = JobOutcome::from_info(&info);
        assert_eq!(outcome, JobOutcome::PartialSuccess { failed: 1, skipped: 2 });
        assert!(outcome.is_success());
    }

    #[test]
    fn test_failure_carries_recorded_message() {
        let mut info = finished(JobState::Failed);
        info.error_message = Some(JobAnomaly::UnexpectedQuit.message().to_string());
        info.anomaly = Some(JobAnomaly::UnexpectedQuit);

        match JobOutcome::from_info(&info) {
            JobOutcome::Failed { message } => assert_eq!(message, JobAnomaly::UnexpectedQuit.message()),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(!JobOutcome::from_info(&info).is_success());
    }

    #[test]
    fn test_cancel_classification() {
        let mut info = finished(JobState::Cancelled);
        info.canceled = true;
        assert_eq!(JobOutcome::from_info(&info), JobOutcome::Cancelled);

        let mut unexpected = finished(JobState::Cancelled);
        unexpected.error_message = Some(JobAnomaly::UnexpectedCancel.message().to_string());
        assert!(matches!(JobOutcome::from_info(&unexpected), JobOutcome::Failed { .. }));
    }

    #[test]
    fn test_kill_and_running_jobs() {
        let mut info = finished(JobState::InProgress);
        info.killed = true;
        assert_eq!(JobOutcome::from_info(&info), JobOutcome::Killed);

        let running = JobInfo::new(JobId::new(), JobKind::Remove, String::new());
        assert_eq!(JobOutcome::from_info(&running), JobOutcome::Unfinished);
    }

    #[test]
    fn test_json_document_shape() {
        let info = finished(JobState::Completed);
        let text = format_json(&info).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["result"]["outcome"], "succeeded");
        assert_eq!(value["kind"], "copy");
        assert_eq!(value["status"]["JobStatus"], "Completed");
        assert_eq!(value["job_id"], info.id.to_string());
    }
}
