//! Job record state machine
//!
//! Pure transitions applied to a [`JobInfo`] under the record's write lock:
//! one per decoded message, and a final reconciliation when the output
//! stream closes.

use chrono::{DateTime, Utc};

use crate::models::{JobAnomaly, JobInfo, JobState, JobStatus, StatusType};
use crate::protocol::{AzCopyMessage, ControlCommand};

/// Apply one message. Returns a command the listener must write back, if any.
pub fn apply_message(info: &mut JobInfo, message: AzCopyMessage, now: DateTime<Utc>) -> Option<ControlCommand> {
    info.last_message_time = Some(match info.last_message_time {
        Some(previous) if previous > now => previous,
        _ => now,
    });

    match message {
        AzCopyMessage::Info(_) => None,
        AzCopyMessage::Init(init) => {
            info.scanning_started = true;
            if !init.log_file_location.as_os_str().is_empty() {
                info.log_file_location = Some(init.log_file_location);
            }
            if !init.azcopy_job_id.is_empty() {
                info.azcopy_job_id = Some(init.azcopy_job_id);
            }
            None
        }
        AzCopyMessage::Progress(status) | AzCopyMessage::EndOfJob(status) => {
            if status.is_terminal() {
                info.prompt_message = None;
            }
            info.latest_status = Some(status);
            None
        }
        AzCopyMessage::Prompt(prompt) => {
            // Cancelling during enumeration asks for confirmation because the
            // job cannot be resumed; the request already came from the caller.
            if prompt.is_cancel_prompt() {
                Some(ControlCommand::confirm())
            } else {
                info.prompt_message = Some(prompt);
                None
            }
        }
        AzCopyMessage::Error(text) => {
            info.error_message = Some(text);
            None
        }
        AzCopyMessage::Unrecognized { message_type, content } => {
            info.error_message = Some(if content.is_empty() {
                format!("Unrecognized '{}' message from the transfer process", message_type)
            } else {
                content
            });
            None
        }
    }
}

/// Reconcile the final status once the output stream has closed.
///
/// The executable may exit without ever sending `EndOfJob`; this decides
/// what the job's terminal status is from the flags and the last snapshot.
pub fn reconcile_stream_close(info: &mut JobInfo) {
    if info.killed {
        return;
    }

    if info.latest_status.is_none() {
        let mut status = JobStatus::synthesized_failure();
        let anomaly = if info.canceled {
            JobAnomaly::UnsuccessfulCancel
        } else {
            JobAnomaly::UnexpectedQuit
        };
        status.error_message = Some(anomaly.message().to_string());
        info.latest_status = Some(status);
        record_anomaly(info, anomaly);
        return;
    }
    let Some(status) = info.latest_status.as_mut() else {
        return;
    };

    // No more output will arrive, whatever was last reported is final
    status.status_type = StatusType::EndOfJob;

    let anomaly = match (info.canceled, status.state) {
        (true, JobState::InProgress | JobState::Cancelling | JobState::Failed) => {
            status.state = JobState::Failed;
            Some(JobAnomaly::UnsuccessfulCancel)
        }
        (false, JobState::InProgress | JobState::Cancelling) => {
            status.state = JobState::Failed;
            Some(JobAnomaly::UnexpectedQuit)
        }
        (false, JobState::Cancelled) => Some(JobAnomaly::UnexpectedCancel),
        (false, JobState::Failed) => {
            if !status.has_transfer_issues() && info.error_message.is_none() {
                info.error_message = Some(
                    status
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "The transfer failed without reporting a reason".to_string()),
                );
            }
            None
        }
        // Cancelled after a cancel request, or any Completed* state (a job can
        // finish before the cancel lands)
        _ => None,
    };

    if let Some(anomaly) = anomaly {
        record_anomaly(info, anomaly);
    }
}

fn record_anomaly(info: &mut JobInfo, anomaly: JobAnomaly) {
    info.anomaly = Some(anomaly);
    if info.error_message.is_none() {
        info.error_message = Some(anomaly.to_string());
    }
    info.prompt_message = None;
}
