//! Data models module
//!
//! Defines core data structures:
//! - JobId: engine-issued job identifier
//! - JobStatus: status snapshot reported by the transfer executable
//! - PromptMessage: unresolved conflict prompt awaiting a caller decision
//! - JobInfo: read-only snapshot of a job record
//! - JobError / JobAnomaly: hard failures and synthesized terminal anomalies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;


/// Engine-internal job identifier. Distinct from the executable's own job id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Which subcommand a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Copy,
    Remove,
}

impl JobKind {
    pub fn subcommand(self) -> &'static str {
        match self {
            JobKind::Copy => crate::constants::COPY_SUBCOMMAND,
            JobKind::Remove => crate::constants::REMOVE_SUBCOMMAND,
        }
    }
}

/// Whether a status snapshot is intermediate or terminal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusType {
    #[default]
    Progress,
    EndOfJob,
}

/// Job lifecycle state as reported by the transfer executable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    InProgress,
    Cancelling,
    Cancelled,
    Completed,
    CompletedWithSkipped,
    CompletedWithErrors,
    CompletedWithErrorsAndSkipped,
    Failed,
}

impl JobState {
    /// Any of the `Completed*` variants
    pub fn is_completed(self) -> bool {
        matches!(
            self,
            JobState::Completed
                | JobState::CompletedWithSkipped
                | JobState::CompletedWithErrors
                | JobState::CompletedWithErrorsAndSkipped
        )
    }

    /// The job may still make progress
    pub fn is_active(self) -> bool {
        matches!(self, JobState::InProgress | JobState::Cancelling)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A single failed or skipped transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDetail {
    #[serde(rename = "Src", default)]
    pub source: String,
    #[serde(rename = "Dst", default)]
    pub destination: String,
    #[serde(rename = "TransferStatus", default)]
    pub status: String,
    #[serde(rename = "ErrorCode", default, deserialize_with = "lenient::int")]
    pub error_code: i64,
}

/// Status snapshot, replaced wholesale on every `Progress` or `EndOfJob` message.
///
/// Numeric fields arrive as strings on the wire; they are parsed while decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Set by the decoder from the envelope's message type, not from the content
    #[serde(skip_deserializing)]
    pub status_type: StatusType,
    #[serde(rename = "JobStatus")]
    pub state: JobState,
    #[serde(rename = "TotalTransfers", default, deserialize_with = "lenient::uint")]
    pub total_transfers: u64,
    #[serde(rename = "TransfersCompleted", default, deserialize_with = "lenient::uint")]
    pub transfers_completed: u64,
    #[serde(rename = "TransfersFailed", default, deserialize_with = "lenient::uint")]
    pub transfers_failed: u64,
    #[serde(rename = "TransfersSkipped", default, deserialize_with = "lenient::uint")]
    pub transfers_skipped: u64,
    #[serde(rename = "PercentComplete", default, deserialize_with = "lenient::float")]
    pub percent_complete: f64,
    #[serde(rename = "BytesOverWire", default, deserialize_with = "lenient::uint")]
    pub bytes_over_wire: u64,
    #[serde(rename = "TotalBytesTransferred", default, deserialize_with = "lenient::uint")]
    pub total_bytes_transferred: u64,
    #[serde(rename = "TotalBytesEnumerated", default, deserialize_with = "lenient::uint")]
    pub total_bytes_enumerated: u64,
    #[serde(rename = "FailedTransfers", default, deserialize_with = "lenient::list")]
    pub failed_transfers: Vec<TransferDetail>,
    #[serde(rename = "SkippedTransfers", default, deserialize_with = "lenient::list")]
    pub skipped_transfers: Vec<TransferDetail>,
    #[serde(rename = "IsDiskConstrained", default, deserialize_with = "lenient::boolean")]
    pub is_disk_constrained: bool,
    #[serde(rename = "ErrorMsg", default, deserialize_with = "lenient::text")]
    pub error_message: Option<String>,
}

impl JobStatus {
    /// Terminal `Failed` status used when the executable never reported one
    pub fn synthesized_failure() -> Self {
        Self {
            status_type: StatusType::EndOfJob,
            state: JobState::Failed,
            total_transfers: 0,
            transfers_completed: 0,
            transfers_failed: 0,
            transfers_skipped: 0,
            percent_complete: 0.0,
            bytes_over_wire: 0,
            total_bytes_transferred: 0,
            total_bytes_enumerated: 0,
            failed_transfers: Vec::new(),
            skipped_transfers: Vec::new(),
            is_disk_constrained: false,
            error_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status_type == StatusType::EndOfJob
    }

    /// Whether any per-file failures or skips were reported
    pub fn has_transfer_issues(&self) -> bool {
        self.transfers_failed > 0
            || self.transfers_skipped > 0
            || !self.failed_transfers.is_empty()
            || !self.skipped_transfers.is_empty()
    }
}

/// One way of answering a prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseOption {
    #[serde(rename = "ResponseType", default)]
    pub response_type: String,
    #[serde(rename = "UserFriendlyResponseType", default)]
    pub label: String,
    /// Code written back to the executable's stdin
    #[serde(rename = "ResponseString", default)]
    pub response: String,
}

/// A prompt from the executable awaiting a caller decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub message: String,
    pub prompt_type: String,
    pub prompt_target: String,
    pub response_options: Vec<ResponseOption>,
}

impl PromptMessage {
    pub fn is_cancel_prompt(&self) -> bool {
        self.prompt_type == crate::constants::CANCEL_PROMPT_TYPE
    }

    pub fn accepts(&self, response: &str) -> bool {
        self.response_options.iter().any(|option| option.response == response)
    }
}

/// Payload of the `Init` message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitInfo {
    #[serde(rename = "LogFileLocation", default)]
    pub log_file_location: PathBuf,
    #[serde(rename = "JobID", default)]
    pub azcopy_job_id: String,
    #[serde(rename = "IsCleanupJob", default, deserialize_with = "lenient::boolean")]
    pub is_cleanup_job: bool,
}

/// Terminal-state anomalies synthesized at stream close
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobAnomaly {
    /// Cancel was requested but the job did not confirm cancellation
    UnsuccessfulCancel,
    /// The executable exited without reporting a terminal status
    UnexpectedQuit,
    /// The job reported `Cancelled` although no cancel was requested
    UnexpectedCancel,
}

impl JobAnomaly {
    pub fn message(self) -> &'static str {
        match self {
            JobAnomaly::UnsuccessfulCancel => {
                "The transfer process exited before the cancellation completed"
            }
            JobAnomaly::UnexpectedQuit => "The transfer process exited unexpectedly",
            JobAnomaly::UnexpectedCancel => {
                "The transfer was cancelled although no cancellation was requested"
            }
        }
    }
}

impl fmt::Display for JobAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self, self.message())
    }
}

/// Read-only snapshot of a job record. Never contains the process handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: JobId,
    pub kind: JobKind,
    /// Human-readable reconstruction of the invocation (diagnostics only)
    pub command: String,
    pub scanning_started: bool,
    pub canceled: bool,
    pub killed: bool,
    pub azcopy_job_id: Option<String>,
    pub log_file_location: Option<PathBuf>,
    pub latest_status: Option<JobStatus>,
    pub error_message: Option<String>,
    pub anomaly: Option<JobAnomaly>,
    pub prompt_message: Option<PromptMessage>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    /// Set once the output stream closed and the final status was reconciled
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
}

impl JobInfo {
    pub fn new(id: JobId, kind: JobKind, command: String) -> Self {
        Self {
            id,
            kind,
            command,
            scanning_started: false,
            canceled: false,
            killed: false,
            azcopy_job_id: None,
            log_file_location: None,
            latest_status: None,
            error_message: None,
            anomaly: None,
            prompt_message: None,
            last_message_time: None,
            started_at: Utc::now(),
            finished_at: None,
            exit_code: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// The latest status is terminal
    pub fn is_terminal(&self) -> bool {
        self.latest_status.as_ref().is_some_and(JobStatus::is_terminal)
    }

    pub fn state(&self) -> Option<JobState> {
        self.latest_status.as_ref().map(|status| status.state)
    }
}

/// Hard failures signaled synchronously to callers
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Unknown job: {0}")]
    UnknownJob(JobId),
    #[error("Failed to launch transfer executable '{executable}': {source}")]
    SpawnFailure {
        executable: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Job {0} has no pending prompt")]
    NoPendingPrompt(JobId),
    #[error("Response '{response}' is not a valid answer to the pending prompt of job {job}")]
    InvalidPromptResponse { job: JobId, response: String },
    #[error("Job {0} is still running")]
    JobStillRunning(JobId),
    #[error("Input stream of job {0} is closed")]
    InputClosed(JobId),
    #[error("Failed to write to the input stream of job {job}: {source}")]
    InputWrite {
        job: JobId,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// Lenient field decoding: numbers and flags may arrive as strings or as JSON literals
mod lenient {
    use serde::de::{Deserializer, Error};
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(serde_json::Number),
        Bool(bool),
        Text(String),
    }

    fn raw<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Raw>, D::Error> {
        Option::<Raw>::deserialize(deserializer)
    }

    pub fn float<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match raw(deserializer)? {
            None => Ok(0.0),
            Some(Raw::Number(n)) => n.as_f64().ok_or_else(|| D::Error::custom("number out of range")),
            Some(Raw::Bool(b)) => Err(D::Error::custom(format!("expected a number, got {}", b))),
            Some(Raw::Text(s)) if s.trim().is_empty() => Ok(0.0),
            Some(Raw::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| D::Error::custom(format!("invalid number '{}': {}", s, e))),
        }
    }

    pub fn int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match raw(deserializer)? {
            None => Ok(0),
            Some(Raw::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| D::Error::custom("number out of range")),
            Some(Raw::Bool(b)) => Err(D::Error::custom(format!("expected a number, got {}", b))),
            Some(Raw::Text(s)) if s.trim().is_empty() => Ok(0),
            Some(Raw::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map_err(|e| D::Error::custom(format!("invalid integer '{}': {}", s, e))),
        }
    }

    pub fn uint<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let value = int(deserializer)?;
        u64::try_from(value).map_err(|_| D::Error::custom(format!("negative count {}", value)))
    }

    pub fn boolean<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match raw(deserializer)? {
            None => Ok(false),
            Some(Raw::Bool(b)) => Ok(b),
            Some(Raw::Number(n)) => Ok(n.as_i64().unwrap_or(0) != 0),
            Some(Raw::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "" | "false" | "0" => Ok(false),
                "true" | "1" => Ok(true),
                other => Err(D::Error::custom(format!("invalid flag '{}'", other))),
            },
        }
    }

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value.filter(|s| !s.trim().is_empty()))
    }

    pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
    }
}
