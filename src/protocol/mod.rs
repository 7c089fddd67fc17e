//! Wire protocol spoken with the transfer executable
//!
//! Output: one JSON envelope per line carrying `MessageType`,
//! `MessageContent` (often itself a JSON-encoded string), `TimeStamp` and,
//! for prompts, `PromptDetails`. Decoding never fails: anything that does
//! not fit is surfaced as [`AzCopyMessage::Unrecognized`] together with the
//! [`DecodeAnomaly`] that explains why.
//!
//! Input: plaintext line commands (see [`ControlCommand`]).

pub mod framer;

pub use framer::{Frame, LineFramer};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::constants::{CANCEL_COMMAND, CONFIRM_RESPONSE};
use crate::models::{InitInfo, JobStatus, PromptMessage, ResponseOption, StatusType};

/// A decoded message from the executable
#[derive(Debug, Clone, PartialEq)]
pub enum AzCopyMessage {
    Info(String),
    Init(InitInfo),
    Progress(JobStatus),
    Prompt(PromptMessage),
    EndOfJob(JobStatus),
    Error(String),
    /// Best-effort record for lines that did not decode into a known shape
    Unrecognized { message_type: String, content: String },
}

impl AzCopyMessage {
    pub fn kind(&self) -> &str {
        match self {
            AzCopyMessage::Info(_) => "Info",
            AzCopyMessage::Init(_) => "Init",
            AzCopyMessage::Progress(_) => "Progress",
            AzCopyMessage::Prompt(_) => "Prompt",
            AzCopyMessage::EndOfJob(_) => "EndOfJob",
            AzCopyMessage::Error(_) => "Error",
            AzCopyMessage::Unrecognized { message_type, .. } => message_type,
        }
    }
}

/// Why a line was surfaced as [`AzCopyMessage::Unrecognized`]. Logged, never returned as an error.
#[derive(Debug, thiserror::Error)]
pub enum DecodeAnomaly {
    #[error("line is not a JSON message envelope: {source}")]
    NotJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("{message_type} content does not match its schema: {source}")]
    InvalidContent {
        message_type: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unrecognized message type '{0}'")]
    UnknownType(String),
    #[error("line of {length} bytes exceeds the {limit} byte limit and was discarded")]
    LineTooLong { length: usize, limit: usize },
}

/// Result of decoding one line
#[derive(Debug)]
pub struct Decoded {
    pub message: AzCopyMessage,
    pub timestamp: Option<DateTime<Utc>>,
    pub anomaly: Option<DecodeAnomaly>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "MessageType", default)]
    message_type: String,
    #[serde(rename = "MessageContent", default)]
    message_content: Value,
    #[serde(rename = "TimeStamp", default)]
    timestamp: Option<String>,
    #[serde(rename = "PromptDetails", default)]
    prompt_details: Option<PromptDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct PromptDetails {
    #[serde(rename = "PromptType", default)]
    prompt_type: String,
    #[serde(rename = "PromptTarget", default)]
    prompt_target: String,
    #[serde(rename = "ResponseOptions", default)]
    response_options: Option<Vec<ResponseOption>>,
}

/// Stand-in for a line the framer discarded
pub fn decode_oversized(length: usize, limit: usize) -> Decoded {
    let anomaly = DecodeAnomaly::LineTooLong { length, limit };
    Decoded {
        message: AzCopyMessage::Unrecognized {
            message_type: String::new(),
            content: format!("Output {}", anomaly),
        },
        timestamp: None,
        anomaly: Some(anomaly),
    }
}

/// Decode a single framed line
pub fn decode_line(line: &str) -> Decoded {
    let envelope: Envelope = match serde_json::from_str(line.trim()) {
        Ok(envelope) => envelope,
        Err(source) => {
            return Decoded {
                message: AzCopyMessage::Unrecognized {
                    message_type: String::new(),
                    content: line.trim().to_string(),
                },
                timestamp: None,
                anomaly: Some(DecodeAnomaly::NotJson { source }),
            };
        }
    };

    let timestamp = envelope
        .timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc));

    let content = unwrap_content(envelope.message_content);
    let (message, anomaly) = decode_content(envelope.message_type, content, envelope.prompt_details);

    Decoded {
        message,
        timestamp,
        anomaly,
    }
}

/// Second-stage decode: a string that holds structured JSON is replaced by
/// that JSON, anything else stays an opaque string.
fn unwrap_content(content: Value) -> Value {
    match content {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(inner @ (Value::Object(_) | Value::Array(_))) => inner,
            _ => Value::String(text),
        },
        other => other,
    }
}

fn content_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn decode_content(
    message_type: String,
    content: Value,
    prompt_details: Option<PromptDetails>,
) -> (AzCopyMessage, Option<DecodeAnomaly>) {
    let decoded = match message_type.as_str() {
        "Info" => Ok(AzCopyMessage::Info(content_text(&content))),
        "Error" => Ok(AzCopyMessage::Error(content_text(&content))),
        "Init" => serde_json::from_value::<InitInfo>(content.clone()).map(AzCopyMessage::Init),
        "Progress" | "EndOfJob" => serde_json::from_value::<JobStatus>(content.clone()).map(|mut status| {
            if message_type == "EndOfJob" {
                status.status_type = StatusType::EndOfJob;
                AzCopyMessage::EndOfJob(status)
            } else {
                status.status_type = StatusType::Progress;
                AzCopyMessage::Progress(status)
            }
        }),
        "Prompt" => {
            let details = prompt_details.unwrap_or_default();
            Ok(AzCopyMessage::Prompt(PromptMessage {
                message: content_text(&content),
                prompt_type: details.prompt_type,
                prompt_target: details.prompt_target,
                response_options: details.response_options.unwrap_or_default(),
            }))
        }
        _ => {
            let anomaly = DecodeAnomaly::UnknownType(message_type.clone());
            return (
                AzCopyMessage::Unrecognized {
                    message_type,
                    content: content_text(&content),
                },
                Some(anomaly),
            );
        }
    };

    match decoded {
        Ok(message) => (message, None),
        Err(source) => (
            AzCopyMessage::Unrecognized {
                content: content_text(&content),
                message_type: message_type.clone(),
            },
            Some(DecodeAnomaly::InvalidContent { message_type, source }),
        ),
    }
}

/// Plaintext commands written to the executable's stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Request graceful cancellation
    Cancel,
    /// Answer a pending prompt with one of its response codes
    Respond(String),
}

impl ControlCommand {
    /// Confirmation of a "Cancel" prompt
    pub fn confirm() -> Self {
        ControlCommand::Respond(CONFIRM_RESPONSE.to_string())
    }

    /// Newline-terminated wire form
    pub fn to_line(&self) -> String {
        match self {
            ControlCommand::Cancel => format!("{}\n", CANCEL_COMMAND),
            ControlCommand::Respond(code) => format!("{}\n", code.trim()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobState;

    #[test]
    fn test_oversized_line_is_surfaced_as_unrecognized() {
        let decoded = decode_oversized(40, 16);

        assert!(matches!(
            decoded.anomaly,
            Some(DecodeAnomaly::LineTooLong { length: 40, limit: 16 })
        ));
        let AzCopyMessage::Unrecognized { content, .. } = decoded.message else {
            panic!("expected an unrecognized message");
        };
        assert_eq!(content, "Output line of 40 bytes exceeds the 16 byte limit and was discarded");
    }

    #[test]
    fn test_info_plain_text() {
        let decoded = decode_line(r#"{"TimeStamp":"2024-05-01T10:00:00Z","MessageType":"Info","MessageContent":"Scanning..."}"#);

        assert_eq!(decoded.message, AzCopyMessage::Info("Scanning...".to_string()));
        assert!(decoded.anomaly.is_none());
        assert!(decoded.timestamp.is_some());
    }

    #[test]
    fn test_init_content_encoded_as_string() {
        let line = r#"{"MessageType":"Init","MessageContent":"{\"LogFileLocation\":\"/tmp/azcopy/abc.log\",\"JobID\":\"abc\",\"IsCleanupJob\":false}"}"#;
        let decoded = decode_line(line);

        match decoded.message {
            AzCopyMessage::Init(init) => {
                assert_eq!(init.azcopy_job_id, "abc");
                assert_eq!(init.log_file_location, std::path::PathBuf::from("/tmp/azcopy/abc.log"));
                assert!(!init.is_cleanup_job);
            }
            other => panic!("expected Init, got {:?}", other),
        }
    }

    #[test]
    fn test_progress_and_end_of_job_are_tagged() {
        let progress = decode_line(
            r#"{"MessageType":"Progress","MessageContent":"{\"JobStatus\":\"InProgress\",\"TotalTransfers\":\"4\",\"TransfersCompleted\":\"1\"}"}"#,
        );
        match progress.message {
            AzCopyMessage::Progress(status) => {
                assert_eq!(status.status_type, StatusType::Progress);
                assert_eq!(status.transfers_completed, 1);
            }
            other => panic!("expected Progress, got {:?}", other),
        }

        let end = decode_line(
            r#"{"MessageType":"EndOfJob","MessageContent":{"JobStatus":"Completed","TotalTransfers":"4","TransfersCompleted":"4"}}"#,
        );
        match end.message {
            AzCopyMessage::EndOfJob(status) => {
                assert_eq!(status.status_type, StatusType::EndOfJob);
                assert_eq!(status.state, JobState::Completed);
                assert_eq!(status.total_transfers, 4);
            }
            other => panic!("expected EndOfJob, got {:?}", other),
        }
    }

    #[test]
    fn test_prompt_details() {
        let line = r#"{"MessageType":"Prompt","MessageContent":"Overwrite /data/a.txt?","PromptDetails":{"PromptType":"Overwrite","PromptTarget":"/data/a.txt","ResponseOptions":[{"ResponseType":"Yes","UserFriendlyResponseType":"Yes","ResponseString":"y"},{"ResponseType":"YesForAll","UserFriendlyResponseType":"Yes for all","ResponseString":"a"}]}}"#;

        match decode_line(line).message {
            AzCopyMessage::Prompt(prompt) => {
                assert_eq!(prompt.prompt_type, "Overwrite");
                assert_eq!(prompt.prompt_target, "/data/a.txt");
                assert_eq!(prompt.message, "Overwrite /data/a.txt?");
                assert!(prompt.accepts("a"));
                assert!(!prompt.is_cancel_prompt());
            }
            other => panic!("expected Prompt, got {:?}", other),
        }
    }

    #[test]
    fn test_content_that_is_not_json_stays_a_string() {
        let decoded = decode_line(r#"{"MessageType":"Error","MessageContent":"{broken json"}"#);
        assert_eq!(decoded.message, AzCopyMessage::Error("{broken json".to_string()));
        assert!(decoded.anomaly.is_none());
    }

    #[test]
    fn test_non_json_line_is_surfaced_not_dropped() {
        let decoded = decode_line("panic: runtime error");

        assert!(matches!(decoded.anomaly, Some(DecodeAnomaly::NotJson { .. })));
        match decoded.message {
            AzCopyMessage::Unrecognized { message_type, content } => {
                assert!(message_type.is_empty());
                assert_eq!(content, "panic: runtime error");
            }
            other => panic!("expected Unrecognized, got {:?}", other),
        }
    }

    #[test]
    fn test_progress_with_bad_content_is_surfaced() {
        let decoded = decode_line(r#"{"MessageType":"Progress","MessageContent":"not a status"}"#);

        assert!(matches!(decoded.anomaly, Some(DecodeAnomaly::InvalidContent { .. })));
        assert_eq!(decoded.message.kind(), "Progress");
        assert!(matches!(decoded.message, AzCopyMessage::Unrecognized { .. }));
    }

    #[test]
    fn test_unknown_message_type() {
        let decoded = decode_line(r#"{"MessageType":"Dryrun","MessageContent":"DRYRUN: copy a to b"}"#);

        assert!(matches!(decoded.anomaly, Some(DecodeAnomaly::UnknownType(ref t)) if t == "Dryrun"));
        assert_eq!(decoded.message.kind(), "Dryrun");
    }

    #[test]
    fn test_control_command_wire_form() {
        assert_eq!(ControlCommand::Cancel.to_line(), "cancel\n");
        assert_eq!(ControlCommand::confirm().to_line(), "y\n");
        assert_eq!(ControlCommand::Respond(" a ".to_string()).to_line(), "a\n");
    }
}
