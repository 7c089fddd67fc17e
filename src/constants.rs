//! Global constants for azjobs
//!
//! Centralized location for application-wide constants

/// Application subsystem identifier, used as the macOS Unified Logging subsystem
pub const APP_SUBSYSTEM: &str = "com.microsoft.azjobs";

/// Log target for job lifecycle events
pub const JOB_LOG_TARGET: &str = "azjobs::job";

/// Log target for per-transfer failure and skip details
pub const TRANSFER_LOG_TARGET: &str = "azjobs::transfer";

/// Default transfer executable, resolved through PATH
pub const DEFAULT_EXECUTABLE: &str = "azcopy";

/// Subcommand used for copy jobs
pub const COPY_SUBCOMMAND: &str = "copy";

/// Subcommand used for delete jobs
pub const REMOVE_SUBCOMMAND: &str = "remove";

/// Flags present on every invocation so the executable speaks the JSON protocol
pub const OUTPUT_TYPE_FLAG: &str = "--output-type=json";
pub const CANCEL_FROM_STDIN_FLAG: &str = "--cancel-from-stdin";

/// Control command written to the executable's stdin to request cancellation
pub const CANCEL_COMMAND: &str = "cancel";

/// Response code that confirms a "Cancel" prompt
pub const CONFIRM_RESPONSE: &str = "y";

/// Prompt type emitted when a cancel lands before enumeration finished
pub const CANCEL_PROMPT_TYPE: &str = "Cancel";

/// Environment variables the transfer executable reads
pub const ENV_CRED_TYPE: &str = "AZCOPY_CRED_TYPE";
pub const ENV_OAUTH_TOKEN_INFO: &str = "AZCOPY_OAUTH_TOKEN_INFO";
pub const ENV_LOG_LOCATION: &str = "AZCOPY_LOG_LOCATION";
pub const ENV_JOB_PLAN_LOCATION: &str = "AZCOPY_JOB_PLAN_LOCATION";
pub const ENV_CONCURRENCY: &str = "AZCOPY_CONCURRENCY_VALUE";
pub const ENV_USER_AGENT_PREFIX: &str = "AZCOPY_USER_AGENT_PREFIX";

/// Credential type announced when a bearer token is forwarded
pub const CRED_TYPE_OAUTH: &str = "OAuthToken";

/// Host-runtime variables that would make the executable misbehave if inherited
pub const DEFAULT_STRIPPED_ENV: &[&str] = &["ELECTRON_RUN_AS_NODE", "ELECTRON_NO_ATTACH_CONSOLE"];

/// Minimum interval between UI progress notifications
pub const DEFAULT_PROGRESS_DEBOUNCE_MS: u64 = 200;

/// Polling interval bounds in milliseconds.
/// Note: must match the bounds reported by ConfigError::InvalidPollingInterval
pub const POLLING_INTERVAL_MIN_MS: u64 = 50;
pub const POLLING_INTERVAL_MAX_MS: u64 = 60_000;
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 500;

pub const PROGRESS_DEBOUNCE_MAX_MS: u64 = 10_000;

pub const CANCEL_GRACE_MIN_SECS: u64 = 1;
pub const CANCEL_GRACE_MAX_SECS: u64 = 3_600;
pub const DEFAULT_CANCEL_GRACE_SECS: u64 = 30;

pub const DEFAULT_RETAIN_FINISHED_SECS: u64 = 3_600;

pub const TOKEN_REFRESH_MIN_SECS: u64 = 10;
pub const TOKEN_REFRESH_MAX_SECS: u64 = 86_400;
pub const DEFAULT_TOKEN_REFRESH_SECS: u64 = 300;

/// Config directory and file name under the platform config dir
pub const CONFIG_DIR_NAME: &str = "azjobs";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Event identifiers for structured job logging
pub const EVENT_JOB_STARTED: &str = "job_started";
pub const EVENT_JOB_FINISHED: &str = "job_finished";
pub const EVENT_JOB_CANCELED: &str = "job_canceled";
pub const EVENT_JOB_KILLED: &str = "job_killed";
pub const EVENT_TRANSFER_FAILED: &str = "transfer_failed";
pub const EVENT_TRANSFER_SKIPPED: &str = "transfer_skipped";
pub const EVENT_PROTOCOL_ANOMALY: &str = "protocol_anomaly";
