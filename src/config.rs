//! Engine configuration
//!
//! TOML-backed settings for the transfer executable, the polling driver and
//! job record retention. Every section is optional; missing keys fall back to
//! the defaults in [`crate::constants`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfiguration {
    pub executable: ExecutableSettings,
    pub polling: PollingSettings,
    pub jobs: JobSettings,
}

/// How the transfer executable is launched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutableSettings {
    /// Executable path, or a bare name resolved through PATH
    pub path: PathBuf,
    /// Inherited variables removed from the child environment
    pub strip_env: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_location: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_plan_location: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent_prefix: Option<String>,
}

impl Default for ExecutableSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_EXECUTABLE),
            strip_env: DEFAULT_STRIPPED_ENV.iter().map(|name| name.to_string()).collect(),
            log_location: None,
            job_plan_location: None,
            concurrency: None,
            user_agent_prefix: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollingSettings {
    pub interval_ms: u64,
    pub progress_debounce_ms: u64,
    /// Seconds to wait after an interrupt-triggered cancel before killing
    pub cancel_grace_secs: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLLING_INTERVAL_MS,
            progress_debounce_ms: DEFAULT_PROGRESS_DEBOUNCE_MS,
            cancel_grace_secs: DEFAULT_CANCEL_GRACE_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobSettings {
    pub retain_finished_secs: u64,
    pub token_refresh_secs: u64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            retain_finished_secs: DEFAULT_RETAIN_FINISHED_SECS,
            token_refresh_secs: DEFAULT_TOKEN_REFRESH_SECS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Polling interval must be between {min} and {max} ms, got {value}")]
    InvalidPollingInterval { value: u64, min: u64, max: u64 },
    #[error("Progress debounce must be at most {max} ms, got {value}")]
    InvalidDebounce { value: u64, max: u64 },
    #[error("Cancel grace period must be between {min} and {max} seconds, got {value}")]
    InvalidCancelGrace { value: u64, min: u64, max: u64 },
    #[error("Token refresh period must be between {min} and {max} seconds, got {value}")]
    InvalidTokenRefresh { value: u64, min: u64, max: u64 },
    #[error("{0} must be greater than zero")]
    ZeroPeriod(&'static str),
    #[error("Concurrency must be greater than zero")]
    InvalidConcurrency,
    #[error("Executable path must not be empty")]
    EmptyExecutable,
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl EngineConfiguration {
    /// Load and validate a configuration file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the default location if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()));
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::load_from_file(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display())),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let polling = &self.polling;
        if !(POLLING_INTERVAL_MIN_MS..=POLLING_INTERVAL_MAX_MS).contains(&polling.interval_ms) {
            return Err(ConfigError::InvalidPollingInterval {
                value: polling.interval_ms,
                min: POLLING_INTERVAL_MIN_MS,
                max: POLLING_INTERVAL_MAX_MS,
            });
        }
        if polling.progress_debounce_ms > PROGRESS_DEBOUNCE_MAX_MS {
            return Err(ConfigError::InvalidDebounce {
                value: polling.progress_debounce_ms,
                max: PROGRESS_DEBOUNCE_MAX_MS,
            });
        }
        if !(CANCEL_GRACE_MIN_SECS..=CANCEL_GRACE_MAX_SECS).contains(&polling.cancel_grace_secs) {
            return Err(ConfigError::InvalidCancelGrace {
                value: polling.cancel_grace_secs,
                min: CANCEL_GRACE_MIN_SECS,
                max: CANCEL_GRACE_MAX_SECS,
            });
        }
        if !(TOKEN_REFRESH_MIN_SECS..=TOKEN_REFRESH_MAX_SECS).contains(&self.jobs.token_refresh_secs) {
            return Err(ConfigError::InvalidTokenRefresh {
                value: self.jobs.token_refresh_secs,
                min: TOKEN_REFRESH_MIN_SECS,
                max: TOKEN_REFRESH_MAX_SECS,
            });
        }
        if self.executable.concurrency == Some(0) {
            return Err(ConfigError::InvalidConcurrency);
        }
        if self.executable.path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyExecutable);
        }
        Ok(())
    }

    /// Reject the periods a timer cannot run with. Bounds checks live in `validate`.
    pub fn check_periods(&self) -> Result<(), ConfigError> {
        if self.polling.interval_ms == 0 {
            return Err(ConfigError::ZeroPeriod("Polling interval"));
        }
        if self.jobs.token_refresh_secs == 0 {
            return Err(ConfigError::ZeroPeriod("Token refresh period"));
        }
        Ok(())
    }

    pub fn polling_duration(&self) -> Duration {
        Duration::from_millis(self.polling.interval_ms)
    }

    pub fn debounce_duration(&self) -> Duration {
        Duration::from_millis(self.polling.progress_debounce_ms)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_secs(self.polling.cancel_grace_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.jobs.retain_finished_secs)
    }

    pub fn token_refresh_period(&self) -> Duration {
        Duration::from_secs(self.jobs.token_refresh_secs)
    }

    /// Variables added to every job's environment
    pub fn environment(&self) -> Vec<(String, String)> {
        let exe = &self.executable;
        let mut env = Vec::new();
        if let Some(path) = &exe.log_location {
            env.push((ENV_LOG_LOCATION.to_string(), path.display().to_string()));
        }
        if let Some(path) = &exe.job_plan_location {
            env.push((ENV_JOB_PLAN_LOCATION.to_string(), path.display().to_string()));
        }
        if let Some(concurrency) = exe.concurrency {
            env.push((ENV_CONCURRENCY.to_string(), concurrency.to_string()));
        }
        if let Some(prefix) = &exe.user_agent_prefix {
            env.push((ENV_USER_AGENT_PREFIX.to_string(), prefix.clone()));
        }
        env
    }
}

/// `<config_dir>/azjobs/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfiguration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.executable.path, PathBuf::from("azcopy"));
        assert_eq!(config.polling_duration(), Duration::from_millis(500));
        assert_eq!(config.debounce_duration(), Duration::from_millis(200));
        assert!(config.environment().is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config(
            r#"
[polling]
interval_ms = 1000

[executable]
path = "/opt/azcopy/azcopy"
concurrency = 8
"#,
        );

        let config = EngineConfiguration::load_from_file(file.path()).unwrap();
        assert_eq!(config.polling.interval_ms, 1000);
        assert_eq!(config.polling.progress_debounce_ms, DEFAULT_PROGRESS_DEBOUNCE_MS);
        assert_eq!(config.jobs, JobSettings::default());
        assert_eq!(config.executable.path, PathBuf::from("/opt/azcopy/azcopy"));
        assert_eq!(config.executable.strip_env.len(), DEFAULT_STRIPPED_ENV.len());
        assert_eq!(
            config.environment(),
            vec![(ENV_CONCURRENCY.to_string(), "8".to_string())]
        );
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let file = write_config("[polling]\ninterval = 5\n");
        let result = EngineConfiguration::load_from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let file = write_config("[polling]\ninterval_ms = 10\n");
        let result = EngineConfiguration::load_from_file(file.path());
        assert!(matches!(
            result,
            Err(ConfigError::InvalidPollingInterval { value: 10, .. })
        ));

        let mut config = EngineConfiguration::default();
        config.jobs.token_refresh_secs = 1;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTokenRefresh { .. })));

        let mut config = EngineConfiguration::default();
        config.executable.concurrency = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidConcurrency)));
    }

    #[test]
    fn test_zero_periods_are_rejected() {
        let mut config = EngineConfiguration::default();
        assert!(config.check_periods().is_ok());

        config.jobs.token_refresh_secs = 0;
        assert!(matches!(config.check_periods(), Err(ConfigError::ZeroPeriod("Token refresh period"))));

        config.jobs.token_refresh_secs = DEFAULT_TOKEN_REFRESH_SECS;
        config.polling.interval_ms = 0;
        let err = config.check_periods().unwrap_err();
        assert_eq!(err.to_string(), "Polling interval must be greater than zero");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(EngineConfiguration::load_or_default(Some(&missing)).is_err());
    }

    #[test]
    fn test_environment_lists_configured_locations() {
        let mut config = EngineConfiguration::default();
        config.executable.log_location = Some(PathBuf::from("/var/log/azjobs"));
        config.executable.user_agent_prefix = Some("azjobs/1.0".to_string());

        let env = config.environment();
        assert!(env.contains(&(ENV_LOG_LOCATION.to_string(), "/var/log/azjobs".to_string())));
        assert!(env.contains(&(ENV_USER_AGENT_PREFIX.to_string(), "azjobs/1.0".to_string())));
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = EngineConfiguration::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: EngineConfiguration = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
