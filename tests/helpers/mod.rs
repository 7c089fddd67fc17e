//! Fake transfer executable for integration tests
//!
//! Each test writes a small POSIX shell script that prints scripted protocol
//! lines and optionally reads control commands from stdin.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use azjobs::config::EngineConfiguration;
use azjobs::jobs::JobController;
use azjobs::models::{JobId, JobInfo};

/// Script that stands in for the transfer executable
pub struct FakeAzCopy {
    _dir: TempDir,
    path: PathBuf,
}

impl FakeAzCopy {
    /// Create an executable script from a shell body
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("azcopy");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        Self { _dir: dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> EngineConfiguration {
        let mut config = EngineConfiguration::default();
        config.executable.path = self.path.clone();
        config.polling.interval_ms = 50;
        config.polling.cancel_grace_secs = 2;
        config
    }

    pub fn controller(&self) -> JobController {
        JobController::new(self.config()).unwrap()
    }
}

/// Shell snippet that prints one protocol line verbatim
pub fn emit(line: &str) -> String {
    format!("cat <<'AZJOBS_LINE'\n{}\nAZJOBS_LINE\n", line)
}

pub fn init_line(job_id: &str) -> String {
    format!(
        r#"{{"TimeStamp":"2024-05-01T10:00:00Z","MessageType":"Init","MessageContent":"{{\"LogFileLocation\":\"/tmp/azcopy/{id}.log\",\"JobID\":\"{id}\",\"IsCleanupJob\":false}}"}}"#,
        id = job_id
    )
}

pub fn status_line(message_type: &str, state: &str, completed: u64, total: u64) -> String {
    format!(
        r#"{{"MessageType":"{}","MessageContent":"{{\"JobStatus\":\"{}\",\"TotalTransfers\":\"{}\",\"TransfersCompleted\":\"{}\",\"TransfersFailed\":\"0\",\"TransfersSkipped\":\"0\",\"PercentComplete\":\"{}\",\"TotalBytesEnumerated\":\"{}\",\"TotalBytesTransferred\":\"{}\"}}"}}"#,
        message_type,
        state,
        total,
        completed,
        if total == 0 { 0 } else { completed * 100 / total },
        total * 1024,
        completed * 1024
    )
}

pub fn progress_line(state: &str, completed: u64, total: u64) -> String {
    status_line("Progress", state, completed, total)
}

pub fn end_of_job_line(state: &str, completed: u64, total: u64) -> String {
    status_line("EndOfJob", state, completed, total)
}

pub fn prompt_line(prompt_type: &str, target: &str, options: &[(&str, &str)]) -> String {
    let options = options
        .iter()
        .map(|(kind, code)| {
            format!(
                r#"{{"ResponseType":"{}","UserFriendlyResponseType":"{}","ResponseString":"{}"}}"#,
                kind, kind, code
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!(
        r#"{{"MessageType":"Prompt","MessageContent":"{} {}?","PromptDetails":{{"PromptType":"{}","PromptTarget":"{}","ResponseOptions":[{}]}}}}"#,
        prompt_type, target, prompt_type, target, options
    )
}

/// Wait for the record to finish, failing the test after `limit`
pub async fn finish(controller: &JobController, job: JobId, limit: Duration) -> JobInfo {
    tokio::time::timeout(limit, controller.wait_for_completion(job))
        .await
        .expect("job did not finish in time")
        .unwrap()
}

/// Wait until `condition` holds for the job's state
pub async fn wait_until<F>(controller: &JobController, job: JobId, limit: Duration, condition: F) -> JobInfo
where
    F: FnMut(&JobInfo) -> bool,
{
    let mut receiver = controller.subscribe(job).unwrap();
    let wait = async {
        let info = receiver.wait_for(condition).await.unwrap();
        (*info).clone()
    };
    tokio::time::timeout(limit, wait).await.expect("condition not reached in time")
}
