//! Job controller
//!
//! Launches the transfer executable for copy and delete operations, keeps a
//! record per job, and exposes polling, push observation, cancellation,
//! kill and prompt resolution keyed by the engine's own [`JobId`].
//!
//! Each job gets one listener task that owns the process handle and is the
//! only writer of the job's state. Callers only ever see snapshot copies.

mod listener;
pub mod refresh;
pub mod state;
pub mod store;

use log::{debug, warn};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::watch;

use crate::config::{ConfigError, EngineConfiguration};
use crate::constants::JOB_LOG_TARGET;
use crate::location::{CommandLine, CopyOptions, DeleteOptions, LocationDescriptor, ShellFlavor};
use crate::logging::JobLogger;
use crate::models::{JobError, JobId, JobInfo, JobKind};
use crate::protocol::ControlCommand;

use refresh::RefreshCycle;
use store::{JobRecord, JobStore};

pub struct JobController {
    config: EngineConfiguration,
    store: JobStore,
    logger: JobLogger,
}

impl JobController {
    /// Fails if a period in `config` is zero; the full bounds check is
    /// [`EngineConfiguration::validate`], which file loading already runs.
    pub fn new(config: EngineConfiguration) -> Result<Self, ConfigError> {
        config.check_periods()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: EngineConfiguration) -> Self {
        Self {
            config,
            store: JobStore::new(),
            logger: JobLogger::default(),
        }
    }

    pub fn with_logger(mut self, logger: JobLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &EngineConfiguration {
        &self.config
    }

    /// The invocation `start_copy` would launch
    pub fn copy_command(
        &self,
        source: &LocationDescriptor,
        destination: &LocationDescriptor,
        options: &CopyOptions,
    ) -> CommandLine {
        CommandLine::copy(self.program(), source, destination, options)
    }

    /// The invocation `start_delete` would launch
    pub fn delete_command(&self, target: &LocationDescriptor, options: &DeleteOptions) -> CommandLine {
        CommandLine::remove(self.program(), target, options)
    }

    /// Launch a copy job and return immediately. Must be called within a Tokio runtime.
    pub fn start_copy(
        &self,
        source: &LocationDescriptor,
        destination: &LocationDescriptor,
        options: &CopyOptions,
    ) -> Result<JobId, JobError> {
        let command = self.copy_command(source, destination, options);
        let refresher = [source, destination]
            .iter()
            .find_map(|location| location.oauth())
            .and_then(|(oauth, _)| oauth.refresher.clone());
        self.launch(JobKind::Copy, command, refresher)
    }

    /// Launch a delete job and return immediately. Must be called within a Tokio runtime.
    pub fn start_delete(&self, target: &LocationDescriptor, options: &DeleteOptions) -> Result<JobId, JobError> {
        let command = self.delete_command(target, options);
        let refresher = target.oauth().and_then(|(oauth, _)| oauth.refresher.clone());
        self.launch(JobKind::Remove, command, refresher)
    }

    fn launch(
        &self,
        kind: JobKind,
        command: CommandLine,
        refresher: Option<crate::location::TokenRefresher>,
    ) -> Result<JobId, JobError> {
        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for name in &self.config.executable.strip_env {
            process.env_remove(name);
        }
        process.envs(self.config.environment());
        process.envs(command.env.iter().cloned());

        let mut child = process.spawn().map_err(|source| JobError::SpawnFailure {
            executable: command.program.clone(),
            source,
        })?;

        let id = JobId::new();
        let info = JobInfo::new(id, kind, command.display(ShellFlavor::native(), true));
        let (record, kill_rx) = JobRecord::new(info, child.stdin.take());
        let record = Arc::new(record);

        let evicted = self.store.evict_finished(self.config.retention());
        if evicted > 0 {
            debug!(target: JOB_LOG_TARGET, "Evicted {} finished job records", evicted);
        }
        self.store.insert(record.clone());

        let cycle = refresher.map(|refresher| RefreshCycle::start(id, refresher, self.config.token_refresh_period()));

        self.logger.log_job_started(&record.snapshot(), child.id());
        tokio::spawn(listener::run(record, child, kill_rx, cycle, self.logger.clone()));

        Ok(id)
    }

    /// Snapshot copy of the job's public state
    pub fn get_job_info(&self, job: JobId) -> Result<JobInfo, JobError> {
        Ok(self.store.get(job)?.snapshot())
    }

    /// Request graceful cancellation. Completion is observed through the final status.
    pub async fn cancel_job(&self, job: JobId) -> Result<(), JobError> {
        let record = self.store.get(job)?;
        if record.snapshot().is_finished() {
            return Ok(());
        }

        record.update(|info| info.canceled = true);
        self.logger.log_job_canceled(job);

        if let Err(e) = record.input.send(&ControlCommand::Cancel).await {
            // The process is already going away; stream close reconciles the cancel
            warn!(target: JOB_LOG_TARGET, "Cancel request for job {} not delivered: {}", job, e);
        }
        Ok(())
    }

    /// Forcibly terminate the process.
    ///
    /// Once the job has a terminal status (reported, or reconciled at stream
    /// close) the process is still terminated but the record keeps that status.
    pub fn kill_job(&self, job: JobId) -> Result<(), JobError> {
        let record = self.store.get(job)?;
        let info = record.snapshot();
        if info.is_finished() {
            return Ok(());
        }

        if info.is_terminal() {
            debug!(target: JOB_LOG_TARGET, "Job {} already reported its final status; reaping the process", job);
        } else {
            record.update(|info| info.killed = true);
            self.logger.log_job_killed(job);
        }
        if !record.request_kill() {
            debug!(target: JOB_LOG_TARGET, "Listener of job {} already exited", job);
        }
        Ok(())
    }

    /// Answer the job's pending prompt with one of its response codes
    pub async fn respond_to_prompt(&self, job: JobId, response: &str) -> Result<(), JobError> {
        let record = self.store.get(job)?;
        let prompt = record.snapshot().prompt_message.ok_or(JobError::NoPendingPrompt(job))?;
        if !prompt.accepts(response) {
            return Err(JobError::InvalidPromptResponse {
                job,
                response: response.to_string(),
            });
        }

        record.input.send(&ControlCommand::Respond(response.to_string())).await?;
        record.update(|info| {
            if info.prompt_message.as_ref() == Some(&prompt) {
                info.prompt_message = None;
            }
        });
        Ok(())
    }

    /// Receiver that observes every state change of the job
    pub fn subscribe(&self, job: JobId) -> Result<watch::Receiver<JobInfo>, JobError> {
        Ok(self.store.get(job)?.subscribe())
    }

    /// Resolve with the final snapshot once the listener reconciled the job and reaped the process
    pub async fn wait_for_completion(&self, job: JobId) -> Result<JobInfo, JobError> {
        let record = self.store.get(job)?;
        let mut receiver = record.subscribe();
        let result = receiver.wait_for(JobInfo::is_finished).await.map(|info| (*info).clone());
        match result {
            Ok(info) => Ok(info),
            // The sender lives in the record we hold, so this only happens on teardown
            Err(_) => Ok(record.snapshot()),
        }
    }

    /// Drop a finished job's record, returning its final snapshot
    pub fn release_job(&self, job: JobId) -> Result<JobInfo, JobError> {
        self.store.release(job)
    }

    pub fn evict_finished(&self, older_than: Duration) -> usize {
        self.store.evict_finished(older_than)
    }

    pub fn list_jobs(&self) -> Vec<JobId> {
        self.store.ids()
    }

    fn program(&self) -> String {
        self.config.executable.path.display().to_string()
    }
}

impl Default for JobController {
    fn default() -> Self {
        Self::with_config(EngineConfiguration::default())
    }
}
