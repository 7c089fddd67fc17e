//! Job record store
//!
//! Maps engine job ids to their records. The map lock is held only for
//! insert/lookup/removal; all per-job state lives behind the record's own
//! snapshot channel, so unrelated jobs never contend.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::{mpsc, watch, Mutex};

use crate::models::{JobError, JobId, JobInfo};
use crate::protocol::ControlCommand;

/// Serialized writer for a job's stdin. One writer at a time, so a cancel
/// and an auto-confirmed prompt never interleave bytes.
#[derive(Debug)]
pub struct JobInput {
    job: JobId,
    stdin: Mutex<Option<ChildStdin>>,
}

impl JobInput {
    pub fn new(job: JobId, stdin: Option<ChildStdin>) -> Self {
        Self {
            job,
            stdin: Mutex::new(stdin),
        }
    }

    pub async fn send(&self, command: &ControlCommand) -> Result<(), JobError> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(JobError::InputClosed(self.job))?;

        let line = command.to_line();
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;

        if let Err(source) = written {
            // A broken pipe will not heal; stop trying
            *guard = None;
            return Err(JobError::InputWrite { job: self.job, source });
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.stdin.lock().await.take();
    }
}

/// Live record of one job. Owned by the store; the process handle itself is
/// owned by the job's listener task and reached through `kill`.
#[derive(Debug)]
pub struct JobRecord {
    pub id: JobId,
    state: watch::Sender<JobInfo>,
    pub input: JobInput,
    kill: mpsc::UnboundedSender<()>,
}

impl JobRecord {
    pub fn new(info: JobInfo, stdin: Option<ChildStdin>) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (kill, kill_rx) = mpsc::unbounded_channel();
        let id = info.id;
        let (state, _) = watch::channel(info);
        let record = Self {
            id,
            state,
            input: JobInput::new(id, stdin),
            kill,
        };
        (record, kill_rx)
    }

    /// Copy of the current state; never a reference into the live record
    pub fn snapshot(&self) -> JobInfo {
        self.state.borrow().clone()
    }

    /// Read without copying the snapshot
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.state.borrow().finished_at
    }

    pub fn update<F: FnOnce(&mut JobInfo)>(&self, mutate: F) {
        self.state.send_modify(mutate);
    }

    pub fn subscribe(&self) -> watch::Receiver<JobInfo> {
        self.state.subscribe()
    }

    /// Ask the listener to terminate the process. Fails only if the listener is gone.
    pub fn request_kill(&self) -> bool {
        self.kill.send(()).is_ok()
    }
}

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Arc<JobRecord>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: Arc<JobRecord>) {
        self.jobs.write().insert(record.id, record);
    }

    pub fn get(&self, id: JobId) -> Result<Arc<JobRecord>, JobError> {
        self.jobs.read().get(&id).cloned().ok_or(JobError::UnknownJob(id))
    }

    /// Remove a finished record and return its final snapshot
    pub fn release(&self, id: JobId) -> Result<JobInfo, JobError> {
        let mut jobs = self.jobs.write();
        let record = jobs.get(&id).ok_or(JobError::UnknownJob(id))?;
        let info = record.snapshot();
        if !info.is_finished() {
            return Err(JobError::JobStillRunning(id));
        }
        jobs.remove(&id);
        Ok(info)
    }

    /// Drop records that finished more than `older_than` ago
    pub fn evict_finished(&self, older_than: Duration) -> usize {
        let Ok(window) = chrono::Duration::from_std(older_than) else {
            return 0;
        };
        let cutoff = Utc::now() - window;

        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, record| match record.finished_at() {
            Some(finished_at) => finished_at > cutoff,
            None => true,
        });
        before - jobs.len()
    }

    pub fn ids(&self) -> Vec<JobId> {
        self.jobs.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobKind;

    fn record(finished_secs_ago: Option<i64>) -> Arc<JobRecord> {
        let mut info = JobInfo::new(JobId::new(), JobKind::Copy, "azcopy copy a b".to_string());
        info.finished_at = finished_secs_ago.map(|secs| Utc::now() - chrono::Duration::seconds(secs));
        let (record, _kill_rx) = JobRecord::new(info, None);
        Arc::new(record)
    }

    #[test]
    fn test_lookup_of_unknown_job_fails() {
        let store = JobStore::new();
        let id = JobId::new();
        assert!(matches!(store.get(id), Err(JobError::UnknownJob(missing)) if missing == id));
    }

    #[test]
    fn test_snapshots_are_detached_copies() {
        let store = JobStore::new();
        let record = record(None);
        store.insert(record.clone());

        let before = store.get(record.id).unwrap().snapshot();
        record.update(|info| info.scanning_started = true);

        assert!(!before.scanning_started);
        assert!(record.snapshot().scanning_started);
    }

    #[test]
    fn test_release_requires_a_finished_job() {
        let store = JobStore::new();
        let running = record(None);
        let finished = record(Some(0));
        store.insert(running.clone());
        store.insert(finished.clone());

        assert!(matches!(store.release(running.id), Err(JobError::JobStillRunning(_))));
        assert!(store.release(finished.id).unwrap().is_finished());
        assert!(matches!(store.get(finished.id), Err(JobError::UnknownJob(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_eviction_keeps_running_and_recent_jobs() {
        let store = JobStore::new();
        let running = record(None);
        let recent = record(Some(5));
        let stale = record(Some(7_200));
        for r in [&running, &recent, &stale] {
            store.insert((*r).clone());
        }

        assert_eq!(store.evict_finished(Duration::from_secs(3_600)), 1);
        let ids = store.ids();
        assert!(ids.contains(&running.id));
        assert!(ids.contains(&recent.id));
        assert!(!ids.contains(&stale.id));
    }

    #[test]
    fn test_finished_at_tracks_updates() {
        let record = record(None);
        assert_eq!(record.finished_at(), None);

        let now = Utc::now();
        record.update(|info| info.finished_at = Some(now));
        assert_eq!(record.finished_at(), Some(now));
    }

    #[tokio::test]
    async fn test_input_without_stdin_is_closed() {
        let input = JobInput::new(JobId::new(), None);
        let result = input.send(&ControlCommand::Cancel).await;
        assert!(matches!(result, Err(JobError::InputClosed(_))));
    }

    #[test]
    fn test_kill_request_reaches_listener_channel() {
        let info = JobInfo::new(JobId::new(), JobKind::Remove, String::new());
        let (record, mut kill_rx) = JobRecord::new(info, None);

        assert!(record.request_kill());
        assert!(kill_rx.try_recv().is_ok());

        drop(kill_rx);
        assert!(!record.request_kill());
    }
}
