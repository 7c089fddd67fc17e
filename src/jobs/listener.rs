//! Per-job output listener
//!
//! The single consumer of a job's stdout. Owns the process handle, applies
//! each decoded message to the record in emission order, writes replies back
//! through the record's input, and reconciles the record once the stream
//! closes.

use chrono::Utc;
use log::{debug, warn};
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::mpsc::UnboundedReceiver;

use super::refresh::RefreshCycle;
use super::state::{apply_message, reconcile_stream_close};
use super::store::JobRecord;
use crate::constants::JOB_LOG_TARGET;
use crate::logging::JobLogger;
use crate::protocol::{decode_line, decode_oversized, AzCopyMessage, Decoded, Frame, LineFramer};

const READ_CHUNK: usize = 8 * 1024;

pub(crate) async fn run(
    record: Arc<JobRecord>,
    mut child: Child,
    mut kill_rx: UnboundedReceiver<()>,
    refresh: Option<RefreshCycle>,
    logger: JobLogger,
) {
    let job = record.id;

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_stderr(stderr, record.clone(), logger.clone()));
    }

    let mut kill_open = true;
    let mut framer = LineFramer::new();

    if let Some(mut stdout) = child.stdout.take() {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            tokio::select! {
                read = stdout.read(&mut buf) => match read {
                    Ok(0) => break,
                    Ok(n) => {
                        for frame in framer.push(&buf[..n]) {
                            handle_frame(&record, &logger, frame).await;
                        }
                    }
                    Err(e) => {
                        warn!(target: JOB_LOG_TARGET, "Reading output of job {} failed: {}", job, e);
                        break;
                    }
                },
                request = kill_rx.recv(), if kill_open => match request {
                    Some(()) => kill(&mut child, &record),
                    None => kill_open = false,
                },
            }
        }
    }

    if let Some(frame) = framer.finish() {
        handle_frame(&record, &logger, frame).await;
    }

    if let Some(cycle) = refresh {
        cycle.stop();
    }
    record.input.close().await;
    record.update(reconcile_stream_close);
    debug!(target: JOB_LOG_TARGET, "Output stream of job {} closed", job);

    let exit = loop {
        tokio::select! {
            status = child.wait() => break status,
            request = kill_rx.recv(), if kill_open => match request {
                Some(()) => kill(&mut child, &record),
                None => kill_open = false,
            },
        }
    };

    let exit_code = match exit {
        Ok(status) => exit_code(status),
        Err(e) => {
            warn!(target: JOB_LOG_TARGET, "Failed to reap process of job {}: {}", job, e);
            None
        }
    };

    record.update(|info| {
        info.exit_code = exit_code;
        info.finished_at = Some(Utc::now());
    });
    logger.log_job_finished(&record.snapshot());
}

async fn handle_frame(record: &JobRecord, logger: &JobLogger, frame: Frame) {
    match frame {
        Frame::Line(line) => {
            let decoded = decode_line(&line);
            handle_decoded(record, logger, decoded, &line).await;
        }
        Frame::Oversized { length, limit } => {
            handle_decoded(record, logger, decode_oversized(length, limit), "").await;
        }
    }
}

async fn handle_decoded(record: &JobRecord, logger: &JobLogger, decoded: Decoded, line: &str) {
    if let Some(anomaly) = &decoded.anomaly {
        logger.log_protocol_anomaly(record.id, anomaly, line);
    }
    if let AzCopyMessage::EndOfJob(status) = &decoded.message {
        logger.log_transfer_details(record.id, status);
    }

    let received = decoded.timestamp.unwrap_or_else(Utc::now);
    let mut reply = None;
    record.update(|info| reply = apply_message(info, decoded.message, received));

    if let Some(command) = reply {
        if let Err(e) = record.input.send(&command).await {
            warn!(target: JOB_LOG_TARGET, "Failed to answer prompt: {}", e);
        }
    }
}

fn kill(child: &mut Child, record: &JobRecord) {
    if let Err(e) = child.start_kill() {
        // Already exited; the stream close will follow
        debug!(target: JOB_LOG_TARGET, "Kill of job {} not delivered: {}", record.id, e);
    }
}

async fn forward_stderr(stderr: ChildStderr, record: Arc<JobRecord>, logger: JobLogger) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => logger.log_stderr(record.id, &line),
            Ok(None) => break,
            Err(e) => {
                debug!(target: JOB_LOG_TARGET, "Stopped reading stderr of job {}: {}", record.id, e);
                break;
            }
        }
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|signal| 128 + signal))
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> Option<i32> {
    status.code()
}
