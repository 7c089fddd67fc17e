//! Transfer progress reporting
//!
//! [`TransferProgress`] turns raw work counters into percentage updates. The
//! notification sink (a terminal line, a UI widget) is debounced in time; the
//! log sink only de-duplicates repeated percentages.

use log::info;
use std::fmt;
use std::io::{self, Write};
use std::time::{Duration, Instant};

use crate::constants::{DEFAULT_PROGRESS_DEBOUNCE_MS, JOB_LOG_TARGET};
use crate::models::JobId;

/// What the work counters measure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProgressUnit {
    #[default]
    Bytes,
    Items,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub percentage: u8,
    pub finished: u64,
    pub total: u64,
    pub unit: ProgressUnit,
}

impl fmt::Display for ProgressUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            ProgressUnit::Bytes => write!(
                f,
                "{}% ({} of {})",
                self.percentage,
                format_bytes(self.finished),
                format_bytes(self.total)
            ),
            ProgressUnit::Items => write!(f, "{}% ({}/{} files)", self.percentage, self.finished, self.total),
        }
    }
}

/// Receiver of percentage updates
pub trait ProgressSink: Send {
    fn emit(&mut self, update: &ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: FnMut(&ProgressUpdate) + Send,
{
    fn emit(&mut self, update: &ProgressUpdate) {
        self(update)
    }
}

/// Per-operation progress state. Owned by whoever drives one transfer.
pub struct TransferProgress {
    unit: ProgressUnit,
    min_interval: Duration,
    notify: Box<dyn ProgressSink>,
    log: Option<Box<dyn ProgressSink>>,
    last_notified: Option<(u8, Instant)>,
    last_logged: Option<u8>,
    last_update: Option<ProgressUpdate>,
}

impl TransferProgress {
    pub fn new(notify: impl ProgressSink + 'static) -> Self {
        Self {
            unit: ProgressUnit::default(),
            min_interval: Duration::from_millis(DEFAULT_PROGRESS_DEBOUNCE_MS),
            notify: Box::new(notify),
            log: None,
            last_notified: None,
            last_logged: None,
            last_update: None,
        }
    }

    pub fn with_log_sink(mut self, log: impl ProgressSink + 'static) -> Self {
        self.log = Some(Box::new(log));
        self
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn set_unit(&mut self, unit: ProgressUnit) {
        self.unit = unit;
    }

    pub fn unit(&self) -> ProgressUnit {
        self.unit
    }

    pub fn report(&mut self, finished: u64, total: Option<u64>) {
        self.report_at(finished, total, Instant::now());
    }

    /// Report work done at an explicit instant. Unknown or zero totals produce nothing.
    pub fn report_at(&mut self, finished: u64, total: Option<u64>, now: Instant) {
        let Some(total) = total.filter(|total| *total > 0) else {
            return;
        };

        let update = ProgressUpdate {
            percentage: percentage(finished, total),
            finished,
            total,
            unit: self.unit,
        };
        self.last_update = Some(update);

        if let Some(log) = self.log.as_mut() {
            if self.last_logged != Some(update.percentage) {
                log.emit(&update);
                self.last_logged = Some(update.percentage);
            }
        }

        let due = match self.last_notified {
            None => true,
            Some((last, at)) => {
                last != update.percentage && now.saturating_duration_since(at) >= self.min_interval
            }
        };
        if due {
            self.notify.emit(&update);
            self.last_notified = Some((update.percentage, now));
        }
    }

    /// Flush the final 100% to both sinks regardless of the debounce
    pub fn complete(&mut self) {
        let (finished, total) = match self.last_update {
            Some(update) => (update.total, update.total),
            None => (0, 0),
        };
        let update = ProgressUpdate {
            percentage: 100,
            finished,
            total,
            unit: self.unit,
        };

        if let Some(log) = self.log.as_mut() {
            if self.last_logged != Some(100) {
                log.emit(&update);
                self.last_logged = Some(100);
            }
        }
        if self.last_notified.map(|(last, _)| last) != Some(100) {
            self.notify.emit(&update);
            self.last_notified = Some((100, Instant::now()));
        }
    }

    pub fn last_percentage(&self) -> Option<u8> {
        self.last_update.map(|update| update.percentage)
    }
}

fn percentage(finished: u64, total: u64) -> u8 {
    let pct = (u128::from(finished) * 100) / u128::from(total);
    pct.min(100) as u8
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Single carriage-return progress line on stderr
pub struct ConsoleProgress {
    label: String,
    quiet_mode: bool,
    line_open: bool,
}

impl ConsoleProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            quiet_mode: false,
            line_open: false,
        }
    }

    /// Enable quiet mode (no output)
    pub fn with_quiet_mode(mut self, quiet: bool) -> Self {
        self.quiet_mode = quiet;
        self
    }

    /// Show a status message on its own line
    pub fn show_message(&mut self, message: &str) {
        if self.quiet_mode {
            return;
        }
        self.finish();
        eprintln!("{}", message);
        io::stderr().flush().unwrap_or(());
    }

    /// Terminate the progress line
    pub fn finish(&mut self) {
        if self.line_open {
            eprintln!();
            io::stderr().flush().unwrap_or(());
            self.line_open = false;
        }
    }
}

impl ProgressSink for ConsoleProgress {
    fn emit(&mut self, update: &ProgressUpdate) {
        if self.quiet_mode {
            return;
        }
        eprint!("\r{}: {}", self.label, update);
        io::stderr().flush().unwrap_or(());
        self.line_open = true;
    }
}

impl Drop for ConsoleProgress {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Writes each new percentage to the log facade
pub struct LogProgress {
    job: JobId,
}

impl LogProgress {
    pub fn new(job: JobId) -> Self {
        Self { job }
    }
}

impl ProgressSink for LogProgress {
    fn emit(&mut self, update: &ProgressUpdate) {
        info!(target: JOB_LOG_TARGET, "Job {} progress: {}", self.job, update);
    }
}
