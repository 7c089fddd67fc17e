//! azjobs - AzCopy job engine
//!
//! Launches the AzCopy executable, decodes its line-delimited JSON output
//! into a per-job state record, and exposes polling, cancellation, kill and
//! prompt resolution on top of it.

pub mod config;
pub mod constants;
pub mod jobs;
pub mod location;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod output;
pub mod protocol;
