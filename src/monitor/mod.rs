//! Caller-side job monitoring

pub mod polling;

pub use polling::{poll_until_complete, PollingConfiguration, PromptHandler};
