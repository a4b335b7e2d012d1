//! Daemon Core - wiring and lifecycle of the refresh subsystem
//!
//! The daemon is the long-running process that:
//! - Runs the refresh worker pool with the course service as handler
//! - Restores enabled schedules from storage into the scheduler on start
//! - Shuts down scheduler first, then drains the queue

mod context;

pub use context::Daemon;
