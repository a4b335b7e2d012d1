//! Refresh queue - bounded, deduplicating worker pool
//!
//! This module provides:
//! - RefreshJob: one unit of refresh work, optionally carrying a result channel
//! - RefreshQueue: admission with per-key dedup, a fixed set of workers, status
//! - JobHandler: the seam workers call into for each admitted job

mod job;
mod refresh_queue;

pub use job::{JobResult, RefreshJob};
pub use refresh_queue::{DoneGuard, JobHandler, QueueStatus, RefreshQueue};
