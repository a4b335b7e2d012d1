//! Scheduler module for cron-triggered refresh campaigns.
//!
//! This module provides:
//! - **Cron parsing**: five-field expressions validated and iterated in local time.
//! - **Scheduler**: mirrors enabled schedule definitions as live timer entries and,
//!   on each fire or manual trigger, enqueues one fire-and-forget refresh per course.
//!
//! # Architecture
//!
//! A single dispatcher task owns the timing:
//! 1. `add_job` / `remove_job` edit the entry map and wake the dispatcher
//! 2. The dispatcher sleeps until the earliest next fire time
//! 3. Due schedules fan out into the RefreshQueue; the scheduler never waits on results
//!
//! # Example
//!
//! ```ignore
//! use course_refresh::queue::RefreshQueue;
//! use course_refresh::scheduler::Scheduler;
//!
//! let queue = Arc::new(RefreshQueue::new(100, 5));
//! let scheduler = Scheduler::new(queue.clone());
//! scheduler.load_jobs(&enabled_definitions);
//! scheduler.start();
//! ```

mod cron_expr;
#[allow(clippy::module_inception)]
mod scheduler;

pub use cron_expr::{CronSchedule, validate_cron_expr};
pub use scheduler::Scheduler;
