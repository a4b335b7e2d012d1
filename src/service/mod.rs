//! Use cases built on the refresh core
//!
//! - CourseService: stale-while-revalidate reads, the refresh worker, course CRUD
//! - ScheduleService: persisted schedule management mirrored into the Scheduler

mod course;
mod schedules;

pub use course::{
    CourseLookup, CourseService, DEFAULT_FETCH_TIMEOUT, DEFAULT_WAIT_TIMEOUT, Page, PageQuery,
};
pub use schedules::{ScheduleRegistry, ScheduleService, ScheduleUpdate};
