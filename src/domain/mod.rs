//! Domain types
//!
//! - Course: an externally sourced course offering and its sections
//! - CourseKey: the (code, academic year, semester) refresh identity
//! - ScheduleDefinition: a cron-triggered refresh campaign

pub mod course;
pub mod schedule;

pub use course::{ClassMeeting, Course, CourseKey, Section};
pub use schedule::ScheduleDefinition;
