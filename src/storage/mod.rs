//! Storage layer - JSONL-backed persistence for courses and schedules.
//!
//! `Storage` is the generic record-level abstraction; `CourseRepository` and
//! `ScheduleRepository` are the gateways the refresh core consumes.

mod courses;
mod jsonl;
mod schedules;
mod traits;

pub use courses::{CourseRepository, CourseStore};
pub use jsonl::JsonlStorage;
pub use schedules::{ScheduleRepository, ScheduleStore};
pub use traits::{Filter, FilterOp, HasId, Storage};
