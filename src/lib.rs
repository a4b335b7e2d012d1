//! course-refresh - stale-while-revalidate refresh for course offerings
//!
//! Readers are served from the record store and never wait long on the
//! upstream API: stale records are returned at once while a deduplicated
//! background refresh runs, and cron schedules keep popular courses warm.

pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod id;
pub mod queue;
pub mod scheduler;
pub mod service;
pub mod storage;

pub use error::{RefreshError, Result};
