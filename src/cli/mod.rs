//! CLI module for course-refresh - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running the daemon,
//! reading courses and managing refresh schedules.

pub mod commands;

pub use commands::Cli;
