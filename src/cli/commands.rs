//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: run the refresh daemon until Ctrl-C
//! - get: read one course through the refresh path
//! - schedule: manage cron-triggered refresh schedules
//! - validate-cron: check a five-field cron expression

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// course-refresh - keeps course offerings fresh without blocking readers
#[derive(Parser, Debug)]
#[command(name = "course-refresh")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to stderr instead of the log file
    #[arg(long, global = true)]
    pub log_stderr: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the refresh daemon (workers + scheduler) until interrupted
    Run,

    /// Read a course, fetching or refreshing it as needed
    Get {
        /// Course code, e.g. CP353004
        code: String,

        /// Academic year, e.g. 2568
        year: i32,

        /// Semester, e.g. 1
        semester: i32,

        /// Print the course as JSON
        #[arg(long)]
        json: bool,
    },

    /// Schedule management commands
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },

    /// Validate a cron expression and show its next fire times
    ValidateCron {
        /// Five-field expression, e.g. "0 */6 * * *"
        expr: String,

        /// Number of upcoming fire times to show
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },
}

/// Schedule management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ScheduleCommands {
    /// List all schedules
    List,

    /// Create a schedule
    Add {
        /// Human-readable name
        name: String,

        /// Five-field cron expression
        #[arg(long)]
        cron: String,

        /// Course codes to refresh, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        codes: Vec<String>,

        /// Academic year
        #[arg(long)]
        year: i32,

        /// Semester
        #[arg(long)]
        semester: i32,

        /// Create the schedule disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Delete a schedule
    Remove {
        /// Schedule ID
        id: String,
    },

    /// Enable a schedule
    Enable {
        /// Schedule ID
        id: String,
    },

    /// Disable a schedule
    Disable {
        /// Schedule ID
        id: String,
    },

    /// Run a schedule's refreshes now
    Trigger {
        /// Schedule ID
        id: String,
    },
}
