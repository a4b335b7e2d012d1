use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::{Commands, ScheduleCommands};
use course_refresh::config::Config;
use course_refresh::daemon::Daemon;
use course_refresh::domain::{CourseKey, ScheduleDefinition};
use course_refresh::scheduler::CronSchedule;
use course_refresh::service::{CourseLookup, ScheduleUpdate};

fn setup_logging(cli: &Cli, config: &Config) -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        let level = config.log_level.as_deref().unwrap_or("info");
        builder.parse_filters(level);
    }

    if cli.log_stderr {
        builder.target(env_logger::Target::Stderr).init();
        info!("Logging initialized, writing to stderr");
        return Ok(());
    }

    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("course-refresh")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("course-refresh.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run => handle_run_command(config).await,
        Commands::Get {
            code,
            year,
            semester,
            json,
        } => handle_get_command(CourseKey::new(code.clone(), *year, *semester), *json, config).await,
        Commands::Schedule { command } => handle_schedule_command(command, config).await,
        Commands::ValidateCron { expr, count } => handle_validate_cron_command(expr, *count),
    }
}

async fn handle_run_command(config: &Config) -> Result<()> {
    let daemon = Daemon::build(config).context("Failed to build daemon")?;
    let loaded = daemon.start().await.context("Failed to start daemon")?;

    println!(
        "{} {} workers, {} schedules (Ctrl-C to stop)",
        "Refresh daemon running:".green(),
        daemon.queue.workers(),
        loaded
    );

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;

    println!("{}", "Shutting down, draining refresh queue...".cyan());
    daemon.shutdown().await;
    let status = daemon.queue.status();
    println!("{} {} jobs processed", "Stopped:".green(), status.processed);
    Ok(())
}

async fn handle_get_command(key: CourseKey, json: bool, config: &Config) -> Result<()> {
    info!("Reading course {}", key);
    let daemon = Daemon::build(config).context("Failed to build daemon")?;
    daemon.queue.start(daemon.courses.clone());

    let lookup = daemon.courses.get_course(&key).await;

    // Let any background refresh finish and persist before exiting
    daemon.queue.stop().await;

    match lookup.context("Failed to read course")? {
        CourseLookup::Found(course) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&course)?);
            } else {
                let freshness = if course.is_stale() {
                    "stale, refreshed in background".yellow()
                } else {
                    "fresh".green()
                };
                println!("{} {} ({})", course.code.bold(), course.name_en, freshness);
                println!("  Year {} semester {}, {} section(s)", course.year, course.semester, course.sections.len());
                println!("  Updated {}", course.updated_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"));
            }
        }
        CourseLookup::NotFound => println!("{} {}", "Not found:".red(), key),
        CourseLookup::Pending => println!("{} {} (try again shortly)", "Pending:".yellow(), key),
    }
    Ok(())
}

async fn handle_schedule_command(command: &ScheduleCommands, config: &Config) -> Result<()> {
    info!("Handling schedule command: {:?}", command);
    let daemon = Daemon::build(config).context("Failed to build daemon")?;
    let schedules = &daemon.schedules;

    match command {
        ScheduleCommands::List => {
            let all = schedules.list().await?;
            if all.is_empty() {
                println!("{}", "No schedules".yellow());
            }
            for definition in all {
                let state = if definition.enabled { "enabled".green() } else { "disabled".red() };
                println!(
                    "{}  {}  [{}]  {}  {}/{}  {}",
                    definition.id.cyan(),
                    definition.name,
                    definition.cron_expr,
                    definition.course_codes.join(","),
                    definition.acadyear,
                    definition.semester,
                    state
                );
            }
        }
        ScheduleCommands::Add {
            name,
            cron,
            codes,
            year,
            semester,
            disabled,
        } => {
            let definition =
                ScheduleDefinition::new(name.clone(), cron.clone(), codes.clone(), *year, *semester)
                    .with_enabled(!*disabled);
            let created = schedules.create(definition).await.context("Failed to create schedule")?;
            println!("{} {}", "Created:".green(), created.id);
        }
        ScheduleCommands::Remove { id } => {
            schedules.delete(id).await.context("Failed to delete schedule")?;
            println!("{} {}", "Removed:".red(), id);
        }
        ScheduleCommands::Enable { id } => {
            schedules.update(id, ScheduleUpdate::enabled(true)).await?;
            println!("{} {}", "Enabled:".green(), id);
        }
        ScheduleCommands::Disable { id } => {
            schedules.update(id, ScheduleUpdate::enabled(false)).await?;
            println!("{} {}", "Disabled:".yellow(), id);
        }
        ScheduleCommands::Trigger { id } => {
            daemon.queue.start(Arc::clone(&daemon.courses));
            let admitted = schedules.trigger(id).await;
            daemon.queue.stop().await;

            let admitted = admitted.context("Failed to trigger schedule")?;
            let status = daemon.queue.status();
            println!(
                "{} {} refreshes queued, {} processed",
                "Triggered:".green(),
                admitted,
                status.processed
            );
        }
    }
    Ok(())
}

fn handle_validate_cron_command(expr: &str, count: usize) -> Result<()> {
    match CronSchedule::parse(expr) {
        Ok(schedule) => {
            println!("{} {}", "Valid:".green(), schedule.expr());
            for at in schedule.upcoming(&chrono::Local::now(), count) {
                println!("  {}", at.format("%a %Y-%m-%d %H:%M"));
            }
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "Invalid:".red(), e);
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging
    setup_logging(&cli, &config).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
