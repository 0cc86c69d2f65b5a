#[macro_use] extern crate prettytable;

use anyhow::{anyhow, Context};
use chrono::Duration;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use structopt::StructOpt;

mod cli;
mod interface;

use tasklog::refresh::RefreshLoop;
use tasklog::{Config, Policy, SqliteStore, SystemClock, TaskId, Tracker};

use cli::{Command::*, CommandLineArgs};

fn init_tracing(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { config.log_level.as_str() };

    let filter = tracing_subscriber::EnvFilter::try_from_env("TASKLOG_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow!("failed to initialize tracing subscriber: {}", error))?;

    Ok(())
}

fn find_journal_file(config: &Config, journal_file: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match journal_file {
        Some(path) => Ok(path),
        None => config
            .database_path()
            .context("Failed to create data directory.")?
            .ok_or_else(|| anyhow!("Failed to find journal file.")),
    }
}

fn main() -> anyhow::Result<()> {
    // Get the command-line arguments.
    let CommandLineArgs {
        action,
        journal_file,
        config,
        verbose,
    } = CommandLineArgs::from_args();

    let config = Config::load(config.as_deref()).context("Failed to load configuration.")?;
    init_tracing(&config, verbose)?;

    let journal_file = find_journal_file(&config, journal_file)?;
    let store = SqliteStore::open(&journal_file)
        .with_context(|| format!("Failed to open journal {}.", journal_file.display()))?;
    let policy = Policy {
        exclusive_running: config.exclusive_running,
        pause_on_exit: config.pause_on_exit,
    };
    let mut tracker = Tracker::open(store, SystemClock, policy).context("Failed to load tasks.")?;

    // Perform the action.
    match action {
        Add { title, description } => interface::add_task(&mut tracker, title, description),
        List => interface::list(&tracker),
        Show { id } => interface::show(&tracker, TaskId(id)),
        Start { id, note } => interface::start(&mut tracker, TaskId(id), &note),
        Pause { id } => interface::pause(&mut tracker, TaskId(id)),
        Complete { id } => interface::complete(&mut tracker, TaskId(id)),
        Rm { id } => interface::remove_task(&mut tracker, TaskId(id)),
        Describe { id, description } => interface::describe(&mut tracker, TaskId(id), &description),
        Rename { id, title } => interface::rename(&mut tracker, TaskId(id), &title),
        Report { date, yesterday } => {
            let today = tracker.now().date_naive();
            let date = match (date, yesterday) {
                (Some(date), _) => date,
                (None, true) => today - Duration::days(1),
                (None, false) => today,
            };
            interface::report(&tracker, date)
        }
        Watch { ticks, every } => {
            let stop = Arc::new(AtomicBool::new(false));
            {
                let stop = stop.clone();
                ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
                    .context("Unable to set ctrl-c handler")?;
            }
            let mut refresh = RefreshLoop::new(every.unwrap_or_else(|| config.tick_interval()));
            let mut printer = interface::WatchPrinter::new(std::io::stdout());
            refresh.run(&mut tracker, &mut printer, ticks, &stop);
            tracker.shutdown().context("Failed to save running tasks.")
        }
    }?;
    Ok(())
}
