use chrono::NaiveDate;
use humantime::parse_duration;
use std::path::PathBuf;
use std::time::Duration;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Add a new task to the backlog.
    Add {
        /// The task title.
        #[structopt()]
        title: String,

        /// A longer description.
        #[structopt(short, long)]
        description: Option<String>,
    },
    /// List all tasks with their time.
    List,
    /// Show a task and its time log.
    Show {
        #[structopt()]
        id: i64,
    },
    /// Start the timer on a task (pausing any other running task).
    Start {
        #[structopt()]
        id: i64,

        /// A note for this work session.
        #[structopt(short, long, default_value = "")]
        note: String,
    },
    /// Pause the timer on a task.
    Pause {
        #[structopt()]
        id: i64,
    },
    /// Mark a task as completed, stopping its timer.
    Complete {
        #[structopt()]
        id: i64,
    },
    /// Remove a task and its time log.
    Rm {
        #[structopt()]
        id: i64,
    },
    /// Replace the description of a task.
    Describe {
        #[structopt()]
        id: i64,

        #[structopt()]
        description: String,
    },
    /// Change the title of a task.
    Rename {
        #[structopt()]
        id: i64,

        #[structopt()]
        title: String,
    },
    /// Time spent per task on a day (today by default).
    Report {
        /// The day to report (YYYY-MM-DD).
        #[structopt(long, parse(try_from_str = parse_date), conflicts_with = "yesterday")]
        date: Option<NaiveDate>,

        /// Report yesterday.
        #[structopt(long)]
        yesterday: bool,
    },
    /// Keep refreshing the running timers.
    Watch {
        /// Stop after this many refreshes.
        #[structopt(long)]
        ticks: Option<u64>,

        /// Refresh period (parse_duration), overriding the configuration.
        #[structopt(long, parse(try_from_str = parse_duration))]
        every: Option<Duration>,
    },
}

fn parse_date(src: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(src, "%Y-%m-%d")
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "tasklog",
    about = "A minimalistic task timer."
)]
pub struct CommandLineArgs {
    #[structopt(subcommand)]
    pub action: Command,

    /// Use a different journal file.
    #[structopt(parse(from_os_str), short, long)]
    pub journal_file: Option<PathBuf>,

    /// Use a different configuration file.
    #[structopt(parse(from_os_str), short, long)]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr.
    #[structopt(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_report_date() {
        let args = CommandLineArgs::from_iter(&["tasklog", "report", "--date", "2024-03-01"]);
        match args.action {
            Command::Report { date, yesterday } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 1));
                assert!(!yesterday);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn parses_watch_period() {
        let args = CommandLineArgs::from_iter(&["tasklog", "-j", "/tmp/t.sqlite", "watch", "--every", "500ms"]);
        assert_eq!(args.journal_file, Some(PathBuf::from("/tmp/t.sqlite")));
        match args.action {
            Command::Watch { ticks, every } => {
                assert_eq!(ticks, None);
                assert_eq!(every, Some(Duration::from_millis(500)));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_dates() {
        assert!(CommandLineArgs::from_iter_safe(&["tasklog", "report", "--date", "yesterday"]).is_err());
    }
}
