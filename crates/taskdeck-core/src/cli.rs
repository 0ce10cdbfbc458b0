use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::task::{Priority, Status};
use crate::view::{DateRange, PriorityFilter, SortCriteria, SortDirection, SortField, StatusFilter};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskdeck",
    version,
    about = "Taskdeck: a local, single-user task tracker"
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "taskdeckrc")]
    pub taskdeckrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show tasks through the current filters, due date descending by default
    List(ListArgs),
    /// Create a task
    Add(AddArgs),
    /// Change fields of an existing task
    Edit(EditArgs),
    /// Set the status of a task
    #[command(name = "status")]
    SetStatus {
        id: String,
        #[arg(value_parser = parse_status)]
        status: Status,
    },
    /// Remove a task
    Delete { id: String },
    /// Print the whole collection as JSON
    Export,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[arg(long, value_parser = parse_status_filter, default_value = "all")]
    pub status: StatusFilter,

    #[arg(long, value_parser = parse_priority_filter, default_value = "all")]
    pub priority: PriorityFilter,

    #[arg(long, value_parser = parse_date_range, default_value = "all")]
    pub range: DateRange,

    #[arg(long, default_value = "")]
    pub search: String,

    /// Sort column; each use acts like a header click, so a lone
    /// `--sort due` turns the default latest-first order around
    #[arg(long = "sort", value_parser = parse_sort_field, action = ArgAction::Append)]
    pub sort: Vec<SortField>,

    /// Sort ascending, whatever `--sort` left behind
    #[arg(long, conflicts_with = "desc")]
    pub asc: bool,

    /// Sort descending, whatever `--sort` left behind
    #[arg(long)]
    pub desc: bool,
}

impl ListArgs {
    pub fn sort_criteria(&self) -> SortCriteria {
        let mut sort = SortCriteria::default();
        for field in &self.sort {
            sort.toggle(*field);
        }
        if self.asc {
            sort.direction = SortDirection::Ascending;
        } else if self.desc {
            sort.direction = SortDirection::Descending;
        }
        sort
    }
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub description: String,

    #[arg(long, value_parser = parse_status, default_value = "todo")]
    pub status: Status,

    #[arg(long, value_parser = parse_priority, default_value = "low")]
    pub priority: Priority,

    /// YYYY-MM-DD; defaults to a week from today
    #[arg(long, value_parser = parse_date)]
    pub due: Option<NaiveDate>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long, value_parser = parse_status)]
    pub status: Option<Status>,

    #[arg(long, value_parser = parse_priority)]
    pub priority: Option<Priority>,

    #[arg(long, value_parser = parse_date)]
    pub due: Option<NaiveDate>,
}

fn parse_status(s: &str) -> Result<Status, String> {
    s.parse().map_err(|err| format!("{err}"))
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    s.parse().map_err(|err| format!("{err}"))
}

fn parse_status_filter(s: &str) -> Result<StatusFilter, String> {
    s.parse().map_err(|err| format!("{err}"))
}

fn parse_priority_filter(s: &str) -> Result<PriorityFilter, String> {
    s.parse().map_err(|err| format!("{err}"))
}

fn parse_date_range(s: &str) -> Result<DateRange, String> {
    s.parse().map_err(|err| format!("{err}"))
}

fn parse_sort_field(s: &str) -> Result<SortField, String> {
    s.parse().map_err(|err| format!("{err}"))
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|err| format!("expected YYYY-MM-DD, got {s}: {err}"))
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of argv.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> PreprocessedArgs {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest.split_once('=').or_else(|| rest.split_once(':'));
            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((format!("rc.{k}"), v.to_string()));
                continue;
            }
        }

        cleaned.push(arg);
    }

    PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    }
}
