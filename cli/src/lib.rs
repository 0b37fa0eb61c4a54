//! `logbook` command line.
//!
//! ## Exit codes
//!
//! - 0: success
//! - 1: the draft failed validation
//! - 2: conflicting or missing lifecycle state (operation in progress, no
//!   draft, not a repository, unknown project)
//! - 3: partial commit (record appended, commit incomplete)
//! - 4: the ledger was modified concurrently
//! - 5: infrastructure error (I/O, git, configuration)

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use logbook_core::LogbookConfig;

mod checkpoint_cmd;
mod history_cmd;
mod palette;

/// Exit code for infrastructure failures outside the lifecycle taxonomy.
pub const EXIT_INFRA: i32 = 5;

/// Append-only checkpoint ledger with a guarded check/commit workflow
#[derive(Debug, Parser)]
#[command(name = "logbook", version, about)]
pub struct Cli {
    /// Config file (overrides LOGBOOK_CONFIG and the default location)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log progress to stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the ledger, or add an identity header to a legacy one
    Init(PathArgs),

    /// Lock the project and write a draft checkpoint to fill in
    Check(PathArgs),

    /// Validate the draft, append it to the ledger and commit
    Commit(CommitArgs),

    /// Abandon the current operation by removing lock, draft and diff files
    Clean(PathArgs),

    /// Show lifecycle state, lock holder and ledger summary
    Start(StartArgs),

    /// Report validation errors and style warnings for the draft
    Lint(PathArgs),

    /// List recorded checkpoints, newest first
    Log(LogArgs),

    /// Find a project by id under the discovery roots
    Query(QueryArgs),
}

#[derive(Debug, clap::Args)]
pub struct PathArgs {
    /// Project directory (defaults to the current directory)
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct CommitArgs {
    #[command(flatten)]
    pub target: PathArgs,

    /// Validate and show what would happen without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Stage only the ledger file instead of every change
    #[arg(long)]
    pub changelog_only: bool,
}

#[derive(Debug, clap::Args)]
pub struct StartArgs {
    #[command(flatten)]
    pub target: PathArgs,

    /// Output as JSON instead of text
    #[arg(long, short = 'j')]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct LogArgs {
    #[command(flatten)]
    pub target: PathArgs,

    /// Show at most N checkpoints
    #[arg(short = 'n', long = "limit", value_name = "N")]
    pub limit: Option<usize>,

    /// Output as JSON instead of text
    #[arg(long, short = 'j')]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct QueryArgs {
    /// Project id from the ledger header
    #[arg(value_name = "PROJECT_ID")]
    pub project_id: String,

    /// Directory to scan (repeatable; replaces the configured roots)
    #[arg(long = "root", value_name = "DIR")]
    pub roots: Vec<PathBuf>,

    /// Output as JSON instead of text
    #[arg(long, short = 'j')]
    pub json: bool,
}

/// Run one command and return the process exit code.
pub fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = LogbookConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Init(args) => checkpoint_cmd::run_init(config, &args),
        Command::Check(args) => checkpoint_cmd::run_check(config, &args),
        Command::Commit(args) => checkpoint_cmd::run_commit(config, &args),
        Command::Clean(args) => checkpoint_cmd::run_clean(config, &args),
        Command::Start(args) => checkpoint_cmd::run_start(config, &args),
        Command::Lint(args) => checkpoint_cmd::run_lint(config, &args),
        Command::Log(args) => history_cmd::run_log(config, &args),
        Command::Query(args) => history_cmd::run_query(config, &args),
    }
}

/// Canonical project directory for `path`, or the current directory.
pub(crate) fn project_dir(path: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = match path {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir().context("failed to read current directory")?,
    };
    dir.canonicalize()
        .with_context(|| format!("project directory {} not found", dir.display()))
}
