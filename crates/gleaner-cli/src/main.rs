//! Command line harvester for arXiv papers.
//!
//! Wraps the `gleaner` library: it resolves the configuration and data directory, sets up
//! logging to the terminal and to `<data-dir>/gleaner.log`, and runs one of the commands
//! below. A harvest can be interrupted with Ctrl-C at any time; it stops after the paper in
//! flight, saves what it has and can simply be started again later.
//!
//! # Usage
//!
//! ```bash
//! # Walk back from today to the start of 2020 in 30-day windows
//! gleaner harvest
//!
//! # A bounded run with a smaller target
//! gleaner harvest --global-start 2023-01-01 --initial-end 2023-06-30 --window-days 7 --target 500
//!
//! # Record PDFs that are on disk but missing from the ledger
//! gleaner reconcile
//!
//! # Show what has been harvested so far
//! gleaner status --data-dir /data/gleaner
//! ```

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::{
  collections::HashSet,
  path::{Path, PathBuf},
  process::ExitCode,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
};

use chrono::{DateTime, NaiveDate, Utc};
use clap::{builder::ArgAction, Args, Parser, Subcommand};
use console::style;
use gleaner::{
  config::{Config, StorageLayout},
  harvest::Harvester,
  ledger::Ledger,
  reconcile::Reconciler,
  source::arxiv::ArxivClient,
  window::{start_of_day, WindowPlanner},
};
use tracing::{debug, error, info, warn};
use tracing_appender::{
  non_blocking::WorkerGuard,
  rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod commands;
pub mod error;

use crate::{commands::*, error::*};

/// Prefix for information messages
static INFO_PREFIX: &str = "ℹ ";
/// Prefix for success messages
static SUCCESS_PREFIX: &str = "✓ ";
/// Prefix for error messages
static ERROR_PREFIX: &str = "✗ ";

/// Name of the log file inside the data directory
const LOG_FILE: &str = "gleaner.log";

/// Command line interface configuration and argument parsing
#[derive(Parser)]
#[command(author, version, about = "Windowed, resumable harvester for arXiv papers")]
pub struct Cli {
  /// Verbose mode (-v, -vv) for more logging detail
  #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase logging verbosity"
    )]
  verbose: u8,

  /// Configuration file. Defaults to the platform config directory when that file exists.
  #[arg(long, short, global = true)]
  config: Option<PathBuf>,

  /// Root directory for PDFs, metadata and the log file. Overrides the configured storage
  /// paths; defaults to the platform data directory.
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// The subcommand to execute
  #[command(subcommand)]
  command: Commands,
}

/// Configures logging to stdout and to the log file in `log_dir`.
///
/// The verbosity levels for this crate are:
/// - 0: info (default)
/// - 1: debug
/// - 2+: trace
///
/// `RUST_LOG` overrides the level entirely.
fn setup_logging(verbosity: u8, log_dir: &Path) -> Result<WorkerGuard> {
  let level = match verbosity {
    0 => "info",
    1 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(format!("warn,gleaner={level}")));

  let appender = RollingFileAppender::builder()
    .rotation(Rotation::NEVER)
    .filename_prefix(LOG_FILE)
    .build(log_dir)?;
  let (file_writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_target(false))
    .with(fmt::layer().with_ansi(false).with_writer(file_writer))
    .init();
  Ok(guard)
}

/// Resolves the configuration and creates the directories a run needs.
fn prepare(cli: &Cli) -> Result<(Config, WorkerGuard)> {
  let mut config = Config::load(cli.config.as_deref())?;
  if let Some(data_dir) = &cli.data_dir {
    config.storage = StorageLayout::with_root(data_dir);
  }

  let log_dir = cli.data_dir.clone().unwrap_or_else(StorageLayout::default_root);
  std::fs::create_dir_all(&log_dir)?;
  let guard = setup_logging(cli.verbose, &log_dir)?;
  debug!("Logging to {}", log_dir.join(LOG_FILE).display());

  config.storage.ensure()?;
  Ok((config, guard))
}

/// Entry point for the gleaner CLI
///
/// Invalid arguments and fatal errors are logged and end the process with a failure code.
/// An interrupted harvest is a normal stop.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
  let cli = Cli::parse();

  let (config, _guard) = match prepare(&cli) {
    Ok(prepared) => prepared,
    Err(e) => {
      eprintln!("{} {e}", style(ERROR_PREFIX).red());
      return ExitCode::FAILURE;
    },
  };

  let result = match cli.command {
    Commands::Harvest(options) => harvest(&config, options).await,
    Commands::Reconcile => reconcile(&config).await,
    Commands::Status => status(&config),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      match &e {
        GleanerCliError::InvalidDate { .. } => error!("{e}"),
        _ => error!("Fatal error: {e}"),
      }
      eprintln!("{} {e}", style(ERROR_PREFIX).red());
      ExitCode::FAILURE
    },
  }
}
