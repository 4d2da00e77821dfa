//! Error types for the `gleaner` command line tool.

use thiserror::Error;

/// Result alias for the CLI.
pub type Result<T> = core::result::Result<T, GleanerCliError>;

/// Errors that end a CLI invocation with a non-zero exit code.
#[derive(Error, Debug)]
pub enum GleanerCliError {
  /// Errors from the harvesting library.
  #[error(transparent)]
  Gleaner(#[from] gleaner::error::GleanerError),

  /// A date argument was not in `YYYY-MM-DD` form.
  #[error("Invalid date {input:?}: {source} (use YYYY-MM-DD)")]
  InvalidDate {
    /// The argument as given
    input:  String,
    /// Why it did not parse
    source: chrono::ParseError,
  },

  /// Filesystem errors outside the library, such as creating the data directory.
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// The log file could not be opened.
  #[error("Failed to open log file: {0}")]
  Logging(#[from] tracing_appender::rolling::InitError),
}
