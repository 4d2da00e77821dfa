//! Error types for the gleaner library.
//!
//! Only a few of these ever reach a caller of the harvest engine. Per-record failures are
//! written to the failure log, window failures are retried and then abandoned, and ledger
//! write failures are logged. The variants below are what the lower layers (HTTP client,
//! feed parser, CSV files, configuration) report upward.
//!
//! # Examples
//!
//! ```no_run
//! use gleaner::{config::HarvestConfig, error::GleanerError, source::arxiv::ArxivClient};
//! use gleaner::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let client = ArxivClient::new(&HarvestConfig::default())?;
//! match client.lookup("2301.07041v1").await {
//!   Err(GleanerError::NotFound(id)) => println!("No such paper: {id}"),
//!   Err(GleanerError::Network(e)) => println!("Network error: {e}"),
//!   Err(e) => println!("Other error: {e}"),
//!   Ok(entry) => println!("Found: {}", entry.title),
//! }
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

/// Error type alias used for the [`gleaner`](crate) crate.
pub type Result<T> = core::result::Result<T, GleanerError>;

/// Errors that can occur while harvesting.
#[derive(Error, Debug)]
pub enum GleanerError {
  /// A network request failed.
  ///
  /// This covers connection failures, TLS errors and request timeouts. The engine treats
  /// these as transient.
  #[error(transparent)]
  Network(#[from] reqwest::Error),

  /// The upstream API answered with something other than a success.
  ///
  /// The string carries the HTTP status or a short description of the unexpected body.
  #[error("API error: {0}")]
  ApiError(String),

  /// A lookup by identifier returned no entry.
  #[error("Paper not found: {0}")]
  NotFound(String),

  /// The source returned an empty page before the advertised total was reached.
  ///
  /// arXiv does this intermittently under load; it is raised only once the per-page retries
  /// have been exhausted.
  #[error("Empty page at offset {offset} (expected {total} results)")]
  EmptyPage {
    /// Offset of the page that came back empty
    offset: usize,
    /// Total number of results the feed advertised
    total:  usize,
  },

  /// A paper identifier did not look like an arXiv identifier.
  #[error("Invalid identifier: {0}")]
  InvalidIdentifier(String),

  /// The Atom feed could not be parsed.
  #[error(transparent)]
  Xml(#[from] quick_xml::Error),

  /// A filesystem operation failed.
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// Reading or writing a CSV file failed.
  #[error(transparent)]
  Csv(#[from] csv::Error),

  /// A list field could not be encoded or decoded.
  #[error(transparent)]
  Json(#[from] serde_json::Error),

  /// The configuration file is not valid TOML for [`Config`](crate::config::Config).
  #[error(transparent)]
  TomlDe(#[from] toml::de::Error),

  /// The configuration is well-formed but unusable.
  #[error("{0}")]
  Config(String),
}
