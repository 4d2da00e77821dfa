//! Harvested records, failed attempts and the source-side paper entry.
//!
//! A [`Record`] is one row of the ledger and a [`FailureEntry`] one row of the failure log.
//! Both are plain serde types written with the `csv` crate, so field values containing the
//! delimiter, quotes or newlines are quoted rather than mangled.
//!
//! The multi-valued `authors` and `categories` columns are the exception that needs care: a
//! comma-joined cell cannot tell `"Doe, J."` from two authors. They are written as a JSON
//! array inside the cell (`["Doe, J.","Smith, A."]`) and read back from either that form or
//! the older comma-joined one.

use super::*;

/// A paper as returned by the source, before its artifact has been stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
  /// Short identifier including the version, e.g. `2301.07041v2`
  pub id:         String,
  /// Paper title with whitespace normalised
  pub title:      String,
  /// Author names in the order the source lists them
  pub authors:    Vec<String>,
  /// Abstract as published
  pub summary:    String,
  /// Category codes, primary category first
  pub categories: Vec<String>,
  /// Submission timestamp of the first version
  pub published:  DateTime<Utc>,
  /// Direct link to the PDF, when the source advertises one
  pub pdf_url:    Option<String>,
}

/// One row of the ledger: a paper whose artifact is on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
  /// Stable external identifier, unique within the ledger
  pub id:            String,
  /// Paper title
  pub title:         String,
  /// Ordered author names
  #[serde(with = "list_field")]
  pub authors:       Vec<String>,
  /// Abstract text
  #[serde(rename = "abstract")]
  pub abstract_text: String,
  /// Category codes
  #[serde(with = "list_field")]
  pub categories:    Vec<String>,
  /// Submission timestamp, written as RFC 3339
  pub submit_date:   DateTime<Utc>,
  /// Where the artifact was stored
  pub artifact_path: PathBuf,
}

/// One row of the failure log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
  /// Identifier of the paper that failed
  pub id:        String,
  /// Free-text cause
  pub error:     String,
  /// When the failure was recorded
  pub timestamp: DateTime<Utc>,
}

impl Record {
  /// Builds the ledger row for `entry` whose artifact lives at `artifact_path`.
  pub fn from_entry(entry: Entry, artifact_path: PathBuf) -> Self {
    Self {
      id: entry.id,
      title: entry.title,
      authors: entry.authors,
      abstract_text: entry.summary.trim().to_string(),
      categories: entry.categories,
      submit_date: entry.published,
      artifact_path,
    }
  }
}

impl FailureEntry {
  /// Records a failure of `id` with the given cause at `timestamp`.
  pub fn new(id: impl Into<String>, error: impl Display, timestamp: DateTime<Utc>) -> Self {
    Self { id: id.into(), error: error.to_string(), timestamp }
  }
}

/// Serde adapter for the multi-valued columns.
pub mod list_field {
  use serde::{de, ser, Deserializer, Serializer};

  use super::*;

  /// Writes the list as a JSON array string.
  pub fn serialize<S>(items: &[String], serializer: S) -> std::result::Result<S::Ok, S::Error>
  where S: Serializer {
    let encoded = serde_json::to_string(items).map_err(ser::Error::custom)?;
    serializer.serialize_str(&encoded)
  }

  /// Reads a list written by [`serialize`] or a legacy comma-joined cell.
  pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
  where D: Deserializer<'de> {
    let cell = String::deserialize(deserializer)?;
    decode(&cell).map_err(de::Error::custom)
  }

  /// Decodes a single cell.
  pub fn decode(cell: &str) -> crate::error::Result<Vec<String>> {
    let cell = cell.trim();
    if cell.starts_with('[') {
      return Ok(serde_json::from_str(cell)?);
    }
    Ok(cell.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
  }
}
