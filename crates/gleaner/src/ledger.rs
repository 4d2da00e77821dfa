//! Durable, append-only storage for harvested records and failed attempts.
//!
//! The ledger is two CSV files under the metadata directory:
//!
//! - `metadata.csv`: one [`Record`] per harvested paper
//! - `failed_papers.csv`: one [`FailureEntry`] per failed attempt (duplicates allowed)
//!
//! Rows are only ever appended. A header is written when a file is first created, and the
//! set of harvested ids is rebuilt from the file at start-up, which is what makes runs
//! resumable.
//!
//! Writes never raise: a failed append is logged and reported as `false` so the caller can
//! decide whether to keep the rows and try again. Reads skip rows they cannot parse, such as
//! a final line cut short by a crash mid-flush.
//!
//! # Examples
//!
//! ```no_run
//! use chrono::Utc;
//! use gleaner::{config::StorageLayout, ledger::Ledger};
//!
//! let layout = StorageLayout::with_root("/data/gleaner");
//! let ledger = Ledger::new(&layout);
//!
//! let known = ledger.load_identities();
//! println!("{} papers already harvested", known.len());
//!
//! ledger.append_failure("2301.07041v1", "connection reset", Utc::now());
//! ```

use std::{
  fs::{File, OpenOptions},
  io::{Read, Seek, SeekFrom, Write},
};

use serde::de::DeserializeOwned;

use super::*;

/// Handle on the ledger and failure log files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
  /// Path of the record file
  records_path:  PathBuf,
  /// Path of the failure log
  failures_path: PathBuf,
}

/// Projection of a row onto its `id` column.
#[derive(Debug, Deserialize)]
struct IdRow {
  /// The row's identifier
  id: String,
}

impl Ledger {
  /// Opens the ledger files of `layout`. Nothing is touched on disk until the first write.
  pub fn new(layout: &StorageLayout) -> Self {
    Self::at(layout.ledger_path(), layout.failures_path())
  }

  /// Uses explicit file locations.
  pub fn at(records_path: impl Into<PathBuf>, failures_path: impl Into<PathBuf>) -> Self {
    Self { records_path: records_path.into(), failures_path: failures_path.into() }
  }

  /// Path of the record file.
  pub fn records_path(&self) -> &Path { &self.records_path }

  /// Path of the failure log.
  pub fn failures_path(&self) -> &Path { &self.failures_path }

  /// Ids of every record in the ledger. A missing file yields an empty set.
  pub fn load_identities(&self) -> HashSet<String> {
    read_rows::<IdRow>(&self.records_path).into_iter().map(|row| row.id).collect()
  }

  /// Ids from the failure log in the order they were recorded, duplicates included.
  pub fn load_failed_ids(&self) -> Vec<String> {
    read_rows::<IdRow>(&self.failures_path).into_iter().map(|row| row.id).collect()
  }

  /// Every well-formed record in the ledger, in file order.
  pub fn load_records(&self) -> Vec<Record> { read_rows(&self.records_path) }

  /// Every well-formed entry of the failure log, in file order.
  pub fn load_failures(&self) -> Vec<FailureEntry> { read_rows(&self.failures_path) }

  /// Appends `records` to the ledger.
  ///
  /// Returns `true` when the rows are durably written (or there was nothing to write).
  pub fn append_records(&self, records: &[Record]) -> bool {
    if records.is_empty() {
      return true;
    }
    match append_rows(&self.records_path, records) {
      Ok(()) => {
        debug!("Appended {} records to {}", records.len(), self.records_path.display());
        true
      },
      Err(e) => {
        error!("Failed to append {} records to the ledger: {e}", records.len());
        false
      },
    }
  }

  /// Records a failed attempt at `id`.
  pub fn append_failure(&self, id: &str, error: impl Display, timestamp: DateTime<Utc>) -> bool {
    let entry = FailureEntry::new(id, error, timestamp);
    match append_rows(&self.failures_path, std::slice::from_ref(&entry)) {
      Ok(()) => true,
      Err(e) => {
        error!("Failed to log failure of {id}: {e}");
        false
      },
    }
  }
}

/// Reads every parsable row of the CSV file at `path`.
fn read_rows<T: DeserializeOwned>(path: &Path) -> Vec<T> {
  if !path.exists() {
    return Vec::new();
  }
  let mut reader = match csv::Reader::from_path(path) {
    Ok(reader) => reader,
    Err(e) => {
      error!("Failed to open {}: {e}", path.display());
      return Vec::new();
    },
  };

  let mut rows = Vec::new();
  for result in reader.deserialize() {
    match result {
      Ok(row) => rows.push(row),
      Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
        error!("Failed to read {}: {e}", path.display());
        break;
      },
      Err(e) => warn!("Skipping malformed row in {}: {e}", path.display()),
    }
  }
  rows
}

/// Appends `rows` to the CSV file at `path`, creating it with a header if needed.
///
/// A partial row left at the end of the file by an interrupted write is cut off first, so it
/// cannot run into the rows written after it.
fn append_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
  let mut file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
  let len = file.metadata()?.len();
  let complete = if len == 0 { 0 } else { complete_prefix(&mut file, len)? };
  if complete < len {
    warn!("{} ends in a partial row; dropping {} bytes", path.display(), len - complete);
    file.set_len(complete)?;
  }
  file.seek(SeekFrom::End(0))?;

  let mut writer = csv::WriterBuilder::new().has_headers(complete == 0).from_writer(file);
  for row in rows {
    writer.serialize(row)?;
  }
  writer.flush()?;
  Ok(())
}

/// Length of the leading part of a non-empty `file` that holds only complete rows.
///
/// A row is complete when it parses and is followed by a line break. Malformed rows before
/// the last complete one are kept; readers skip them.
fn complete_prefix(file: &mut File, len: u64) -> Result<u64> {
  let terminated = ends_with_newline(file)?;
  file.seek(SeekFrom::Start(0))?;

  let mut reader = csv::ReaderBuilder::new().has_headers(false).from_reader(&mut *file);
  let mut row = csv::ByteRecord::new();
  let mut complete = 0;
  loop {
    match reader.read_byte_record(&mut row) {
      Ok(false) => break,
      Ok(true) => {
        let end = reader.position().byte();
        if end < len || terminated {
          complete = end;
        }
      },
      Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e.into()),
      Err(_) => {},
    }
  }
  Ok(complete)
}

/// Whether the last byte of a non-empty `file` is a newline.
fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
  file.seek(SeekFrom::End(-1))?;
  let mut last = [0u8; 1];
  file.read_exact(&mut last)?;
  Ok(last[0] == b'\n')
}
