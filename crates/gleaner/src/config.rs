//! Run configuration.
//!
//! Every tunable of a harvest lives in an explicit [`Config`] that is handed to the engine at
//! construction. Nothing is read from process-wide state, so tests (and the CLI) can override
//! any option per run.
//!
//! A configuration file is TOML. Every key is optional and falls back to its default:
//!
//! ```toml
//! [harvest]
//! categories       = ["cs.AI", "cs.LG"]
//! batch_size       = 100
//! page_size        = 100
//! request_interval = 2      # seconds
//! timeout          = 60     # seconds
//! target_total     = 120000
//! max_retries      = 3
//! retry_backoff    = 5      # seconds, multiplied by the attempt number
//!
//! [storage]
//! pdf_dir      = "/data/papers/pdf"
//! metadata_dir = "/data/papers/metadata"
//! ```

use super::*;

/// File name of the ledger inside [`StorageLayout::metadata_dir`].
pub const LEDGER_FILE: &str = "metadata.csv";

/// File name of the failure log inside [`StorageLayout::metadata_dir`].
pub const FAILURES_FILE: &str = "failed_papers.csv";

/// Extension of artifact files.
pub const ARTIFACT_EXTENSION: &str = "pdf";

/// Complete configuration for a harvesting run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Options for the harvest engine and source client
  pub harvest: HarvestConfig,
  /// Where artifacts and metadata are kept
  pub storage: StorageLayout,
}

/// Options recognised by the harvest engine and the source client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
  /// Category codes combined into the query's category disjunction
  pub categories:       Vec<String>,
  /// Number of processed records between ledger flushes
  pub batch_size:       usize,
  /// Number of results requested per page from the source
  pub page_size:        usize,
  /// Delay between consecutive requests to the source
  #[serde(deserialize_with = "seconds")]
  pub request_interval: Duration,
  /// Per-request HTTP timeout
  #[serde(deserialize_with = "seconds")]
  pub timeout:          Duration,
  /// The run stops once this many records are in the ledger
  pub target_total:     usize,
  /// Retry budget for a failing window (and for an empty page within one)
  pub max_retries:      usize,
  /// Base backoff between window retries; attempt `n` waits `n` times this
  #[serde(deserialize_with = "seconds")]
  pub retry_backoff:    Duration,
}

impl Default for HarvestConfig {
  fn default() -> Self {
    Self {
      categories:       ["cs.AI", "cs.LG", "cs.CV", "cs.NE"].map(String::from).to_vec(),
      batch_size:       100,
      page_size:        100,
      request_interval: Duration::from_secs(2),
      timeout:          Duration::from_secs(60),
      target_total:     120_000,
      max_retries:      3,
      retry_backoff:    Duration::from_secs(5),
    }
  }
}

/// Filesystem layout of a harvest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageLayout {
  /// Directory holding one artifact per record
  pub pdf_dir:      PathBuf,
  /// Directory holding the ledger and the failure log
  pub metadata_dir: PathBuf,
}

impl Default for StorageLayout {
  fn default() -> Self { Self::with_root(Self::default_root()) }
}

impl Config {
  /// Returns the default location of the configuration file.
  ///
  /// - On Unix: `~/.config/gleaner/config.toml`
  /// - On macOS: `~/Library/Application Support/gleaner/config.toml`
  /// - On Windows: `%APPDATA%\gleaner\config.toml`
  pub fn default_path() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("gleaner").join("config.toml")
  }

  /// Parses a configuration from a TOML string and validates it.
  pub fn from_toml_str(toml_str: &str) -> Result<Self> {
    let config: Config = toml::from_str(toml_str)?;
    config.validate()?;
    Ok(config)
  }

  /// Reads a configuration from a TOML file.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let content = std::fs::read_to_string(path)?;
    Self::from_toml_str(&content)
  }

  /// Loads the configuration for a run.
  ///
  /// An explicit path must exist. Without one, the file at [`Config::default_path`] is used
  /// when present and the built-in defaults otherwise.
  pub fn load(path: Option<&Path>) -> Result<Self> {
    match path {
      Some(path) => Self::from_file(path),
      None => {
        let default_path = Self::default_path();
        if default_path.is_file() {
          debug!("Loading configuration from {}", default_path.display());
          Self::from_file(default_path)
        } else {
          Ok(Self::default())
        }
      },
    }
  }

  /// Rejects option values the engine cannot work with.
  pub fn validate(&self) -> Result<()> {
    let harvest = &self.harvest;
    if harvest.categories.iter().all(|c| c.trim().is_empty()) {
      return Err(GleanerError::Config("at least one category is required".into()));
    }
    if harvest.batch_size == 0 {
      return Err(GleanerError::Config("batch_size must be positive".into()));
    }
    if harvest.page_size == 0 {
      return Err(GleanerError::Config("page_size must be positive".into()));
    }
    Ok(())
  }
}

impl StorageLayout {
  /// Default root directory for harvested data, `<data dir>/gleaner`.
  pub fn default_root() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("gleaner")
  }

  /// Lays out `pdf_files/` and `metadata/` under `root`.
  pub fn with_root(root: impl AsRef<Path>) -> Self {
    let root = root.as_ref();
    Self { pdf_dir: root.join("pdf_files"), metadata_dir: root.join("metadata") }
  }

  /// Path of the ledger file.
  pub fn ledger_path(&self) -> PathBuf { self.metadata_dir.join(LEDGER_FILE) }

  /// Path of the failure log.
  pub fn failures_path(&self) -> PathBuf { self.metadata_dir.join(FAILURES_FILE) }

  /// Creates the artifact and metadata directories if they are missing.
  pub fn ensure(&self) -> Result<()> {
    for dir in [&self.pdf_dir, &self.metadata_dir] {
      if !dir.exists() {
        info!("Creating directory {}", dir.display());
        std::fs::create_dir_all(dir)?;
      }
    }
    Ok(())
  }

  /// Location of the artifact for `id`.
  ///
  /// Old-style arXiv identifiers contain a `/` (`math.AG/0601001v1`); it is stored as `_`,
  /// which never occurs in an arXiv identifier, so the mapping is reversible.
  pub fn artifact_path(&self, id: &str) -> PathBuf {
    self.pdf_dir.join(format!("{}.{ARTIFACT_EXTENSION}", id.replace('/', "_")))
  }

  /// Ids of the artifacts currently in the artifact directory.
  ///
  /// Partial downloads and other files are ignored. An unreadable directory is logged and
  /// treated as empty.
  pub fn artifact_ids(&self) -> HashSet<String> {
    let entries = match std::fs::read_dir(&self.pdf_dir) {
      Ok(entries) => entries,
      Err(e) => {
        warn!("Cannot list {}: {e}", self.pdf_dir.display());
        return HashSet::new();
      },
    };
    entries
      .filter_map(|entry| entry.ok())
      .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
      .filter_map(|entry| Self::id_from_artifact(&entry.path()))
      .collect()
  }

  /// Recovers the record id from an artifact path, if the path names an artifact.
  pub fn id_from_artifact(path: &Path) -> Option<String> {
    if path.extension()? != ARTIFACT_EXTENSION {
      return None;
    }
    let stem = path.file_stem()?.to_str()?;
    (!stem.is_empty()).then(|| stem.replace('_', "/"))
  }
}

/// Deserializes a [`Duration`] from a (possibly fractional) number of seconds.
fn seconds<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where D: serde::Deserializer<'de> {
  let secs = f64::deserialize(deserializer)?;
  Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
