//! The external paper repository.
//!
//! The harvest engine only ever talks to a [`PaperSource`]: something that can run a windowed
//! search, look a single paper up by id, and download a paper's artifact. The source is
//! assumed to be slow and unreliable, and it is responsible for its own rate limiting between
//! requests.
//!
//! Search results are a lazy, single-pass [`BoxStream`]. The engine consumes it at most once
//! per attempt and simply drops it when it wants to stop early; a new attempt issues a new
//! query.
//!
//! [`arxiv::ArxivClient`] is the production implementation.

use super::*;

pub mod arxiv;
pub mod atom;

lazy_static! {
  /// New-style (`2301.07041v2`) or old-style (`math.AG/0601001v1`) arXiv identifier.
  static ref ARXIV_ID: Regex =
    Regex::new(r"^(\d{4}\.\d{4,5}|[a-zA-Z-]+(\.[A-Z]{2})?/\d{7})(v\d+)?$").unwrap();
}

/// Returns whether `id` is a well-formed arXiv identifier, with or without a version.
pub fn is_arxiv_id(id: &str) -> bool { ARXIV_ID.is_match(id) }

/// A paper repository the harvester can query.
#[async_trait]
pub trait PaperSource: Send + Sync {
  /// Runs `query` and returns its results newest-first.
  ///
  /// The stream fetches pages lazily as it is polled. An `Err` item means the result
  /// sequence broke off (transport failure, malformed page) and nothing further should be
  /// expected from it.
  fn search(&self, query: &SearchQuery) -> BoxStream<'_, Result<Entry>>;

  /// Fetches the metadata of a single paper.
  async fn lookup(&self, id: &str) -> Result<Entry>;

  /// Stores the artifact for `entry` at `destination`.
  ///
  /// On success the file at `destination` is complete; on failure nothing is left there.
  async fn download(&self, entry: &Entry, destination: &Path) -> Result<()>;
}

/// A windowed category query.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use gleaner::{source::SearchQuery, window::Window};
///
/// let window = Window {
///   start: Utc.with_ymd_and_hms(2023, 6, 7, 0, 0, 0).unwrap(),
///   end:   Utc.with_ymd_and_hms(2023, 6, 14, 0, 0, 0).unwrap(),
/// };
/// let query = SearchQuery::new(&["cs.AI".to_string(), "cs.LG".to_string()], window);
/// assert_eq!(
///   query.to_string(),
///   "(cat:cs.AI OR cat:cs.LG) AND submittedDate:[20230607 TO 20230614]"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
  /// Category codes, any of which may match
  pub categories: Vec<String>,
  /// Submission date range
  pub window:     Window,
}

impl SearchQuery {
  /// Builds the query for `window` over `categories`. Blank category codes are ignored.
  pub fn new(categories: &[String], window: Window) -> Self {
    let categories = categories
      .iter()
      .map(|c| c.trim())
      .filter(|c| !c.is_empty())
      .map(String::from)
      .collect();
    Self { categories, window }
  }

  /// The category disjunction, e.g. `(cat:cs.AI OR cat:cs.LG)`.
  pub fn category_filter(&self) -> String {
    let clauses: Vec<String> = self.categories.iter().map(|c| format!("cat:{c}")).collect();
    format!("({})", clauses.join(" OR "))
  }

  /// The date-range clause, e.g. `submittedDate:[20230607 TO 20230614]`.
  pub fn date_clause(&self) -> String {
    format!("submittedDate:[{} TO {}]", self.window.start_stamp(), self.window.end_stamp())
  }
}

impl Display for SearchQuery {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} AND {}", self.category_filter(), self.date_clause())
  }
}
