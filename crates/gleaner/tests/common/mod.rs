//! In-memory stand-in for the arXiv source.

use std::{
  collections::{HashMap, HashSet, VecDeque},
  path::Path,
  sync::{atomic::AtomicBool, Mutex},
};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use gleaner::{ledger::Ledger, prelude::*, record::Entry, source::SearchQuery};

use super::*;

/// One item of a scripted result stream.
#[derive(Debug, Clone)]
pub enum Step {
  /// Yield this entry
  Paper(Entry),
  /// Break the stream with an error
  Break(String),
}

/// Everything the mock was asked to do.
#[derive(Debug, Default)]
struct Inner {
  /// Result streams for successive searches; searches beyond the script get no results
  scripts:   VecDeque<Vec<Step>>,
  /// Entries returned by lookups
  catalog:   HashMap<String, Entry>,
  /// Ids whose download fails
  failing:   HashSet<String>,
  /// Rendered queries, in call order
  queries:   Vec<String>,
  /// Ids downloaded, in call order
  downloads: Vec<String>,
  /// Ids looked up, in call order
  lookups:   Vec<String>,
  /// Ledger whose size is sampled at every download
  observed:  Option<Ledger>,
  /// Ledger sizes seen by successive downloads
  sizes:     Vec<usize>,
  /// Flag raised once this many downloads have happened
  stop:      Option<(usize, Arc<AtomicBool>)>,
}

/// Scriptable [`PaperSource`] sharing its call log across clones.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
  inner: Arc<Mutex<Inner>>,
}

impl MockSource {
  pub fn new() -> Self { Self::default() }

  /// Queues the result stream for the next search.
  pub fn script(self, steps: Vec<Step>) -> Self {
    self.inner.lock().unwrap().scripts.push_back(steps);
    self
  }

  /// Queues a stream yielding `entries` in order.
  pub fn page(self, entries: Vec<Entry>) -> Self {
    self.script(entries.into_iter().map(Step::Paper).collect())
  }

  /// Makes `entry` available to lookups.
  pub fn with_catalog(self, entry: Entry) -> Self {
    self.inner.lock().unwrap().catalog.insert(entry.id.clone(), entry);
    self
  }

  /// Makes downloads of `id` fail.
  pub fn failing(self, id: &str) -> Self {
    self.inner.lock().unwrap().failing.insert(id.to_string());
    self
  }

  /// Samples the size of `ledger` before every download.
  pub fn observe(self, ledger: Ledger) -> Self {
    self.inner.lock().unwrap().observed = Some(ledger);
    self
  }

  /// Raises `flag` after the `count`th download.
  pub fn stop_after(self, count: usize, flag: Arc<AtomicBool>) -> Self {
    self.inner.lock().unwrap().stop = Some((count, flag));
    self
  }

  /// Lets downloads of `id` succeed again.
  pub fn heal(&self, id: &str) { self.inner.lock().unwrap().failing.remove(id); }

  pub fn queries(&self) -> Vec<String> { self.inner.lock().unwrap().queries.clone() }

  pub fn downloads(&self) -> Vec<String> { self.inner.lock().unwrap().downloads.clone() }

  pub fn lookups(&self) -> Vec<String> { self.inner.lock().unwrap().lookups.clone() }

  pub fn ledger_sizes(&self) -> Vec<usize> { self.inner.lock().unwrap().sizes.clone() }
}

#[async_trait]
impl PaperSource for MockSource {
  fn search(&self, query: &SearchQuery) -> BoxStream<'_, Result<Entry>> {
    let mut inner = self.inner.lock().unwrap();
    inner.queries.push(query.to_string());
    let steps = inner.scripts.pop_front().unwrap_or_default();
    let items: Vec<Result<Entry>> = steps
      .into_iter()
      .map(|step| match step {
        Step::Paper(entry) => Ok(entry),
        Step::Break(message) => Err(GleanerError::ApiError(message)),
      })
      .collect();
    futures::stream::iter(items).boxed()
  }

  async fn lookup(&self, id: &str) -> Result<Entry> {
    let mut inner = self.inner.lock().unwrap();
    inner.lookups.push(id.to_string());
    inner.catalog.get(id).cloned().ok_or_else(|| GleanerError::NotFound(id.to_string()))
  }

  async fn download(&self, entry: &Entry, destination: &Path) -> Result<()> {
    {
      let mut inner = self.inner.lock().unwrap();
      if let Some(size) = inner.observed.as_ref().map(|ledger| ledger.load_identities().len()) {
        inner.sizes.push(size);
      }
      inner.downloads.push(entry.id.clone());
      if let Some((count, flag)) = &inner.stop {
        if inner.downloads.len() == *count {
          flag.store(true, Ordering::SeqCst);
        }
      }
      if inner.failing.contains(&entry.id) {
        return Err(GleanerError::ApiError("Failed to download PDF: HTTP 503".into()));
      }
    }
    std::fs::write(destination, b"%PDF-1.4\n")?;
    Ok(())
  }
}

/// A source-side entry for `id`, submitted on 2023-06-10.
pub fn entry(id: &str) -> Entry {
  Entry {
    id:         id.to_string(),
    title:      format!("Paper {id}"),
    authors:    vec!["Doe, J.".into(), "Smith, A.".into()],
    summary:    format!("  Abstract of {id}.\n"),
    categories: vec!["cs.LG".into(), "cs.AI".into()],
    published:  day(2023, 6, 10),
    pdf_url:    None,
  }
}

/// Entries for `count` consecutive ids starting at `2306.00001v1`.
pub fn entries(count: usize) -> Vec<Entry> {
  (1..=count).map(|n| entry(&format!("2306.{n:05}v1"))).collect()
}
