//! The harvest engine.
//!
//! A [`Harvester`] walks the windows produced by a [`WindowPlanner`] and, for each one, pages
//! through the source's results newest-first:
//!
//! - ids already in the ledger are skipped without a download
//! - new ids are downloaded; a success becomes a [`Record`] in the in-memory batch, a failure
//!   is appended to the failure log and the walk moves on
//! - every `batch_size` processed results the batch is flushed to the ledger
//! - once the ledger holds `target_total` records the run stops
//!
//! A window whose result stream breaks off is retried with a linear backoff; every retry
//! re-runs the whole per-record pipeline, so results harvested by the failed attempt are just
//! skipped the second time. A window that keeps failing is abandoned and the walk continues
//! with the next one.
//!
//! After the walk, ids from the failure log are given another chance and, when enabled, the
//! [`Reconciler`](crate::reconcile::Reconciler) repairs artifacts missing from the ledger.
//!
//! A batch that cannot be written stays in memory and is written together with the next
//! one. If it never can be, its artifacts are still on disk for the reconciler to find.

use super::*;
use crate::reconcile::Reconciler;

/// Progress of a run, rehydrated from the ledger at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
  /// Ids present in the ledger or harvested during this run
  pub downloaded_ids:   HashSet<String>,
  /// Number of harvested records, including those from earlier runs
  pub total_downloaded: usize,
  /// The run stops once `total_downloaded` reaches this
  pub target_total:     usize,
}

impl RunState {
  /// Rebuilds the state from the records already in `ledger`.
  pub fn from_ledger(ledger: &Ledger, target_total: usize) -> Self {
    let downloaded_ids = ledger.load_identities();
    info!("Loaded {} harvested ids from {}", downloaded_ids.len(), ledger.records_path().display());
    Self { total_downloaded: downloaded_ids.len(), downloaded_ids, target_total }
  }

  /// Whether the target has been reached.
  pub fn target_reached(&self) -> bool { self.total_downloaded >= self.target_total }

  /// Whether `id` has already been harvested.
  pub fn is_known(&self, id: &str) -> bool { self.downloaded_ids.contains(id) }

  /// Counts a newly harvested id.
  fn record(&mut self, id: &str) {
    if self.downloaded_ids.insert(id.to_string()) {
      self.total_downloaded += 1;
    }
  }
}

/// What a run achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
  /// Records in the ledger (or pending) at the end of the run
  pub total_downloaded:  usize,
  /// The configured target
  pub target_total:      usize,
  /// Windows the engine started
  pub windows_processed: usize,
  /// Windows given up on after exhausting their retries
  pub windows_abandoned: usize,
  /// Ids recovered by the failed-id retry pass
  pub retried:           usize,
  /// Ledger rows added by reconciliation
  pub repaired:          usize,
  /// Whether the run was cut short by a stop request
  pub interrupted:       bool,
}

impl Display for HarvestSummary {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "Total: {}/{} | Windows processed: {} ({} abandoned) | Retried: {} | Repaired: {}",
      self.total_downloaded,
      self.target_total,
      self.windows_processed,
      self.windows_abandoned,
      self.retried,
      self.repaired
    )?;
    if self.interrupted {
      write!(f, " | Interrupted")?;
    }
    Ok(())
  }
}

/// How one pass over a window's results ended.
#[derive(Debug)]
enum Pass {
  /// The source had no more results
  Exhausted,
  /// The run stopped (target reached or stop requested)
  Stopped,
  /// The result stream broke off
  Failed(GleanerError),
}

/// Records downloaded but not yet written to the ledger.
#[derive(Debug, Default)]
struct Batch {
  /// Unsaved records, oldest first
  pending:   Vec<Record>,
  /// Results processed so far, skipped ones included
  processed: usize,
}

/// Windowed, resumable harvester.
pub struct Harvester<S> {
  /// Where papers come from
  source:         Arc<S>,
  /// Where records and failures go
  ledger:         Ledger,
  /// Tunables
  config:         HarvestConfig,
  /// Artifact locations
  layout:         StorageLayout,
  /// Progress so far
  state:          RunState,
  /// Unsaved records
  batch:          Batch,
  /// Set to request a stop at the next record boundary
  stop:           Arc<AtomicBool>,
  /// Whether to run the failed-id pass after the walk
  retry_failures: bool,
  /// Whether to reconcile after the walk
  reconcile:      bool,
}

impl<S: PaperSource> Harvester<S> {
  /// Builds a harvester and loads the ids already in `ledger`.
  ///
  /// A `batch_size` of zero is treated as one.
  pub fn new(source: S, ledger: Ledger, mut config: HarvestConfig, layout: &StorageLayout) -> Self {
    if config.batch_size == 0 {
      warn!("batch_size must be positive; flushing after every result");
      config.batch_size = 1;
    }
    let state = RunState::from_ledger(&ledger, config.target_total);
    Self {
      source: Arc::new(source),
      ledger,
      config,
      layout: layout.clone(),
      state,
      batch: Batch::default(),
      stop: Arc::new(AtomicBool::new(false)),
      retry_failures: true,
      reconcile: false,
    }
  }

  /// Shares an externally owned stop flag, e.g. one set from a signal handler.
  pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
    self.stop = stop;
    self
  }

  /// Enables or disables the failed-id retry pass (enabled by default).
  pub fn with_failed_retry(mut self, enabled: bool) -> Self {
    self.retry_failures = enabled;
    self
  }

  /// Enables or disables reconciliation after the walk (disabled by default).
  pub fn with_reconcile(mut self, enabled: bool) -> Self {
    self.reconcile = enabled;
    self
  }

  /// Handle that stops the run when set.
  pub fn stop_handle(&self) -> Arc<AtomicBool> { Arc::clone(&self.stop) }

  /// Current progress.
  pub fn state(&self) -> &RunState { &self.state }

  /// Records harvested but not yet written to the ledger.
  pub fn pending_records(&self) -> &[Record] { &self.batch.pending }

  /// Whether a stop has been requested.
  fn stop_requested(&self) -> bool { self.stop.load(Ordering::Relaxed) }

  /// Runs the whole harvest: the window walk, then the follow-up passes.
  pub async fn run(&mut self, planner: WindowPlanner) -> HarvestSummary {
    let mut summary =
      HarvestSummary { target_total: self.state.target_total, ..Default::default() };
    info!(
      "Starting harvest down to {} | Categories: {} | Target: {}",
      planner.global_floor().format("%Y-%m-%d"),
      self.config.categories.join(", "),
      self.state.target_total
    );

    if self.state.target_reached() {
      info!(
        "Already harvested {} (target: {}), nothing to do",
        self.state.total_downloaded, self.state.target_total
      );
    } else {
      for window in planner {
        if self.stop_requested() || self.state.target_reached() {
          break;
        }
        summary.windows_processed += 1;
        if !self.harvest_window(window).await {
          summary.windows_abandoned += 1;
        }
      }
      if self.state.target_reached() {
        info!("Reached target {}", self.state.target_total);
      } else if !self.stop_requested() {
        info!("No more windows");
      }

      if self.retry_failures && !self.stop_requested() && !self.state.target_reached() {
        summary.retried = self.retry_failed().await;
      }
      if self.reconcile && !self.stop_requested() {
        summary.repaired = self.reconcile().await;
      }
    }

    self.flush();
    summary.total_downloaded = self.state.total_downloaded;
    summary.interrupted = self.stop_requested();
    if summary.interrupted {
      info!("Harvest interrupted; progress saved");
    }
    info!("Harvest complete | {summary}");
    summary
  }

  /// Harvests one window, retrying it when its result stream breaks off.
  ///
  /// Returns `false` if the window was abandoned.
  pub async fn harvest_window(&mut self, window: Window) -> bool {
    info!("===== Harvesting window {window} =====");
    let query = SearchQuery::new(&self.config.categories, window);

    let mut attempt: u32 = 0;
    loop {
      match self.paginate(&query).await {
        Pass::Exhausted | Pass::Stopped => break,
        Pass::Failed(e) => {
          error!("Window {window} failed: {e}");
          self.flush();
          if attempt as usize >= self.config.max_retries {
            warn!("Abandoning window {window} after {attempt} retries");
            return false;
          }
          attempt += 1;
          let backoff = self.config.retry_backoff * attempt;
          info!(
            "Retrying window {window} (attempt {attempt}/{}) in {backoff:?}",
            self.config.max_retries
          );
          tokio::time::sleep(backoff).await;
        },
      }
    }

    self.flush();
    info!("Finished window {window} | Total: {}", self.state.total_downloaded);
    true
  }

  /// Consumes one result stream for `query`.
  async fn paginate(&mut self, query: &SearchQuery) -> Pass {
    debug!("Querying: {query}");
    let source = Arc::clone(&self.source);
    let mut results = source.search(query);
    loop {
      if self.stop_requested() || self.state.target_reached() {
        return Pass::Stopped;
      }
      match results.next().await {
        Some(Ok(entry)) => self.process_entry(entry).await,
        Some(Err(e)) => return Pass::Failed(e),
        None => return Pass::Exhausted,
      }
    }
  }

  /// Runs one search result through dedup, download and batching.
  async fn process_entry(&mut self, entry: Entry) {
    if self.state.is_known(&entry.id) {
      trace!("Skipping {}: already harvested", entry.id);
    } else {
      self.download(entry).await;
      tokio::time::sleep(self.config.request_interval).await;
    }
    self.tick();
  }

  /// Downloads the artifact for `entry` and records the outcome.
  async fn download(&mut self, entry: Entry) -> bool {
    let destination = self.layout.artifact_path(&entry.id);
    info!("Downloading {}", entry.id);
    match self.source.download(&entry, &destination).await {
      Ok(()) => {
        self.state.record(&entry.id);
        self.batch.pending.push(Record::from_entry(entry, destination));
        true
      },
      Err(e) => {
        error!("Failed {}: {e}", entry.id);
        self.ledger.append_failure(&entry.id, &e, Utc::now());
        false
      },
    }
  }

  /// Records `entry` against the artifact already on disk, without downloading it again.
  fn adopt(&mut self, entry: Entry) -> bool {
    let destination = self.layout.artifact_path(&entry.id);
    info!("Artifact for {} already on disk; recording metadata only", entry.id);
    self.state.record(&entry.id);
    self.batch.pending.push(Record::from_entry(entry, destination));
    true
  }

  /// Counts a processed result and flushes on batch boundaries.
  fn tick(&mut self) {
    self.batch.processed += 1;
    if self.batch.processed % self.config.batch_size == 0 {
      self.flush();
      info!(
        "Batch done | Processed: {} | Total: {}",
        self.batch.processed, self.state.total_downloaded
      );
    }
  }

  /// Writes pending records to the ledger. On failure they are kept for the next flush.
  fn flush(&mut self) -> bool {
    if self.batch.pending.is_empty() {
      return true;
    }
    let count = self.batch.pending.len();
    if self.ledger.append_records(&self.batch.pending) {
      info!("Saved {count} records to {}", self.ledger.records_path().display());
      self.batch.pending.clear();
      true
    } else {
      warn!("Keeping {count} unsaved records for the next flush");
      false
    }
  }

  /// Gives every id in the failure log that is still missing one more attempt.
  ///
  /// An id whose artifact is already on disk, such as one whose metadata lookup failed during
  /// reconciliation, only has its metadata recorded.
  ///
  /// Returns the number of ids recovered.
  pub async fn retry_failed(&mut self) -> usize {
    let failed_ids = self.ledger.load_failed_ids();
    if failed_ids.is_empty() {
      info!("No failed papers to retry");
      return 0;
    }
    info!("Retrying {} failed papers", failed_ids.len());

    let mut attempted = HashSet::new();
    let mut recovered = 0;
    for (i, id) in failed_ids.iter().enumerate() {
      if self.stop_requested() || self.state.target_reached() {
        break;
      }
      if self.state.is_known(id) || !attempted.insert(id.as_str()) {
        continue;
      }

      info!("Retry {id} ({}/{})", i + 1, failed_ids.len());
      match self.source.lookup(id).await {
        Ok(mut entry) => {
          entry.id.clone_from(id);
          let recorded = if self.layout.artifact_path(id).is_file() {
            self.adopt(entry)
          } else {
            self.download(entry).await
          };
          if recorded {
            recovered += 1;
          }
        },
        Err(e) => {
          error!("Retry failed {id}: {e}");
          self.ledger.append_failure(id, &e, Utc::now());
        },
      }
      self.tick();
      tokio::time::sleep(self.config.request_interval).await;
    }

    self.flush();
    info!("Retry done | Recovered: {recovered}");
    recovered
  }

  /// Flushes pending records and runs the [`Reconciler`] over the artifact directory.
  ///
  /// Skipped while records remain unsaved, since their artifacts would be repaired twice.
  pub async fn reconcile(&mut self) -> usize {
    if !self.flush() {
      warn!("Skipping reconciliation while records are unsaved");
      return 0;
    }
    let repaired =
      Reconciler::new(&*self.source, &self.ledger, &self.layout, self.config.request_interval)
        .reconcile()
        .await;
    if repaired > 0 {
      self.state = RunState::from_ledger(&self.ledger, self.state.target_total);
    }
    repaired
  }
}
