//! Repair of artifacts that are on disk but missing from the ledger.
//!
//! A crash between a download and the next batch flush leaves PDFs in the artifact directory
//! with no ledger row. The [`Reconciler`] finds those by comparing file names with the ledger's
//! ids, looks each one up at the source, and appends the recovered records in a single write.
//! Nothing is downloaded: the artifact is already there.
//!
//! Reconciliation only ever adds rows, so running it twice is harmless; the second run finds
//! nothing to do.

use super::*;

/// One reconciliation pass over a storage layout.
pub struct Reconciler<'a, S: ?Sized> {
  /// Source used for metadata lookups
  source:           &'a S,
  /// Ledger to repair
  ledger:           &'a Ledger,
  /// Where the artifacts live
  layout:           &'a StorageLayout,
  /// Delay between consecutive lookups
  request_interval: Duration,
}

impl<'a, S: PaperSource + ?Sized> Reconciler<'a, S> {
  /// Prepares a pass over `layout`'s artifact directory.
  pub fn new(
    source: &'a S,
    ledger: &'a Ledger,
    layout: &'a StorageLayout,
    request_interval: Duration,
  ) -> Self {
    Self { source, ledger, layout, request_interval }
  }

  /// Ids with an artifact but no ledger row, sorted.
  pub fn missing_ids(&self) -> Vec<String> {
    let on_disk = self.layout.artifact_ids();
    let on_ledger = self.ledger.load_identities();
    info!("Artifacts on disk: {} | Records in ledger: {}", on_disk.len(), on_ledger.len());

    let mut missing: Vec<String> = on_disk.difference(&on_ledger).cloned().collect();
    missing.sort();
    missing
  }

  /// Recovers a ledger row for every missing artifact. Returns the number of rows written.
  pub async fn reconcile(&self) -> usize {
    let missing = self.missing_ids();
    if missing.is_empty() {
      info!("No missing records");
      return 0;
    }
    info!("Recovering metadata for {} artifacts", missing.len());

    let mut recovered = Vec::new();
    for (i, id) in missing.iter().enumerate() {
      if i > 0 {
        tokio::time::sleep(self.request_interval).await;
      }
      debug!("Recovering {id} ({}/{})", i + 1, missing.len());
      match self.source.lookup(id).await {
        Ok(mut entry) => {
          entry.id.clone_from(id);
          recovered.push(Record::from_entry(entry, self.layout.artifact_path(id)));
        },
        Err(e) => {
          error!("Recovery failed for {id}: {e}");
          self.ledger.append_failure(id, format!("metadata recovery failed: {e}"), Utc::now());
        },
      }
    }

    if recovered.is_empty() || !self.ledger.append_records(&recovered) {
      return 0;
    }
    info!("Recovered {} records", recovered.len());
    recovered.len()
  }
}
