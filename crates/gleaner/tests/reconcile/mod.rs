use super::*;

const LEGACY_ID: &str = "math.AG/0601001v1";

#[traced_test]
#[tokio::test]
async fn test_reconcile_round_trip() {
  let (_dir, layout) = layout();
  let ledger = Ledger::new(&layout);

  // One artifact is already recorded, two are orphaned by a crash before the flush
  let first = MockSource::new().page(vec![entry("2306.00001v1")]);
  harvester(&first, &layout, fast_config(100, 1000)).run(single_window()).await;
  touch_artifact(&layout, "2306.00002v1");
  touch_artifact(&layout, LEGACY_ID);
  std::fs::write(layout.pdf_dir.join("2306.00003v1.pdf.part"), b"%PDF").unwrap();

  let source = MockSource::new()
    .with_catalog(entry("2306.00002v1"))
    .with_catalog(entry(LEGACY_ID));
  let reconciler = Reconciler::new(&source, &ledger, &layout, Duration::ZERO);
  assert_eq!(reconciler.missing_ids(), vec!["2306.00002v1", LEGACY_ID]);

  assert_eq!(reconciler.reconcile().await, 2);
  assert_eq!(source.lookups(), vec!["2306.00002v1", LEGACY_ID]);
  assert!(source.downloads().is_empty());
  assert_eq!(ledger_ids(&layout), vec!["2306.00001v1", "2306.00002v1", LEGACY_ID]);

  let records = ledger.load_records();
  let legacy = records.iter().find(|r| r.id == LEGACY_ID).unwrap();
  assert_eq!(legacy.artifact_path, layout.pdf_dir.join("math.AG_0601001v1.pdf"));

  // Nothing left to repair
  assert_eq!(reconciler.reconcile().await, 0);
  assert_eq!(source.lookups().len(), 2);
  assert!(logs_contain("No missing records"));
}

#[traced_test]
#[tokio::test]
async fn test_reconcile_logs_failed_lookups() {
  let (_dir, layout) = layout();
  let ledger = Ledger::new(&layout);
  touch_artifact(&layout, "2306.00009v1");
  touch_artifact(&layout, "2306.00010v1");

  let source = MockSource::new().with_catalog(entry("2306.00010v1"));
  let repaired = Reconciler::new(&source, &ledger, &layout, Duration::ZERO).reconcile().await;

  assert_eq!(repaired, 1);
  assert_eq!(ledger_ids(&layout), vec!["2306.00010v1"]);
  let failures = ledger.load_failures();
  assert_eq!(failures.len(), 1);
  assert_eq!(failures[0].id, "2306.00009v1");
  assert!(failures[0].error.starts_with("metadata recovery failed"));
}

#[traced_test]
#[tokio::test]
async fn test_reconcile_with_empty_artifact_directory() {
  let (_dir, layout) = layout();
  let ledger = Ledger::new(&layout);
  let source = MockSource::new();

  assert_eq!(Reconciler::new(&source, &ledger, &layout, Duration::ZERO).reconcile().await, 0);
  assert!(source.lookups().is_empty());
  assert!(!ledger.records_path().exists());
}

#[traced_test]
#[tokio::test]
async fn test_harvester_reconciles_after_walk() {
  let (_dir, layout) = layout();
  touch_artifact(&layout, "2306.00042v1");

  let source =
    MockSource::new().page(vec![entry("2306.00001v1")]).with_catalog(entry("2306.00042v1"));
  let summary = harvester(&source, &layout, fast_config(100, 1000))
    .with_reconcile(true)
    .run(single_window())
    .await;

  assert_eq!(summary.repaired, 1);
  assert_eq!(summary.total_downloaded, 2);
  assert_eq!(ledger_ids(&layout), vec!["2306.00001v1", "2306.00042v1"]);
}

#[traced_test]
#[tokio::test]
async fn test_retry_records_reconcile_failures_without_downloading() {
  let (_dir, layout) = layout();
  let ledger = Ledger::new(&layout);
  touch_artifact(&layout, "2306.00009v1");

  // Metadata lookup fails during reconciliation
  let offline = MockSource::new();
  assert_eq!(Reconciler::new(&offline, &ledger, &layout, Duration::ZERO).reconcile().await, 0);
  assert_eq!(ledger.load_failed_ids(), vec!["2306.00009v1"]);

  let source = MockSource::new().with_catalog(entry("2306.00009v1"));
  let mut harvester = harvester(&source, &layout, fast_config(100, 1000));
  assert_eq!(harvester.retry_failed().await, 1);

  assert_eq!(source.lookups(), vec!["2306.00009v1"]);
  assert!(source.downloads().is_empty());
  let records = ledger.load_records();
  assert_eq!(records.len(), 1);
  assert_eq!(records[0].artifact_path, layout.artifact_path("2306.00009v1"));
  assert!(logs_contain("already on disk"));
}
