use super::*;
use crate::common::entries;

#[traced_test]
#[tokio::test]
async fn test_single_window_harvest() {
  let (_dir, layout) = layout();
  let source = MockSource::new().page(entries(3));
  let mut harvester = harvester(&source, &layout, fast_config(100, 1000));

  let summary = harvester.run(single_window()).await;

  assert_eq!(source.queries(), vec!["(cat:cs.LG) AND submittedDate:[20230608 TO 20230615]"]);
  assert_eq!(source.downloads(), vec!["2306.00001v1", "2306.00002v1", "2306.00003v1"]);
  assert_eq!(summary.total_downloaded, 3);
  assert_eq!(summary.windows_processed, 1);
  assert!(!summary.interrupted);

  let records = Ledger::new(&layout).load_records();
  assert_eq!(records.len(), 3);
  assert_eq!(records[0].abstract_text, "Abstract of 2306.00001v1.");
  assert_eq!(records[0].artifact_path, layout.artifact_path("2306.00001v1"));
  assert!(has_artifact(&layout, "2306.00003v1"));
  assert!(logs_contain("Harvest complete"));
}

#[traced_test]
#[tokio::test]
async fn test_target_already_met_issues_no_queries() {
  let (_dir, layout) = layout();
  let first = MockSource::new().page(entries(2));
  harvester(&first, &layout, fast_config(100, 1000)).run(single_window()).await;

  let source = MockSource::new().page(entries(5));
  let summary = harvester(&source, &layout, fast_config(100, 2)).run(single_window()).await;

  assert!(source.queries().is_empty());
  assert!(source.downloads().is_empty());
  assert_eq!(summary.total_downloaded, 2);
  assert_eq!(summary.windows_processed, 0);
  assert!(logs_contain("nothing to do"));
}

#[traced_test]
#[tokio::test]
async fn test_known_ids_are_skipped() {
  let (_dir, layout) = layout();
  let first = MockSource::new().page(entries(1));
  harvester(&first, &layout, fast_config(100, 1000)).run(single_window()).await;

  let source = MockSource::new().page(entries(2));
  let summary = harvester(&source, &layout, fast_config(100, 1000)).run(single_window()).await;

  assert_eq!(source.downloads(), vec!["2306.00002v1"]);
  assert_eq!(summary.total_downloaded, 2);
  assert_eq!(ledger_ids(&layout), vec!["2306.00001v1", "2306.00002v1"]);
}

#[traced_test]
#[tokio::test]
async fn test_rerun_is_idempotent() {
  let (_dir, layout) = layout();
  for _ in 0..2 {
    let source = MockSource::new().page(entries(4));
    harvester(&source, &layout, fast_config(3, 1000)).run(single_window()).await;
  }

  assert_eq!(Ledger::new(&layout).load_records().len(), 4);
  assert_eq!(ledger_ids(&layout).len(), 4);
}

#[traced_test]
#[tokio::test]
async fn test_batches_flush_every_batch_size_records() {
  let (_dir, layout) = layout();
  let source = MockSource::new().page(entries(5)).observe(Ledger::new(&layout));
  harvester(&source, &layout, fast_config(2, 1000)).run(single_window()).await;

  // Never more than `batch_size` records are held back
  assert_eq!(source.ledger_sizes(), vec![0, 0, 2, 2, 4]);
  assert_eq!(ledger_ids(&layout).len(), 5);
}

#[traced_test]
#[tokio::test]
async fn test_target_reached_mid_window() {
  let (_dir, layout) = layout();
  let source = MockSource::new().page(entries(5));
  let summary = harvester(&source, &layout, fast_config(100, 2)).run(single_window()).await;

  assert_eq!(source.downloads().len(), 2);
  assert_eq!(summary.total_downloaded, 2);
  assert_eq!(ledger_ids(&layout).len(), 2);
  assert!(logs_contain("Reached target 2"));
}

#[traced_test]
#[tokio::test]
async fn test_failed_download_is_logged_and_skipped() {
  let (_dir, layout) = layout();
  let source = MockSource::new().page(entries(3)).failing("2306.00002v1");
  let summary = harvester(&source, &layout, fast_config(100, 1000))
    .with_failed_retry(false)
    .run(single_window())
    .await;

  assert_eq!(summary.total_downloaded, 2);
  assert_eq!(ledger_ids(&layout), vec!["2306.00001v1", "2306.00003v1"]);
  assert!(!has_artifact(&layout, "2306.00002v1"));

  let failures = Ledger::new(&layout).load_failures();
  assert_eq!(failures.len(), 1);
  assert_eq!(failures[0].id, "2306.00002v1");
  assert!(failures[0].error.contains("HTTP 503"));
}

#[traced_test]
#[tokio::test]
async fn test_window_retry_does_not_double_count() {
  let (_dir, layout) = layout();
  let papers = entries(3);
  let source = MockSource::new()
    .script(vec![
      Step::Paper(papers[0].clone()),
      Step::Paper(papers[1].clone()),
      Step::Break("connection reset".into()),
    ])
    .page(papers.clone());
  let summary = harvester(&source, &layout, fast_config(100, 1000)).run(single_window()).await;

  assert_eq!(source.queries().len(), 2);
  assert_eq!(source.downloads(), vec!["2306.00001v1", "2306.00002v1", "2306.00003v1"]);
  assert_eq!(summary.total_downloaded, 3);
  assert_eq!(summary.windows_abandoned, 0);
  assert_eq!(Ledger::new(&layout).load_records().len(), 3);
  assert!(logs_contain("Retrying window"));
}

#[traced_test]
#[tokio::test]
async fn test_abandoned_window_does_not_stop_the_walk() {
  let (_dir, layout) = layout();
  let broken = || vec![Step::Break("HTTP 503".into())];
  // Two windows; the first fails its initial attempt and both retries
  let source = MockSource::new()
    .script(broken())
    .script(broken())
    .script(broken())
    .page(entries(1));
  let planner = WindowPlanner::new(day(2023, 6, 1), day(2023, 6, 15), 7);
  let summary = harvester(&source, &layout, fast_config(100, 1000)).run(planner).await;

  let queries = source.queries();
  assert_eq!(queries.len(), 4);
  assert!(queries[3].ends_with("submittedDate:[20230601 TO 20230607]"));
  assert_eq!(summary.windows_processed, 2);
  assert_eq!(summary.windows_abandoned, 1);
  assert_eq!(ledger_ids(&layout), vec!["2306.00001v1"]);
  assert!(logs_contain("Abandoning window"));
}

#[traced_test]
#[tokio::test]
async fn test_retry_failed_recovers_ids() {
  let (_dir, layout) = layout();
  let papers = entries(3);
  let source = MockSource::new()
    .page(papers.clone())
    .failing("2306.00002v1")
    .with_catalog(papers[1].clone());
  let mut harvester =
    harvester(&source, &layout, fast_config(100, 1000)).with_failed_retry(false);
  harvester.run(single_window()).await;
  assert_eq!(Ledger::new(&layout).load_failed_ids(), vec!["2306.00002v1"]);

  source.heal("2306.00002v1");
  let recovered = harvester.retry_failed().await;

  assert_eq!(recovered, 1);
  assert_eq!(source.lookups(), vec!["2306.00002v1"]);
  assert_eq!(harvester.state().total_downloaded, 3);
  assert_eq!(ledger_ids(&layout).len(), 3);

  // Already harvested now, so a second pass has nothing to do
  assert_eq!(harvester.retry_failed().await, 0);
  assert_eq!(source.lookups().len(), 1);
}

#[traced_test]
#[tokio::test]
async fn test_retry_pass_runs_after_walk() {
  let (_dir, layout) = layout();
  let papers = entries(2);
  let source = MockSource::new().page(papers.clone()).failing("2306.00002v1");
  let summary = harvester(&source, &layout, fast_config(100, 1000)).run(single_window()).await;

  // Still failing: the lookup misses the catalog and is logged again
  assert_eq!(summary.retried, 0);
  assert_eq!(source.lookups(), vec!["2306.00002v1"]);
  assert_eq!(Ledger::new(&layout).load_failed_ids().len(), 2);
}

#[traced_test]
#[tokio::test]
async fn test_interrupt_flushes_and_stops() {
  let (_dir, layout) = layout();
  let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
  let source = MockSource::new().page(entries(5)).stop_after(2, Arc::clone(&stop));
  let mut harvester =
    harvester(&source, &layout, fast_config(100, 1000)).with_stop_flag(Arc::clone(&stop));

  let summary = harvester.run(single_window()).await;

  assert!(summary.interrupted);
  assert!(stop.load(Ordering::SeqCst));
  assert_eq!(source.downloads().len(), 2);
  assert!(source.lookups().is_empty());
  assert_eq!(ledger_ids(&layout).len(), 2);
  assert!(harvester.pending_records().is_empty());
  assert!(logs_contain("Harvest interrupted"));
}

#[traced_test]
#[tokio::test]
async fn test_unsaved_batch_is_kept_and_written_later() {
  let dir = tempdir().unwrap();
  let layout = StorageLayout::with_root(dir.path());
  // Only the artifact directory exists, so ledger writes fail
  std::fs::create_dir_all(&layout.pdf_dir).unwrap();

  let source = MockSource::new().page(entries(2));
  let mut harvester = harvester(&source, &layout, fast_config(100, 1000));
  let first = Window { start: day(2023, 6, 8), end: day(2023, 6, 15) };
  assert!(harvester.harvest_window(first).await);
  assert_eq!(harvester.pending_records().len(), 2);
  assert!(logs_contain("Keeping 2 unsaved records"));

  std::fs::create_dir_all(&layout.metadata_dir).unwrap();
  let second = Window { start: day(2023, 6, 1), end: day(2023, 6, 7) };
  assert!(harvester.harvest_window(second).await);
  assert!(harvester.pending_records().is_empty());
  assert_eq!(ledger_ids(&layout), vec!["2306.00001v1", "2306.00002v1"]);
}

#[traced_test]
#[tokio::test]
async fn test_zero_batch_size_flushes_every_result() {
  let (_dir, layout) = layout();
  let source = MockSource::new().page(entries(3)).observe(Ledger::new(&layout));
  let summary = harvester(&source, &layout, fast_config(0, 1000)).run(single_window()).await;

  assert_eq!(summary.total_downloaded, 3);
  assert_eq!(source.ledger_sizes(), vec![0, 1, 2]);
  assert_eq!(ledger_ids(&layout).len(), 3);
  assert!(logs_contain("batch_size must be positive"));
}
