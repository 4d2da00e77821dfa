//! The `harvest` command.

use super::*;

/// Options for [`Commands::Harvest`].
#[derive(Args, Clone, Debug)]
pub struct HarvestOptions {
  /// Oldest submission date to harvest (YYYY-MM-DD)
  #[arg(long, default_value = "2020-01-01")]
  pub global_start: String,

  /// Newest submission date to harvest (YYYY-MM-DD, default: now)
  #[arg(long)]
  pub initial_end: Option<String>,

  /// Days covered by each query window
  #[arg(long, default_value_t = 30)]
  pub window_days: u32,

  /// Skip the pass over previously failed papers
  #[arg(long)]
  pub skip_retry: bool,

  /// Record PDFs missing from the ledger once the walk is done
  #[arg(long)]
  pub reconcile: bool,

  /// Stop once the ledger holds this many records (overrides the configuration)
  #[arg(long)]
  pub target: Option<usize>,
}

/// Function for the [`Commands::Harvest`] in the CLI.
pub async fn harvest(config: &Config, options: HarvestOptions) -> Result<()> {
  let global_start = parse_date(&options.global_start)?;
  let initial_end = match options.initial_end.as_deref() {
    Some(date) => parse_date(date)?,
    None => Utc::now(),
  };

  let mut harvest_config = config.harvest.clone();
  if let Some(target) = options.target {
    harvest_config.target_total = target;
  }
  info!(
    "Global start: {} | Initial end: {} | Window days: {} | Target: {}",
    global_start.format("%Y-%m-%d"),
    initial_end.format("%Y-%m-%d %H:%M"),
    options.window_days,
    harvest_config.target_total
  );

  let source = ArxivClient::new(&harvest_config)?;
  let mut harvester =
    Harvester::new(source, Ledger::new(&config.storage), harvest_config, &config.storage)
      .with_stop_flag(interrupt_flag())
      .with_failed_retry(!options.skip_retry)
      .with_reconcile(options.reconcile);

  let planner = WindowPlanner::new(global_start, initial_end, options.window_days);
  let summary = harvester.run(planner).await;

  if summary.interrupted {
    info!("Download interrupted by user");
  }
  info!(
    "PDFs: {} | Metadata: {}",
    config.storage.pdf_dir.display(),
    config.storage.ledger_path().display()
  );
  println!("{} Download complete | {summary}", style(SUCCESS_PREFIX).green());
  Ok(())
}

/// Parses a `YYYY-MM-DD` argument as midnight UTC.
pub fn parse_date(input: &str) -> Result<DateTime<Utc>> {
  NaiveDate::parse_from_str(input, "%Y-%m-%d")
    .map(start_of_day)
    .map_err(|source| GleanerCliError::InvalidDate { input: input.to_string(), source })
}

/// Stop flag raised by the first Ctrl-C. A second one exits immediately.
fn interrupt_flag() -> Arc<AtomicBool> {
  let stop = Arc::new(AtomicBool::new(false));
  let flag = Arc::clone(&stop);
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_err() {
      warn!("Cannot listen for Ctrl-C; the harvest can only be stopped by killing it");
      return;
    }
    info!("Interrupt received; stopping after the current paper (Ctrl-C again to abort)");
    flag.store(true, Ordering::SeqCst);
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("Aborting; unsaved records will be picked up by `gleaner reconcile`");
      std::process::exit(130);
    }
  });
  stop
}
