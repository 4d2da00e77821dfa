//! The `status` command.

use super::*;

/// Function for the [`Commands::Status`] in the CLI.
pub fn status(config: &Config) -> Result<()> {
  let ledger = Ledger::new(&config.storage);
  let harvested = ledger.load_identities();
  let failed_ids = ledger.load_failed_ids();
  let outstanding: HashSet<&String> =
    failed_ids.iter().filter(|id| !harvested.contains(id.as_str())).collect();
  let artifacts = config.storage.artifact_ids();
  let unrecorded = artifacts.difference(&harvested).count();

  println!(
    "{} Records:   {} of {} target",
    style(INFO_PREFIX).cyan(),
    style(harvested.len()).green(),
    config.harvest.target_total
  );
  println!(
    "{} PDFs:      {} ({} without a record)",
    style(INFO_PREFIX).cyan(),
    style(artifacts.len()).green(),
    unrecorded
  );
  println!(
    "{} Failures:  {} logged, {} papers still missing",
    style(INFO_PREFIX).cyan(),
    failed_ids.len(),
    style(outstanding.len()).yellow()
  );
  println!("{} Ledger:    {}", style(INFO_PREFIX).cyan(), ledger.records_path().display());
  println!("{} PDF dir:   {}", style(INFO_PREFIX).cyan(), config.storage.pdf_dir.display());
  Ok(())
}
