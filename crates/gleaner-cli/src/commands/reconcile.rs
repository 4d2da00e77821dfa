//! The `reconcile` command.

use super::*;

/// Function for the [`Commands::Reconcile`] in the CLI.
pub async fn reconcile(config: &Config) -> Result<()> {
  let source = ArxivClient::new(&config.harvest)?;
  let ledger = Ledger::new(&config.storage);
  let recovered =
    Reconciler::new(&source, &ledger, &config.storage, config.harvest.request_interval)
      .reconcile()
      .await;
  println!("{} Recovered metadata for {recovered} PDFs", style(SUCCESS_PREFIX).green());
  Ok(())
}
