use super::*;

pub mod harvest;
pub mod reconcile;
pub mod status;

pub use harvest::{harvest, HarvestOptions};
pub use reconcile::reconcile;
pub use status::status;

/// Available commands for the CLI
#[derive(Subcommand, Clone)]
pub enum Commands {
  /// Walk back through time windows, downloading PDFs and recording their metadata
  Harvest(HarvestOptions),

  /// Record metadata for PDFs that are on disk but missing from the ledger
  Reconcile,

  /// Show counts of harvested records, failures and PDFs
  Status,
}
