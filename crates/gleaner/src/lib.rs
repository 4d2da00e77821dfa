//! Windowed, resumable harvesting of arXiv papers.
//!
//! `gleaner` collects bibliographic records and PDF artifacts from arXiv over long,
//! rate-limited runs and keeps its progress in plain CSV files so that a run can be stopped
//! at any point and resumed later without repeating work. It provides:
//!
//! - A [`window`] planner that walks a global date range backwards in fixed-size chunks
//! - A [`source`] abstraction over the external repository, with an arXiv implementation
//! - An append-only [`ledger`] of harvested records and failed attempts
//! - The [`harvest`] engine that ties these together with batching, deduplication and retries
//! - A [`reconcile`] pass that repairs artifacts present on disk but missing from the ledger
//!
//! # Getting Started
//!
//! ```no_run
//! use chrono::{TimeZone, Utc};
//! use gleaner::{
//!   config::Config, harvest::Harvester, ledger::Ledger, source::arxiv::ArxivClient,
//!   window::WindowPlanner,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let config = Config::default();
//!   config.storage.ensure()?;
//!
//!   let ledger = Ledger::new(&config.storage);
//!   let source = ArxivClient::new(&config.harvest)?;
//!   let mut harvester = Harvester::new(source, ledger, config.harvest.clone(), &config.storage);
//!
//!   let floor = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
//!   let planner = WindowPlanner::new(floor, Utc::now(), 30);
//!   let summary = harvester.run(planner).await;
//!   println!("{summary}");
//!   Ok(())
//! }
//! ```
//!
//! # Design
//!
//! Everything runs sequentially on a single task. The only pauses are the rate-limit delays
//! between requests and the network calls themselves. Progress is made durable in batches, and
//! the in-memory set of harvested ids is rebuilt from the ledger at start-up, so re-running the
//! harvester after a crash naturally skips completed work.

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::{
  collections::{HashSet, VecDeque},
  fmt::Display,
  path::{Path, PathBuf},
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use futures::{stream::BoxStream, StreamExt};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};
#[cfg(test)]
use {tempfile::tempdir, tracing_test::traced_test};

pub mod config;
pub mod error;
pub mod harvest;
pub mod ledger;
pub mod reconcile;
pub mod record;
pub mod source;
pub mod window;

use crate::{
  config::{HarvestConfig, StorageLayout},
  error::*,
  ledger::Ledger,
  record::{Entry, FailureEntry, Record},
  source::{PaperSource, SearchQuery},
  window::{Window, WindowPlanner},
};

/// Common traits and types for ergonomic imports.
///
/// ```no_run
/// use gleaner::prelude::*;
///
/// fn describe(err: &GleanerError) -> String { err.to_string() }
/// ```
pub mod prelude {
  pub use crate::{
    error::{GleanerError, Result},
    source::PaperSource,
  };
}
