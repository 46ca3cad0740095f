//! Ticket Surge - scenario-based load testing for the ticket service
//!
//! A run is described by [`options::LoadOptions`]: named scenarios, each an
//! executor (constant or ramping virtual users) bound to one entry journey,
//! plus pass/fail thresholds over the aggregated metrics.
//!
//! # Architecture
//!
//! - **Options**: scenario definitions, TOML loading and validation
//! - **Journeys**: the per-iteration user flows (browse, purchase, validate)
//! - **Target**: the HTTP seam the journeys send requests through
//! - **Runner**: scenario scheduling and virtual-user tasks
//! - **Metrics**: sample collection and aggregation
//! - **Thresholds**: `p(95)<2000`-style expressions and their evaluation
//! - **Output**: console summary plus JSON, CSV and Excel exports

pub mod cli;
pub mod journeys;
pub mod metrics;
pub mod options;
pub mod output;
pub mod runner;
pub mod target;
pub mod thresholds;

pub use metrics::{AggregatedMetrics, MetricsCollector};
pub use options::LoadOptions;
pub use runner::{LoadRunner, RunOutcome, ShutdownHandle};
pub use target::{HttpTarget, Target};
pub use thresholds::{Threshold, ThresholdReport};
