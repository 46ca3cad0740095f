//! Load test orchestration
//!
//! The runner coordinates a whole load test:
//! - one controller task per scenario, each waiting for its start offset
//! - virtual-user spawning according to the scenario's executor
//! - sample collection through an mpsc channel
//! - threshold evaluation once every scenario has finished

mod scenario;
mod schedule;
mod vu;

pub use scenario::{ScenarioStats, RAMP_TICK};
pub use schedule::RampSchedule;

use crate::metrics::{AggregatedMetrics, MetricsCollector, Sample};
use crate::options::LoadOptions;
use crate::target::Target;
use crate::thresholds::{evaluate_thresholds, ThresholdReport};
use anyhow::{Context, Result};
use futures::future::join_all;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use scenario::ScenarioRun;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

/// Capacity of the VU -> collector channel
const SAMPLE_BUFFER: usize = 4096;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} {prefix:<20} [{elapsed_precise}] {pos:>8} iterations  {msg}";

/// Handle for stopping a run from outside, e.g. on Ctrl+C
#[derive(Debug, Clone)]
pub struct ShutdownHandle(broadcast::Sender<()>);

impl ShutdownHandle {
    /// Stop every scenario: no new VUs, running VUs retire gracefully
    pub fn shutdown(&self) {
        let _ = self.0.send(());
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub collector: MetricsCollector,
    pub metrics: AggregatedMetrics,
    pub thresholds: ThresholdReport,
    pub scenarios: BTreeMap<String, ScenarioStats>,
}

impl RunOutcome {
    /// True when all thresholds held
    pub fn passed(&self) -> bool {
        self.thresholds.passed()
    }

    /// True when a shutdown signal cut any scenario short
    pub fn cancelled(&self) -> bool {
        self.scenarios.values().any(|s| s.cancelled)
    }
}

/// Runs every scenario of a [`LoadOptions`] against a target
pub struct LoadRunner<T: Target> {
    options: Arc<LoadOptions>,
    target: Arc<T>,
    shutdown_tx: broadcast::Sender<()>,
    show_progress: bool,
}

impl<T: Target + 'static> LoadRunner<T> {
    /// Create a new load runner
    pub fn new(options: LoadOptions, target: T) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            options: Arc::new(options),
            target: Arc::new(target),
            shutdown_tx,
            show_progress: false,
        }
    }

    /// Draw one progress spinner per scenario on stderr
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Get a handle that can stop the run
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown_tx.clone())
    }

    /// Run the load test
    ///
    /// Returns once every scenario has ended and its VUs have exited or been
    /// aborted after their graceful-stop window.
    pub async fn run(&self) -> Result<RunOutcome> {
        self.options
            .validate()
            .context("Invalid load test options")?;
        let thresholds = self.options.thresholds()?;

        let (samples_tx, mut samples_rx) = mpsc::channel::<Sample>(SAMPLE_BUFFER);
        let collector_task = tokio::spawn(async move {
            let mut collector = MetricsCollector::new();
            while let Some(sample) = samples_rx.recv().await {
                collector.record(sample);
            }
            collector
        });

        let multi = if self.show_progress {
            MultiProgress::with_draw_target(ProgressDrawTarget::stderr())
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let target: Arc<dyn Target> = self.target.clone();
        let test_start = Instant::now();

        tracing::info!(
            scenarios = self.options.scenarios.len(),
            base_url = %self.options.base_url,
            planned_secs = self.options.scenarios.total_duration().as_secs_f64(),
            "Starting load test"
        );

        let mut handles = Vec::with_capacity(self.options.scenarios.len());
        for (name, spec) in self.options.scenarios.by_start_time() {
            let progress = multi.add(self.progress_bar(name));
            let run = ScenarioRun::new(
                name,
                spec.clone(),
                target.clone(),
                samples_tx.clone(),
                self.shutdown_tx.subscribe(),
                progress,
            );
            handles.push((name.clone(), tokio::spawn(run.run(test_start))));
        }

        // Only VUs and controllers hold senders now, so the collector ends with them
        drop(samples_tx);

        let (names, tasks): (Vec<String>, Vec<_>) = handles.into_iter().unzip();
        let mut scenarios = BTreeMap::new();
        for (name, joined) in names.into_iter().zip(join_all(tasks).await) {
            match joined {
                Ok(stats) => {
                    scenarios.insert(name, stats);
                }
                Err(e) => {
                    tracing::error!(scenario = %name, error = %e, "Scenario task failed");
                }
            }
        }

        let mut collector = collector_task
            .await
            .context("Metrics collector task failed")?;
        collector.set_elapsed(test_start.elapsed());

        let metrics = collector.aggregate();
        let report = evaluate_thresholds(&thresholds, &collector);

        tracing::info!(
            requests = metrics.http_reqs,
            iterations = metrics.iterations,
            elapsed_secs = metrics.elapsed_secs,
            thresholds_passed = report.passed(),
            "Load test finished"
        );

        Ok(RunOutcome {
            collector,
            metrics,
            thresholds: report,
            scenarios,
        })
    }

    fn progress_bar(&self, name: &str) -> ProgressBar {
        let style = ProgressStyle::with_template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let pb = ProgressBar::new_spinner()
            .with_style(style)
            .with_prefix(name.to_string());
        if self.show_progress {
            pb.enable_steady_tick(Duration::from_millis(120));
        }
        pb
    }
}

#[cfg(test)]
mod tests;
