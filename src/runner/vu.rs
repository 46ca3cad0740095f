//! Virtual user loop

use crate::journeys::{Iteration, Journey};
use crate::metrics::{CheckRecord, IterationRecord, RequestRecord, Sample};
use crate::target::Target;
use chrono::Utc;
use indicatif::ProgressBar;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// A virtual user runs its scenario's journey in a loop:
/// **iterate -> report -> think -> repeat**, until it is retired.
///
/// Retirement is only observed between iterations and during think time, so
/// an iteration that has started always runs to completion unless the
/// scenario controller aborts the task after its graceful-stop window.
pub(crate) struct VirtualUser {
    id: u64,
    scenario: Arc<str>,
    journey: Arc<dyn Journey>,
    target: Arc<dyn Target>,
    samples: mpsc::Sender<Sample>,
    retire: watch::Receiver<bool>,
    progress: ProgressBar,
}

/// Controller-side handle of a running VU
pub(crate) struct VuHandle {
    pub id: u64,
    retire: watch::Sender<bool>,
    pub task: JoinHandle<()>,
}

impl VuHandle {
    /// Ask the VU to stop after its current iteration
    pub fn retire(&self) {
        let _ = self.retire.send(true);
    }
}

impl VirtualUser {
    pub fn new(
        id: u64,
        scenario: Arc<str>,
        journey: Arc<dyn Journey>,
        target: Arc<dyn Target>,
        samples: mpsc::Sender<Sample>,
        progress: ProgressBar,
    ) -> (Self, watch::Sender<bool>) {
        let (retire_tx, retire_rx) = watch::channel(false);
        let vu = Self {
            id,
            scenario,
            journey,
            target,
            samples,
            retire: retire_rx,
            progress,
        };
        (vu, retire_tx)
    }

    /// Spawn the VU onto the runtime
    pub fn spawn(self, retire: watch::Sender<bool>) -> VuHandle {
        let id = self.id;
        let task = tokio::spawn(self.run());
        VuHandle { id, retire, task }
    }

    async fn run(mut self) {
        tracing::debug!(
            scenario = %self.scenario,
            vu = self.id,
            journey = self.journey.name(),
            "VU started"
        );
        let mut iterations = 0u64;

        loop {
            if *self.retire.borrow() {
                break;
            }

            let iteration = self.journey.iterate(self.target.as_ref()).await;
            iterations += 1;
            self.progress.inc(1);

            if self.samples.send(self.record(iteration)).await.is_err() {
                tracing::debug!(scenario = %self.scenario, vu = self.id, "Sample channel closed");
                break;
            }

            match self.journey.think_time() {
                Some(pause) => {
                    tokio::select! {
                        biased;

                        changed = self.retire.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(pause) => {}
                    }
                }
                // No think time: hand the worker thread back before looping
                None => tokio::task::yield_now().await,
            }
        }

        tracing::debug!(
            scenario = %self.scenario,
            vu = self.id,
            iterations,
            "VU finished"
        );
    }

    fn record(&self, iteration: Iteration) -> Sample {
        let scenario = self.scenario.to_string();
        let timestamp = Utc::now();

        let requests = iteration
            .exchanges
            .into_iter()
            .map(|exchange| RequestRecord {
                scenario: scenario.clone(),
                vu: self.id,
                method: exchange.method,
                name: exchange.path,
                status: exchange.status,
                duration_ms: exchange.duration.as_secs_f64() * 1000.0,
                error: exchange.error,
                timestamp,
            })
            .collect();

        let checks = iteration
            .checks
            .into_iter()
            .map(|check| CheckRecord {
                scenario: scenario.clone(),
                name: check.name,
                passed: check.passed,
            })
            .collect();

        Sample::Iteration(IterationRecord {
            scenario,
            vu: self.id,
            requests,
            checks,
        })
    }
}
