//! Per-scenario executor control

use super::schedule::RampSchedule;
use super::vu::{VirtualUser, VuHandle};
use crate::journeys::{journey_for, Journey};
use crate::metrics::Sample;
use crate::options::{ExecutorSpec, ScenarioSpec};
use crate::target::Target;
use indicatif::ProgressBar;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, timeout_at, Instant, MissedTickBehavior};

/// How often a ramping executor re-evaluates its VU target
pub const RAMP_TICK: Duration = Duration::from_millis(100);

/// Counters a scenario reports back to the runner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScenarioStats {
    /// Total VUs spawned over the scenario's lifetime
    pub vus_spawned: u64,
    /// Highest number of simultaneously active VUs
    pub peak_vus: usize,
    /// Iterations aborted after the graceful window ran out
    pub interrupted: usize,
    /// True when a shutdown signal cut the scenario short
    pub cancelled: bool,
}

/// Drives one scenario from its start offset until its last VU exits
pub(crate) struct ScenarioRun {
    name: Arc<str>,
    spec: ScenarioSpec,
    journey: Arc<dyn Journey>,
    target: Arc<dyn Target>,
    samples: mpsc::Sender<Sample>,
    shutdown: broadcast::Receiver<()>,
    progress: ProgressBar,
    next_vu_id: u64,
    stats: ScenarioStats,
}

impl ScenarioRun {
    pub fn new(
        name: &str,
        spec: ScenarioSpec,
        target: Arc<dyn Target>,
        samples: mpsc::Sender<Sample>,
        shutdown: broadcast::Receiver<()>,
        progress: ProgressBar,
    ) -> Self {
        let journey = journey_for(spec.exec);
        Self {
            name: Arc::from(name),
            spec,
            journey,
            target,
            samples,
            shutdown,
            progress,
            next_vu_id: 1,
            stats: ScenarioStats::default(),
        }
    }

    /// Wait for the start offset, then run the executor to completion
    pub async fn run(mut self, test_start: Instant) -> ScenarioStats {
        let start_at = test_start + self.spec.start_time;

        tokio::select! {
            biased;

            _ = self.shutdown.recv() => {
                tracing::info!(scenario = %self.name, "Shutdown before scenario start");
                self.stats.cancelled = true;
                self.progress.finish_with_message("cancelled");
                return self.stats;
            }
            _ = sleep_until(start_at) => {}
        }

        tracing::info!(
            scenario = %self.name,
            executor = self.spec.executor.kind(),
            exec = %self.spec.exec,
            "Scenario started"
        );

        let executor = self.spec.executor.clone();
        match executor {
            ExecutorSpec::ConstantVus { vus, duration } => {
                self.run_constant(vus, start_at + duration).await
            }
            ExecutorSpec::RampingVus {
                start_vus,
                stages,
                graceful_ramp_down,
            } => {
                let schedule = RampSchedule::new(start_vus, stages);
                self.run_ramping(schedule, start_at, graceful_ramp_down)
                    .await
            }
        }

        tracing::info!(
            scenario = %self.name,
            vus_spawned = self.stats.vus_spawned,
            peak_vus = self.stats.peak_vus,
            interrupted = self.stats.interrupted,
            "Scenario finished"
        );
        self.progress.finish_with_message("done");

        self.stats
    }

    async fn run_constant(&mut self, vus: u32, deadline: Instant) {
        let active: Vec<VuHandle> = (0..vus).map(|_| self.spawn_vu()).collect();
        self.note_active(active.len());

        tokio::select! {
            biased;

            _ = self.shutdown.recv() => {
                tracing::info!(scenario = %self.name, "Shutdown signal received");
                self.stats.cancelled = true;
            }
            _ = sleep_until(deadline) => {}
        }

        self.drain(active, self.spec.graceful_stop).await;
    }

    async fn run_ramping(
        &mut self,
        schedule: RampSchedule,
        started_at: Instant,
        graceful_ramp_down: Duration,
    ) {
        let end = started_at + schedule.total_duration();
        let mut active: Vec<VuHandle> = Vec::new();
        let mut retiring: Vec<(VuHandle, Instant)> = Vec::new();

        let mut ticker = tokio::time::interval(RAMP_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.recv() => {
                    tracing::info!(scenario = %self.name, "Shutdown signal received");
                    self.stats.cancelled = true;
                    break;
                }
                _ = ticker.tick() => {}
            }

            let now = Instant::now();
            if now >= end {
                break;
            }

            let target = schedule.target_at(now.saturating_duration_since(started_at)) as usize;
            while active.len() < target {
                active.push(self.spawn_vu());
            }
            while active.len() > target {
                // Newest VUs leave first
                if let Some(vu) = active.pop() {
                    vu.retire();
                    retiring.push((vu, now + graceful_ramp_down));
                }
            }
            self.note_active(active.len());

            for _ in 0..reap(&mut retiring, now) {
                self.record_interrupted().await;
            }
        }

        // Ramp-down stragglers keep their own deadline; the rest get graceful_stop
        for (vu, deadline) in retiring {
            self.abort_after(vu, deadline).await;
        }
        self.drain(active, self.spec.graceful_stop).await;
    }

    fn spawn_vu(&mut self) -> VuHandle {
        let id = self.next_vu_id;
        self.next_vu_id += 1;
        self.stats.vus_spawned += 1;

        let (vu, retire) = VirtualUser::new(
            id,
            self.name.clone(),
            self.journey.clone(),
            self.target.clone(),
            self.samples.clone(),
            self.progress.clone(),
        );
        vu.spawn(retire)
    }

    fn note_active(&mut self, active: usize) {
        self.stats.peak_vus = self.stats.peak_vus.max(active);
        self.progress.set_message(format!("{} VUs", active));
    }

    /// Retire every VU and give them `grace` to finish their iteration
    async fn drain(&mut self, vus: Vec<VuHandle>, grace: Duration) {
        for vu in &vus {
            vu.retire();
        }
        let deadline = Instant::now() + grace;
        for vu in vus {
            self.abort_after(vu, deadline).await;
        }
    }

    async fn abort_after(&mut self, mut vu: VuHandle, deadline: Instant) {
        if timeout_at(deadline, &mut vu.task).await.is_err() {
            tracing::warn!(
                scenario = %self.name,
                vu = vu.id,
                "Iteration did not finish within the graceful stop window"
            );
            vu.task.abort();
            self.record_interrupted().await;
        }
    }

    async fn record_interrupted(&mut self) {
        self.stats.interrupted += 1;
        let _ = self
            .samples
            .send(Sample::Interrupted {
                scenario: self.name.to_string(),
            })
            .await;
    }
}

/// Drop finished ramp-down VUs and abort those past their deadline.
/// Returns how many were aborted.
fn reap(retiring: &mut Vec<(VuHandle, Instant)>, now: Instant) -> usize {
    let mut aborted = 0;
    retiring.retain(|(vu, deadline)| {
        if vu.task.is_finished() {
            false
        } else if now >= *deadline {
            vu.task.abort();
            aborted += 1;
            false
        } else {
            true
        }
    });
    aborted
}
