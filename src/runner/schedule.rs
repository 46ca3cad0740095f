//! Target VU count over time for ramping executors

use crate::options::Stage;
use std::time::Duration;

/// Piecewise-linear VU schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RampSchedule {
    start_vus: u32,
    stages: Vec<Stage>,
}

impl RampSchedule {
    pub fn new(start_vus: u32, stages: Vec<Stage>) -> Self {
        Self { start_vus, stages }
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// VUs that should be active `elapsed` after the scenario started
    ///
    /// Within a stage the count moves linearly from the previous stage's
    /// target (or `start_vus` for the first stage) toward this stage's target.
    /// Zero-length stages jump straight to their target. Past the last stage
    /// the final target holds.
    pub fn target_at(&self, elapsed: Duration) -> u32 {
        let mut stage_start = Duration::ZERO;
        let mut previous = self.start_vus;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let diff = stage.target as f64 - previous as f64;
                return (previous as f64 + diff * progress).floor().max(0.0) as u32;
            }
            stage_start = stage_end;
            previous = stage.target;
        }

        previous
    }
}
