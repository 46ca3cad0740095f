//! Metrics collection and aggregation
//!
//! Virtual users emit one [`Sample`] per finished iteration. The runner's
//! collector task folds them into a [`MetricsCollector`], which can then be
//! summarized into [`AggregatedMetrics`] or queried directly by thresholds.

use crate::target::Method;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// One HTTP request issued by a virtual user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Scenario the request belongs to
    pub scenario: String,
    /// Virtual user id within the scenario
    pub vu: u64,
    pub method: Method,
    /// Request path, used as the request name
    pub name: String,
    /// HTTP status code, 0 when no response was received
    pub status: u16,
    /// Request duration in milliseconds
    pub duration_ms: f64,
    /// Transport error, if the request never got a response
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RequestRecord {
    /// A request counts as failed when it got no response or a 4xx/5xx status
    pub fn failed(&self) -> bool {
        self.status == 0 || self.status >= 400
    }
}

/// Outcome of one named check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRecord {
    pub scenario: String,
    pub name: String,
    pub passed: bool,
}

/// Everything one iteration of an entry function produced
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub scenario: String,
    pub vu: u64,
    pub requests: Vec<RequestRecord>,
    pub checks: Vec<CheckRecord>,
}

/// Message sent from virtual users and scenario controllers to the collector
#[derive(Debug, Clone)]
pub enum Sample {
    /// A completed iteration
    Iteration(IterationRecord),
    /// An iteration cut off by a graceful-stop timeout or shutdown
    Interrupted { scenario: String },
}

/// Per-scenario iteration counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationCounts {
    pub completed: usize,
    pub interrupted: usize,
}

/// Raw store of everything recorded during a run
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    requests: Vec<RequestRecord>,
    checks: Vec<CheckRecord>,
    iterations: BTreeMap<String, IterationCounts>,
    elapsed: Duration,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sample into the collector
    pub fn record(&mut self, sample: Sample) {
        match sample {
            Sample::Iteration(iteration) => {
                self.iterations
                    .entry(iteration.scenario)
                    .or_default()
                    .completed += 1;
                self.requests.extend(iteration.requests);
                self.checks.extend(iteration.checks);
            }
            Sample::Interrupted { scenario } => {
                self.iterations.entry(scenario).or_default().interrupted += 1;
            }
        }
    }

    /// Set the wall-clock length of the run, used for per-second rates
    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Number of recorded requests
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn requests(&self) -> impl Iterator<Item = &RequestRecord> {
        self.requests.iter()
    }

    pub fn checks(&self) -> impl Iterator<Item = &CheckRecord> {
        self.checks.iter()
    }

    pub fn iteration_counts(&self) -> &BTreeMap<String, IterationCounts> {
        &self.iterations
    }

    pub fn completed_iterations(&self) -> usize {
        self.iterations.values().map(|c| c.completed).sum()
    }

    pub fn interrupted_iterations(&self) -> usize {
        self.iterations.values().map(|c| c.interrupted).sum()
    }

    /// All request durations in ascending order
    pub fn sorted_durations(&self) -> Vec<f64> {
        sorted(self.requests.iter().map(|r| r.duration_ms))
    }

    /// Compute aggregated statistics
    pub fn aggregate(&self) -> AggregatedMetrics {
        let elapsed_secs = self.elapsed.as_secs_f64();
        let per_second = |count: usize| {
            if elapsed_secs > 0.0 {
                count as f64 / elapsed_secs
            } else {
                0.0
            }
        };

        let http_reqs = self.requests.len();
        let http_req_failed = self.requests.iter().filter(|r| r.failed()).count();
        let checks_passed = self.checks.iter().filter(|c| c.passed).count();
        let checks_failed = self.checks.len() - checks_passed;
        let iterations = self.completed_iterations();

        let mut status_codes = BTreeMap::new();
        for request in &self.requests {
            *status_codes.entry(request.status).or_insert(0usize) += 1;
        }

        let mut check_counts: BTreeMap<String, CheckCounts> = BTreeMap::new();
        for check in &self.checks {
            let counts = check_counts.entry(check.name.clone()).or_default();
            if check.passed {
                counts.passed += 1;
            } else {
                counts.failed += 1;
            }
        }

        let mut scenarios: BTreeMap<String, ScenarioMetrics> = self
            .iterations
            .iter()
            .map(|(name, counts)| {
                (
                    name.clone(),
                    ScenarioMetrics {
                        iterations: counts.completed,
                        interrupted_iterations: counts.interrupted,
                        ..Default::default()
                    },
                )
            })
            .collect();
        for (name, entry) in scenarios.iter_mut() {
            let requests: Vec<&RequestRecord> =
                self.requests.iter().filter(|r| &r.scenario == name).collect();
            entry.http_reqs = requests.len();
            entry.http_req_failed = requests.iter().filter(|r| r.failed()).count();
            entry.http_req_duration =
                DurationStats::from_sorted(&sorted(requests.iter().map(|r| r.duration_ms)));
            for check in self.checks.iter().filter(|c| &c.scenario == name) {
                if check.passed {
                    entry.checks_passed += 1;
                } else {
                    entry.checks_failed += 1;
                }
            }
        }

        AggregatedMetrics {
            elapsed_secs,
            http_reqs,
            http_reqs_per_sec: per_second(http_reqs),
            http_req_failed,
            http_req_failed_rate: ratio(http_req_failed, http_reqs),
            http_req_duration: DurationStats::from_sorted(&self.sorted_durations()),
            checks_passed,
            checks_failed,
            checks_rate: ratio(checks_passed, self.checks.len()),
            iterations,
            iterations_per_sec: per_second(iterations),
            interrupted_iterations: self.interrupted_iterations(),
            status_codes,
            checks: check_counts,
            scenarios,
        }
    }
}

/// Pass/fail tally for one check name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCounts {
    pub passed: usize,
    pub failed: usize,
}

/// Distribution of request durations, all values in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationStats {
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub med: f64,
    pub max: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl DurationStats {
    /// Build stats from values already sorted ascending
    pub fn from_sorted(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        Self {
            count: values.len(),
            avg: values.iter().sum::<f64>() / values.len() as f64,
            min: values[0],
            med: percentile(values, 50.0),
            max: values[values.len() - 1],
            p90: percentile(values, 90.0),
            p95: percentile(values, 95.0),
            p99: percentile(values, 99.0),
        }
    }
}

/// Per-scenario breakdown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    pub http_reqs: usize,
    pub http_req_failed: usize,
    pub http_req_duration: DurationStats,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub iterations: usize,
    pub interrupted_iterations: usize,
}

/// Aggregated metrics across the whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub elapsed_secs: f64,
    pub http_reqs: usize,
    pub http_reqs_per_sec: f64,
    pub http_req_failed: usize,
    pub http_req_failed_rate: f64,
    pub http_req_duration: DurationStats,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub checks_rate: f64,
    pub iterations: usize,
    pub iterations_per_sec: f64,
    pub interrupted_iterations: usize,
    pub status_codes: BTreeMap<u16, usize>,
    pub checks: BTreeMap<String, CheckCounts>,
    pub scenarios: BTreeMap<String, ScenarioMetrics>,
}

/// Nearest-rank percentile of sorted data: the smallest value with at least
/// `p` percent of the samples at or below it. `p(0)` is the minimum.
pub fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }
    let rank = (p * sorted_data.len() as f64 / 100.0).ceil() as usize;
    sorted_data[rank.clamp(1, sorted_data.len()) - 1]
}

fn sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.collect();
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    values
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
