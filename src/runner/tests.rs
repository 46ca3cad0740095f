//! Tests for the LoadRunner
//!
//! All tests run on a paused tokio clock: the mock target "takes" its latency
//! by sleeping, so virtual time advances deterministically and multi-second
//! scenarios finish instantly.

use super::*;
use crate::options::{EntryPoint, ExecutorSpec, ScenarioSet, ScenarioSpec, Stage};
use crate::target::{HttpCall, Response, TargetError};

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Mock Target
// ============================================================================

struct MockTarget {
    status: u16,
    latency: Duration,
    origin: Instant,
    calls: Mutex<Vec<(Duration, HttpCall)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTarget {
    fn new(status: u16, latency: Duration) -> Self {
        Self {
            status,
            latency,
            origin: Instant::now(),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Target for MockTarget {
    async fn send(&self, call: &HttpCall) -> Result<Response, TargetError> {
        self.calls
            .lock()
            .unwrap()
            .push((self.origin.elapsed(), call.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(Response {
            status: self.status,
            duration: self.latency,
        })
    }

    fn base_url(&self) -> &str {
        "http://mock"
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn constant(vus: u32, duration: Duration, exec: EntryPoint) -> ScenarioSpec {
    ScenarioSpec::new(ExecutorSpec::ConstantVus { vus, duration }, exec)
}

fn options_with(scenarios: Vec<(&str, ScenarioSpec)>, thresholds: &[(&str, &str)]) -> LoadOptions {
    let scenarios: ScenarioSet = scenarios
        .into_iter()
        .map(|(name, spec)| (name.to_string(), spec))
        .collect();
    let mut options = LoadOptions {
        base_url: "http://mock".to_string(),
        scenarios,
        thresholds: BTreeMap::new(),
    };
    for (metric, expr) in thresholds {
        options
            .thresholds
            .entry(metric.to_string())
            .or_default()
            .push(expr.to_string());
    }
    options
}

// ============================================================================
// Constant executor
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_browsing_iterations_follow_think_time() {
    let options = options_with(
        vec![(
            "normal_browsing",
            constant(1, Duration::from_secs(3), EntryPoint::Browsing),
        )],
        &[],
    );
    let runner = LoadRunner::new(options, MockTarget::new(200, Duration::from_millis(10)));

    let outcome = runner.run().await.unwrap();

    // Iterations start at 0s, 1.01s and 2.02s; retirement at 3s lands in think time
    assert_eq!(outcome.metrics.iterations, 3);
    assert_eq!(outcome.metrics.http_reqs, 3);
    assert_eq!(outcome.metrics.interrupted_iterations, 0);
    assert!(outcome.collector.requests().all(|r| r.name == "/matches"));
    assert!(outcome.passed());
    assert!(!outcome.cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_validate_heavy_runs_back_to_back() {
    let options = options_with(
        vec![(
            "cpu_stress_test",
            constant(2, Duration::from_secs(1), EntryPoint::ValidateHeavy),
        )],
        &[],
    );
    let runner = LoadRunner::new(options, MockTarget::new(200, Duration::from_millis(10)));

    let outcome = runner.run().await.unwrap();

    // No think time: each VU completes one call per 10ms of latency
    let iterations = outcome.metrics.iterations;
    assert!((200..=202).contains(&iterations), "got {}", iterations);
    assert_eq!(outcome.metrics.checks_passed, iterations);
    assert_eq!(outcome.metrics.checks_failed, 0);
    assert_eq!(outcome.scenarios["cpu_stress_test"].peak_vus, 2);
}

#[tokio::test(start_paused = true)]
async fn test_validate_heavy_against_failing_service() {
    let options = options_with(
        vec![(
            "cpu_stress_test",
            constant(3, Duration::from_millis(500), EntryPoint::ValidateHeavy),
        )],
        &[("checks", "rate>0.99")],
    );
    let runner = LoadRunner::new(options, MockTarget::new(503, Duration::from_millis(10)));

    let outcome = runner.run().await.unwrap();

    assert!(outcome.metrics.checks_failed > 0);
    assert_eq!(outcome.metrics.checks_passed, 0);
    assert_eq!(outcome.metrics.http_req_failed, outcome.metrics.http_reqs);
    assert!(!outcome.passed());
}

// ============================================================================
// Scheduling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_scenarios_start_at_their_offsets() {
    let target = MockTarget::new(200, Duration::from_millis(10));
    let options = options_with(
        vec![
            (
                "normal_browsing",
                constant(2, Duration::from_secs(1), EntryPoint::Browsing),
            ),
            (
                "flash_sale_spike",
                constant(2, Duration::from_secs(1), EntryPoint::WarTicketV1)
                    .starting_at(Duration::from_secs(2)),
            ),
        ],
        &[],
    );
    let runner = LoadRunner::new(options, target);

    let outcome = runner.run().await.unwrap();

    let calls = runner.target.calls.lock().unwrap().clone();
    let first_purchase = calls
        .iter()
        .filter(|(_, call)| call.path == "/buy/v1/5")
        .map(|(at, _)| *at)
        .min()
        .unwrap();
    let last_browse = calls
        .iter()
        .filter(|(_, call)| call.path == "/matches")
        .map(|(at, _)| *at)
        .max()
        .unwrap();

    assert!(first_purchase >= Duration::from_secs(2));
    assert!(last_browse < Duration::from_secs(1));
    assert_eq!(outcome.scenarios.len(), 2);
    assert!(outcome.metrics.scenarios["flash_sale_spike"].iterations > 0);
}

#[tokio::test(start_paused = true)]
async fn test_ramping_executor_follows_stages() {
    let options = options_with(
        vec![(
            "flash_sale_spike",
            ScenarioSpec::new(
                ExecutorSpec::RampingVus {
                    start_vus: 0,
                    stages: vec![
                        Stage::new(Duration::from_secs(1), 10),
                        Stage::new(Duration::from_secs(1), 0),
                    ],
                    graceful_ramp_down: Duration::from_secs(1),
                },
                EntryPoint::WarTicketV1,
            ),
        )],
        &[],
    );
    let runner = LoadRunner::new(options, MockTarget::new(200, Duration::from_millis(10)));

    let outcome = runner.run().await.unwrap();

    let stats = outcome.scenarios["flash_sale_spike"];
    assert!(stats.peak_vus <= 10);
    assert!(stats.peak_vus >= 8, "peak was {}", stats.peak_vus);
    assert_eq!(stats.interrupted, 0);
    assert!(runner.target.max_in_flight.load(Ordering::SeqCst) <= 10);
    assert!(outcome.metrics.iterations > 0);
    assert!(outcome
        .collector
        .requests()
        .all(|r| r.name == "/buy/v1/5" && r.method == crate::target::Method::Post));
}

#[tokio::test(start_paused = true)]
async fn test_graceful_stop_interrupts_slow_iterations() {
    let mut spec = constant(2, Duration::from_millis(100), EntryPoint::ValidateHeavy);
    spec.graceful_stop = Duration::from_millis(50);
    let options = options_with(vec![("slow", spec)], &[]);

    // Every call takes far longer than duration + graceful stop
    let runner = LoadRunner::new(options, MockTarget::new(200, Duration::from_secs(10)));

    let outcome = runner.run().await.unwrap();

    assert_eq!(outcome.metrics.iterations, 0);
    assert_eq!(outcome.metrics.interrupted_iterations, 2);
    assert_eq!(outcome.scenarios["slow"].interrupted, 2);
}

// ============================================================================
// Shutdown & thresholds
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_all_scenarios() {
    let options = options_with(
        vec![
            (
                "normal_browsing",
                constant(5, Duration::from_secs(600), EntryPoint::Browsing),
            ),
            (
                "later",
                constant(5, Duration::from_secs(10), EntryPoint::Browsing)
                    .starting_at(Duration::from_secs(900)),
            ),
        ],
        &[],
    );
    let runner = LoadRunner::new(options, MockTarget::new(200, Duration::from_millis(10)));
    let handle = runner.shutdown_handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.shutdown();
    });

    let started = Instant::now();
    let outcome = runner.run().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(outcome.cancelled());
    assert!(outcome.scenarios["later"].cancelled);
    assert_eq!(outcome.scenarios["later"].vus_spawned, 0);
    assert!(outcome.metrics.iterations > 0);
}

#[tokio::test(start_paused = true)]
async fn test_latency_threshold() {
    let options = options_with(
        vec![(
            "cpu_stress_test",
            constant(1, Duration::from_millis(200), EntryPoint::ValidateHeavy),
        )],
        &[("http_req_duration", "p(95)<2000")],
    );

    let fast = LoadRunner::new(options.clone(), MockTarget::new(200, Duration::from_millis(20)));
    assert!(fast.run().await.unwrap().passed());

    let slow = LoadRunner::new(options, MockTarget::new(200, Duration::from_millis(2500)));
    let outcome = slow.run().await.unwrap();
    assert!(!outcome.passed());
    assert_eq!(outcome.thresholds.outcomes[0].observed, 2500.0);
}

#[tokio::test]
async fn test_invalid_options_are_rejected() {
    let options = options_with(vec![], &[]);
    let runner = LoadRunner::new(options, MockTarget::new(200, Duration::ZERO));
    assert!(runner.run().await.is_err());
}
