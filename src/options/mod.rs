//! Load test options
//!
//! [`LoadOptions`] is the static description of a run: which scenarios exist,
//! when they start, how many virtual users they use, and which thresholds
//! decide pass or fail. It is built once (from the built-in
//! [`LoadOptions::ticket_rush`] profile or a TOML file) and never mutated
//! while the run is in progress.

mod scenario;

pub use scenario::{
    EntryPoint, ExecutorSpec, ScenarioSet, ScenarioSpec, Stage, DEFAULT_GRACEFUL_RAMP_DOWN,
    DEFAULT_GRACEFUL_STOP, MAX_TEST_DURATION,
};

use crate::target::{check_base_url, TargetError};
use crate::thresholds::{Threshold, ThresholdError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Address of the ticket service as seen from inside the load generator container
pub const DEFAULT_BASE_URL: &str = "http://host.docker.internal:8000";

/// Options validation and loading errors
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("no scenarios defined")]
    NoScenarios,

    #[error("invalid scenario '{name}': {reason}")]
    InvalidScenario { name: String, reason: String },

    #[error("unknown entry point '{0}', expected one of browsing, war_ticket_v1, validate_heavy")]
    UnknownEntryPoint(String),

    #[error("invalid threshold: {0}")]
    Threshold(#[from] ThresholdError),

    #[error(transparent)]
    BaseUrl(#[from] TargetError),

    #[error("failed to parse options: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read options file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Complete configuration of a load test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Base URL every journey path is joined to
    #[serde(default = "default_base_url")]
    pub base_url: String,

    pub scenarios: ScenarioSet,

    /// Metric name to threshold expressions, e.g. `http_req_duration = ["p(95)<2000"]`
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,
}

impl LoadOptions {
    /// The ticket service profile: browsing baseline, flash-sale spike on the
    /// purchase path, then a CPU stress run on ticket validation. Start
    /// offsets are chosen so the three phases run back to back.
    pub fn ticket_rush() -> Self {
        let mut scenarios = ScenarioSet::new();

        scenarios.insert(
            "normal_browsing",
            ScenarioSpec::new(
                ExecutorSpec::ConstantVus {
                    vus: 50,
                    duration: Duration::from_secs(10),
                },
                EntryPoint::Browsing,
            ),
        );

        scenarios.insert(
            "flash_sale_spike",
            ScenarioSpec::new(
                ExecutorSpec::RampingVus {
                    start_vus: 0,
                    stages: vec![
                        Stage::new(Duration::from_secs(5), 200),
                        Stage::new(Duration::from_secs(10), 500),
                        Stage::new(Duration::from_secs(5), 0),
                    ],
                    graceful_ramp_down: DEFAULT_GRACEFUL_RAMP_DOWN,
                },
                EntryPoint::WarTicketV1,
            )
            .starting_at(Duration::from_secs(10)),
        );

        scenarios.insert(
            "cpu_stress_test",
            ScenarioSpec::new(
                ExecutorSpec::ConstantVus {
                    vus: 50,
                    duration: Duration::from_secs(15),
                },
                EntryPoint::ValidateHeavy,
            )
            .starting_at(Duration::from_secs(30)),
        );

        let mut thresholds = BTreeMap::new();
        thresholds.insert(
            "http_req_duration".to_string(),
            vec!["p(95)<2000".to_string()],
        );

        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            scenarios,
            thresholds,
        }
    }

    /// Parse options from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, OptionsError> {
        Ok(toml::from_str(content)?)
    }

    /// Load options from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, OptionsError> {
        let content = std::fs::read_to_string(path).map_err(|source| OptionsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Replace the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Parsed thresholds, in metric name order
    pub fn thresholds(&self) -> Result<Vec<Threshold>, ThresholdError> {
        self.thresholds
            .iter()
            .map(|(metric, expressions)| Threshold::parse(metric, expressions))
            .collect()
    }

    /// Validate the options
    ///
    /// Overlapping scenario windows are allowed, since a composite load can
    /// be intended, but they are logged.
    pub fn validate(&self) -> Result<(), OptionsError> {
        check_base_url(&self.base_url)?;
        self.scenarios.validate()?;
        self.thresholds()?;

        for (a, b) in self.scenarios.overlaps() {
            tracing::warn!(
                first = %a,
                second = %b,
                "Scenario windows overlap, both will run concurrently"
            );
        }

        Ok(())
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::ticket_rush()
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_rush_is_valid() {
        let options = LoadOptions::ticket_rush();
        assert!(options.validate().is_ok());
        assert_eq!(options.scenarios.len(), 3);
        assert_eq!(options.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_ticket_rush_windows_do_not_overlap() {
        let options = LoadOptions::ticket_rush();
        let window = |name: &str| options.scenarios.get(name).unwrap().window();

        assert_eq!(window("normal_browsing"), Duration::ZERO..Duration::from_secs(10));
        assert_eq!(
            window("flash_sale_spike"),
            Duration::from_secs(10)..Duration::from_secs(30)
        );
        assert_eq!(
            window("cpu_stress_test"),
            Duration::from_secs(30)..Duration::from_secs(45)
        );
        assert!(options.scenarios.overlaps().is_empty());
        assert_eq!(options.scenarios.total_duration(), Duration::from_secs(45));
    }

    #[test]
    fn test_ticket_rush_entry_points() {
        let options = LoadOptions::ticket_rush();
        let exec = |name: &str| options.scenarios.get(name).unwrap().exec;

        assert_eq!(exec("normal_browsing"), EntryPoint::Browsing);
        assert_eq!(exec("flash_sale_spike"), EntryPoint::WarTicketV1);
        assert_eq!(exec("cpu_stress_test"), EntryPoint::ValidateHeavy);
    }

    #[test]
    fn test_ticket_rush_thresholds() {
        let thresholds = LoadOptions::ticket_rush().thresholds().unwrap();
        assert_eq!(thresholds.len(), 1);
        assert_eq!(thresholds[0].expressions[0].source(), "p(95)<2000");
    }

    #[test]
    fn test_from_toml() {
        let options = LoadOptions::from_toml_str(
            r#"
            base_url = "http://localhost:8000"

            [scenarios.normal_browsing]
            executor = "constant-vus"
            vus = 5
            duration = "2s"
            exec = "browsing"

            [scenarios.flash_sale_spike]
            executor = "ramping-vus"
            start_time = "2s"
            graceful_stop = "5s"
            exec = "war_ticket_v1"
            stages = [
                { duration = "1s", target = 20 },
                { duration = "500ms", target = 0 },
            ]

            [thresholds]
            http_req_duration = ["p(95)<2000", "avg<500"]
            checks = ["rate>0.99"]
            "#,
        )
        .unwrap();

        assert_eq!(options.base_url, "http://localhost:8000");
        assert!(options.validate().is_ok());

        let spike = options.scenarios.get("flash_sale_spike").unwrap();
        assert_eq!(spike.start_time, Duration::from_secs(2));
        assert_eq!(spike.graceful_stop, Duration::from_secs(5));
        assert_eq!(spike.executor.total_duration(), Duration::from_millis(1500));
        match &spike.executor {
            ExecutorSpec::RampingVus {
                start_vus,
                graceful_ramp_down,
                ..
            } => {
                assert_eq!(*start_vus, 0);
                assert_eq!(*graceful_ramp_down, DEFAULT_GRACEFUL_RAMP_DOWN);
            }
            other => panic!("expected ramping executor, got {:?}", other),
        }

        let browsing = options.scenarios.get("normal_browsing").unwrap();
        assert_eq!(browsing.graceful_stop, DEFAULT_GRACEFUL_STOP);
        assert_eq!(options.thresholds().unwrap().len(), 2);
    }

    #[test]
    fn test_from_toml_defaults_base_url() {
        let options = LoadOptions::from_toml_str(
            r#"
            [scenarios.stress]
            executor = "constant-vus"
            vus = 1
            duration = "1s"
            exec = "validate_heavy"
            "#,
        )
        .unwrap();
        assert_eq!(options.base_url, DEFAULT_BASE_URL);
        assert!(options.thresholds.is_empty());
    }

    #[test]
    fn test_from_toml_rejects_unknown_entry_point() {
        let result = LoadOptions::from_toml_str(
            r#"
            [scenarios.checkout]
            executor = "constant-vus"
            vus = 1
            duration = "1s"
            exec = "checkout"
            "#,
        );
        match result {
            Err(OptionsError::Parse(e)) => {
                assert!(e.to_string().contains("unknown entry point 'checkout'"), "{}", e)
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_huge_durations_fail_validation() {
        let options = LoadOptions::from_toml_str(
            r#"
            [scenarios.forever]
            executor = "constant-vus"
            vus = 1
            duration = "584000000000years"
            start_time = "584000000000years"
            exec = "browsing"
            "#,
        )
        .unwrap();
        assert!(matches!(
            options.validate(),
            Err(OptionsError::InvalidScenario { .. })
        ));
        // Reporting helpers saturate instead of panicking
        assert_eq!(options.scenarios.total_duration(), Duration::MAX);

        let options = LoadOptions::from_toml_str(
            r#"
            [scenarios.late]
            executor = "ramping-vus"
            start_time = "100years"
            exec = "war_ticket_v1"
            stages = [{ duration = "1s", target = 1 }]
            "#,
        )
        .unwrap();
        assert!(matches!(
            options.validate(),
            Err(OptionsError::InvalidScenario { .. })
        ));
    }

    #[test]
    fn test_oversized_graceful_windows_fail_validation() {
        let mut options = LoadOptions::ticket_rush();
        let mut spec = options.scenarios.get("normal_browsing").unwrap().clone();
        spec.graceful_stop = MAX_TEST_DURATION + Duration::from_secs(1);
        options.scenarios.insert("normal_browsing", spec);
        assert!(matches!(
            options.validate(),
            Err(OptionsError::InvalidScenario { .. })
        ));

        let mut options = LoadOptions::ticket_rush();
        let mut spec = ScenarioSpec::new(
            ExecutorSpec::ConstantVus {
                vus: 1,
                duration: MAX_TEST_DURATION,
            },
            EntryPoint::Browsing,
        );
        options.scenarios = ScenarioSet::new();
        options.scenarios.insert("week_long", spec.clone());
        assert!(options.validate().is_ok());

        spec.start_time = Duration::from_secs(1);
        options.scenarios.insert("week_long", spec);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_invalid_base_url_fails_validation() {
        for url in ["not a url", "ftp://tickets:21", "localhost:8000"] {
            let options = LoadOptions::ticket_rush().with_base_url(url);
            assert!(
                matches!(options.validate(), Err(OptionsError::BaseUrl(_))),
                "{} should be rejected",
                url
            );
        }
        let options = LoadOptions::ticket_rush().with_base_url("https://tickets.example.com");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_invalid_threshold_fails_validation() {
        let mut options = LoadOptions::ticket_rush();
        options
            .thresholds
            .insert("http_req_duration".to_string(), vec!["p95 2000".to_string()]);
        assert!(matches!(options.validate(), Err(OptionsError::Threshold(_))));
    }

    #[test]
    fn test_from_missing_file() {
        let result = LoadOptions::from_file(Path::new("/nonexistent/ticket-surge.toml"));
        assert!(matches!(result, Err(OptionsError::Io { .. })));
    }
}
