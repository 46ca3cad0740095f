//! Scenario definitions: executors, stages and entry points

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::time::Duration;

use super::OptionsError;

/// Default time VUs get to finish their iteration once a scenario ends
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// Default time retired VUs get to finish during a ramp-down
pub const DEFAULT_GRACEFUL_RAMP_DOWN: Duration = Duration::from_secs(30);

/// Upper bound for start offsets, run lengths and graceful windows
pub const MAX_TEST_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const MAX_SCENARIO_NAME_LEN: usize = 64;

/// The entry function a scenario's virtual users run on every iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum EntryPoint {
    #[serde(rename = "browsing")]
    Browsing,
    #[serde(rename = "war_ticket_v1")]
    WarTicketV1,
    #[serde(rename = "validate_heavy")]
    ValidateHeavy,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 3] = [
        EntryPoint::Browsing,
        EntryPoint::WarTicketV1,
        EntryPoint::ValidateHeavy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryPoint::Browsing => "browsing",
            EntryPoint::WarTicketV1 => "war_ticket_v1",
            EntryPoint::ValidateHeavy => "validate_heavy",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryPoint {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryPoint::ALL
            .into_iter()
            .find(|entry| entry.as_str() == s)
            .ok_or_else(|| OptionsError::UnknownEntryPoint(s.to_string()))
    }
}

impl TryFrom<String> for EntryPoint {
    type Error = OptionsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A timed segment of a ramping executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

/// How many virtual users are active over time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "executor", rename_all = "kebab-case")]
pub enum ExecutorSpec {
    /// A fixed number of VUs for the whole duration
    ConstantVus {
        vus: u32,
        #[serde(with = "humantime_serde")]
        duration: Duration,
    },

    /// VU count moves linearly toward each stage's target
    RampingVus {
        #[serde(default)]
        start_vus: u32,
        stages: Vec<Stage>,
        #[serde(default = "default_graceful_ramp_down", with = "humantime_serde")]
        graceful_ramp_down: Duration,
    },
}

impl ExecutorSpec {
    /// Declared length of the executor, excluding any graceful stop
    pub fn total_duration(&self) -> Duration {
        match self {
            ExecutorSpec::ConstantVus { duration, .. } => *duration,
            ExecutorSpec::RampingVus { stages, .. } => stages
                .iter()
                .fold(Duration::ZERO, |total, s| total.saturating_add(s.duration)),
        }
    }

    /// Highest number of VUs the executor will ever run at once
    pub fn peak_vus(&self) -> u32 {
        match self {
            ExecutorSpec::ConstantVus { vus, .. } => *vus,
            ExecutorSpec::RampingVus {
                start_vus, stages, ..
            } => stages
                .iter()
                .map(|s| s.target)
                .fold(*start_vus, u32::max),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ExecutorSpec::ConstantVus { .. } => "constant-vus",
            ExecutorSpec::RampingVus { .. } => "ramping-vus",
        }
    }
}

/// One named traffic phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    #[serde(flatten)]
    pub executor: ExecutorSpec,

    /// Offset from the start of the test
    #[serde(default, with = "humantime_serde")]
    pub start_time: Duration,

    #[serde(default = "default_graceful_stop", with = "humantime_serde")]
    pub graceful_stop: Duration,

    pub exec: EntryPoint,
}

impl ScenarioSpec {
    pub fn new(executor: ExecutorSpec, exec: EntryPoint) -> Self {
        Self {
            executor,
            start_time: Duration::ZERO,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            exec,
        }
    }

    pub fn starting_at(mut self, start_time: Duration) -> Self {
        self.start_time = start_time;
        self
    }

    /// Time window the scenario occupies relative to test start
    pub fn window(&self) -> Range<Duration> {
        self.start_time..self.start_time.saturating_add(self.executor.total_duration())
    }

    pub(crate) fn validate(&self, name: &str) -> Result<(), OptionsError> {
        let invalid = |reason: &str| OptionsError::InvalidScenario {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        match &self.executor {
            ExecutorSpec::ConstantVus { vus, duration } => {
                if *vus == 0 {
                    return Err(invalid("constant-vus needs at least 1 VU"));
                }
                if duration.is_zero() {
                    return Err(invalid("duration must be greater than zero"));
                }
            }
            ExecutorSpec::RampingVus { stages, .. } => {
                if stages.is_empty() {
                    return Err(invalid("ramping-vus needs at least one stage"));
                }
                if self.executor.total_duration().is_zero() {
                    return Err(invalid("stages must add up to more than zero"));
                }
            }
        }

        let too_long = |what: &str| {
            invalid(&format!(
                "{} exceeds {}",
                what,
                humantime::format_duration(MAX_TEST_DURATION)
            ))
        };
        let end = self.start_time.checked_add(self.executor.total_duration());
        if !end.is_some_and(|end| end <= MAX_TEST_DURATION) {
            return Err(too_long("start_time plus duration"));
        }
        if self.graceful_stop > MAX_TEST_DURATION {
            return Err(too_long("graceful_stop"));
        }
        if let ExecutorSpec::RampingVus {
            graceful_ramp_down, ..
        } = &self.executor
        {
            if *graceful_ramp_down > MAX_TEST_DURATION {
                return Err(too_long("graceful_ramp_down"));
            }
        }

        Ok(())
    }
}

fn default_graceful_stop() -> Duration {
    DEFAULT_GRACEFUL_STOP
}

fn default_graceful_ramp_down() -> Duration {
    DEFAULT_GRACEFUL_RAMP_DOWN
}

/// Scenario name to definition, unique by construction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioSet(BTreeMap<String, ScenarioSpec>);

impl ScenarioSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scenario, replacing any previous one with the same name
    pub fn insert(&mut self, name: impl Into<String>, spec: ScenarioSpec) -> Option<ScenarioSpec> {
        self.0.insert(name.into(), spec)
    }

    pub fn get(&self, name: &str) -> Option<&ScenarioSpec> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Scenarios ordered by start offset, then name
    pub fn by_start_time(&self) -> Vec<(&String, &ScenarioSpec)> {
        let mut scenarios: Vec<_> = self.0.iter().collect();
        scenarios.sort_by(|a, b| (a.1.start_time, a.0).cmp(&(b.1.start_time, b.0)));
        scenarios
    }

    /// Pairs of scenarios whose time windows intersect
    pub fn overlaps(&self) -> Vec<(String, String)> {
        let scenarios: Vec<_> = self.by_start_time();
        let mut overlaps = Vec::new();
        for (i, (a_name, a)) in scenarios.iter().enumerate() {
            let a_window = a.window();
            for (b_name, b) in &scenarios[i + 1..] {
                let b_window = b.window();
                if a_window.start < b_window.end && b_window.start < a_window.end {
                    overlaps.push(((*a_name).clone(), (*b_name).clone()));
                }
            }
        }
        overlaps
    }

    /// Time from test start until the last scenario's declared end
    pub fn total_duration(&self) -> Duration {
        self.0
            .values()
            .map(|spec| spec.window().end)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    pub(crate) fn validate(&self) -> Result<(), OptionsError> {
        if self.0.is_empty() {
            return Err(OptionsError::NoScenarios);
        }
        for (name, spec) in &self.0 {
            validate_scenario_name(name)?;
            spec.validate(name)?;
        }
        Ok(())
    }
}

impl FromIterator<(String, ScenarioSpec)> for ScenarioSet {
    fn from_iter<I: IntoIterator<Item = (String, ScenarioSpec)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Scenario names end up in metrics and export files
fn validate_scenario_name(name: &str) -> Result<(), OptionsError> {
    let invalid = |reason: String| OptionsError::InvalidScenario {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty".to_string()));
    }
    if name.len() > MAX_SCENARIO_NAME_LEN {
        return Err(invalid(format!(
            "name is longer than {} characters",
            MAX_SCENARIO_NAME_LEN
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '-' | '.'))
    {
        return Err(invalid(format!("name contains invalid character '{}'", c)));
    }
    Ok(())
}
