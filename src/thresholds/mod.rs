//! Pass/fail thresholds over run metrics
//!
//! A threshold pairs a metric name with one or more expressions of the form
//! `aggregate op value`, for example `p(95)<2000` on `http_req_duration`
//! or `rate>0.99` on `checks`.

use crate::metrics::{percentile, MetricsCollector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Threshold parsing errors
#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("unknown metric '{0}'")]
    UnknownMetric(String),

    #[error("malformed expression '{0}', expected e.g. 'p(95)<2000'")]
    Malformed(String),

    #[error("unknown aggregate '{0}'")]
    UnknownAggregate(String),

    #[error("aggregate '{aggregate}' is not available on metric '{metric}'")]
    UnsupportedAggregate { metric: String, aggregate: String },
}

/// Metrics thresholds can be placed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    /// Request durations in milliseconds
    HttpReqDuration,
    /// Share of requests without a response or with a 4xx/5xx status
    HttpReqFailed,
    /// Number of requests
    HttpReqs,
    /// Share of passed checks
    Checks,
    /// Number of completed iterations
    Iterations,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::HttpReqDuration => "http_req_duration",
            MetricName::HttpReqFailed => "http_req_failed",
            MetricName::HttpReqs => "http_reqs",
            MetricName::Checks => "checks",
            MetricName::Iterations => "iterations",
        }
    }

    fn supports(&self, aggregate: &Aggregate) -> bool {
        match self {
            MetricName::HttpReqDuration => !matches!(aggregate, Aggregate::Rate),
            MetricName::HttpReqFailed | MetricName::Checks => matches!(aggregate, Aggregate::Rate),
            MetricName::HttpReqs | MetricName::Iterations => {
                matches!(aggregate, Aggregate::Count | Aggregate::Rate)
            }
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricName {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http_req_duration" => Ok(MetricName::HttpReqDuration),
            "http_req_failed" => Ok(MetricName::HttpReqFailed),
            "http_reqs" => Ok(MetricName::HttpReqs),
            "checks" => Ok(MetricName::Checks),
            "iterations" => Ok(MetricName::Iterations),
            other => Err(ThresholdError::UnknownMetric(other.to_string())),
        }
    }
}

/// How a metric's samples are reduced to one number
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregate {
    Avg,
    Min,
    Med,
    Max,
    Percentile(f64),
    /// Ratio for rate metrics, per-second for counters
    Rate,
    Count,
}

impl FromStr for Aggregate {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avg" => Ok(Aggregate::Avg),
            "min" => Ok(Aggregate::Min),
            "med" => Ok(Aggregate::Med),
            "max" => Ok(Aggregate::Max),
            "rate" => Ok(Aggregate::Rate),
            "count" => Ok(Aggregate::Count),
            _ => {
                let p = s
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .and_then(|n| n.trim().parse::<f64>().ok())
                    .filter(|p| (0.0..=100.0).contains(p))
                    .ok_or_else(|| ThresholdError::UnknownAggregate(s.to_string()))?;
                Ok(Aggregate::Percentile(p))
            }
        }
    }
}

/// Comparison operator of an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparator {
    // Two-character operators first so "<=" is not read as "<"
    const TOKENS: [(&'static str, Comparator); 6] = [
        ("<=", Comparator::Le),
        (">=", Comparator::Ge),
        ("==", Comparator::Eq),
        ("!=", Comparator::Ne),
        ("<", Comparator::Lt),
        (">", Comparator::Gt),
    ];

    pub fn holds(&self, observed: f64, limit: f64) -> bool {
        match self {
            Comparator::Lt => observed < limit,
            Comparator::Le => observed <= limit,
            Comparator::Gt => observed > limit,
            Comparator::Ge => observed >= limit,
            Comparator::Eq => observed == limit,
            Comparator::Ne => observed != limit,
        }
    }
}

/// One parsed expression such as `p(95)<2000`
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    source: String,
    pub aggregate: Aggregate,
    pub comparator: Comparator,
    pub limit: f64,
}

impl ThresholdExpr {
    pub fn parse(source: &str) -> Result<Self, ThresholdError> {
        let compact: String = source.chars().filter(|c| !c.is_whitespace()).collect();

        let (position, token, comparator) = Comparator::TOKENS
            .iter()
            .filter_map(|(token, comparator)| {
                compact.find(token).map(|position| (position, *token, *comparator))
            })
            // Leftmost operator wins; on a tie the longer token was listed first
            .min_by_key(|(position, _, _)| *position)
            .ok_or_else(|| ThresholdError::Malformed(source.to_string()))?;

        let (lhs, rhs) = (&compact[..position], &compact[position + token.len()..]);
        if lhs.is_empty() {
            return Err(ThresholdError::Malformed(source.to_string()));
        }

        let aggregate = lhs.parse::<Aggregate>()?;
        let limit = rhs
            .parse::<f64>()
            .map_err(|_| ThresholdError::Malformed(source.to_string()))?;

        Ok(Self {
            source: source.trim().to_string(),
            aggregate,
            comparator,
            limit,
        })
    }

    /// The expression as written in the options
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// All expressions placed on one metric
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: MetricName,
    pub expressions: Vec<ThresholdExpr>,
}

impl Threshold {
    pub fn parse(metric: &str, expressions: &[String]) -> Result<Self, ThresholdError> {
        let metric = metric.parse::<MetricName>()?;
        let expressions = expressions
            .iter()
            .map(|source| {
                let expr = ThresholdExpr::parse(source)?;
                if !metric.supports(&expr.aggregate) {
                    return Err(ThresholdError::UnsupportedAggregate {
                        metric: metric.to_string(),
                        aggregate: source.clone(),
                    });
                }
                Ok(expr)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            metric,
            expressions,
        })
    }
}

/// Result of evaluating one expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOutcome {
    pub metric: MetricName,
    pub expression: String,
    pub observed: f64,
    pub passed: bool,
}

/// Results of every threshold expression in a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdReport {
    pub outcomes: Vec<ThresholdOutcome>,
}

impl ThresholdReport {
    /// True when every expression held. A run without thresholds passes.
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }
}

/// Evaluate thresholds against everything collected during the run
pub fn evaluate_thresholds(thresholds: &[Threshold], collector: &MetricsCollector) -> ThresholdReport {
    let durations = collector.sorted_durations();

    let outcomes = thresholds
        .iter()
        .flat_map(|threshold| {
            let durations = &durations;
            threshold.expressions.iter().map(move |expr| {
                let observed = observe(threshold.metric, expr.aggregate, collector, durations);
                ThresholdOutcome {
                    metric: threshold.metric,
                    expression: expr.source().to_string(),
                    observed,
                    passed: expr.comparator.holds(observed, expr.limit),
                }
            })
        })
        .collect();

    ThresholdReport { outcomes }
}

fn observe(
    metric: MetricName,
    aggregate: Aggregate,
    collector: &MetricsCollector,
    durations: &[f64],
) -> f64 {
    let elapsed_secs = collector.elapsed().as_secs_f64();
    let per_second = |count: usize| {
        if elapsed_secs > 0.0 {
            count as f64 / elapsed_secs
        } else {
            0.0
        }
    };
    let share = |part: usize, whole: usize| {
        if whole == 0 {
            0.0
        } else {
            part as f64 / whole as f64
        }
    };

    match metric {
        MetricName::HttpReqDuration => match aggregate {
            Aggregate::Avg if !durations.is_empty() => {
                durations.iter().sum::<f64>() / durations.len() as f64
            }
            Aggregate::Min => durations.first().copied().unwrap_or(0.0),
            Aggregate::Max => durations.last().copied().unwrap_or(0.0),
            Aggregate::Med => percentile(durations, 50.0),
            Aggregate::Percentile(p) => percentile(durations, p),
            Aggregate::Count => durations.len() as f64,
            _ => 0.0,
        },
        MetricName::HttpReqFailed => {
            let failed = collector.requests().filter(|r| r.failed()).count();
            share(failed, collector.len())
        }
        MetricName::Checks => {
            let (passed, total) = collector
                .checks()
                .fold((0, 0), |(passed, total), c| (passed + c.passed as usize, total + 1));
            share(passed, total)
        }
        MetricName::HttpReqs => match aggregate {
            Aggregate::Rate => per_second(collector.len()),
            _ => collector.len() as f64,
        },
        MetricName::Iterations => match aggregate {
            Aggregate::Rate => per_second(collector.completed_iterations()),
            _ => collector.completed_iterations() as f64,
        },
    }
}
