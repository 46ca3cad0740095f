//! JSON export functionality

use crate::options::LoadOptions;
use crate::runner::RunOutcome;
use anyhow::Result;
use serde_json::json;
use std::fs::File;

pub struct JsonExporter;

impl JsonExporter {
    /// Export options, summary, thresholds and raw samples to a JSON file
    pub fn export(outcome: &RunOutcome, options: &LoadOptions, path: &str) -> Result<()> {
        let raw_requests: Vec<_> = outcome
            .collector
            .requests()
            .enumerate()
            .map(|(idx, r)| {
                json!({
                    "request_num": idx + 1,
                    "scenario": r.scenario,
                    "vu": r.vu,
                    "method": r.method,
                    "name": r.name,
                    "status": r.status,
                    "duration_ms": r.duration_ms,
                    "failed": r.failed(),
                    "error": r.error,
                    "timestamp": r.timestamp.to_rfc3339(),
                })
            })
            .collect();

        let raw_checks: Vec<_> = outcome.collector.checks().collect();

        let output = json!({
            "options": options,
            "summary": outcome.metrics,
            "thresholds": {
                "passed": outcome.thresholds.passed(),
                "outcomes": outcome.thresholds.outcomes,
            },
            "raw_data": {
                "requests": raw_requests,
                "checks": raw_checks,
            },
        });

        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, &output)?;

        Ok(())
    }
}
