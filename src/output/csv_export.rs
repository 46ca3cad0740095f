//! CSV export functionality

use crate::metrics::{AggregatedMetrics, MetricsCollector};
use anyhow::Result;
use csv::Writer;
use std::fs::File;

pub struct CsvExporter;

impl CsvExporter {
    /// Export one row per HTTP request
    pub fn export(collector: &MetricsCollector, path: &str) -> Result<()> {
        let file = File::create(path)?;
        let mut wtr = Writer::from_writer(file);

        wtr.write_record([
            "request_num",
            "timestamp",
            "scenario",
            "vu",
            "method",
            "name",
            "status",
            "duration_ms",
            "failed",
            "error_message",
        ])?;

        for (idx, request) in collector.requests().enumerate() {
            wtr.write_record(&[
                (idx + 1).to_string(),
                request.timestamp.to_rfc3339(),
                request.scenario.clone(),
                request.vu.to_string(),
                request.method.to_string(),
                request.name.clone(),
                request.status.to_string(),
                format!("{:.3}", request.duration_ms),
                request.failed().to_string(),
                request.error.clone().unwrap_or_default(),
            ])?;
        }

        wtr.flush()?;
        Ok(())
    }

    /// Export summary statistics as metric/value rows
    pub fn export_summary(metrics: &AggregatedMetrics, path: &str) -> Result<()> {
        let file = File::create(path)?;
        let mut wtr = Writer::from_writer(file);

        wtr.write_record(["metric", "value"])?;

        let d = &metrics.http_req_duration;
        let rows: Vec<(String, String)> = vec![
            ("http_reqs".into(), metrics.http_reqs.to_string()),
            ("http_reqs_per_sec".into(), format!("{:.2}", metrics.http_reqs_per_sec)),
            ("http_req_failed".into(), metrics.http_req_failed.to_string()),
            (
                "http_req_failed_rate".into(),
                format!("{:.4}", metrics.http_req_failed_rate),
            ),
            ("http_req_duration_avg_ms".into(), format!("{:.2}", d.avg)),
            ("http_req_duration_min_ms".into(), format!("{:.2}", d.min)),
            ("http_req_duration_med_ms".into(), format!("{:.2}", d.med)),
            ("http_req_duration_max_ms".into(), format!("{:.2}", d.max)),
            ("http_req_duration_p90_ms".into(), format!("{:.2}", d.p90)),
            ("http_req_duration_p95_ms".into(), format!("{:.2}", d.p95)),
            ("http_req_duration_p99_ms".into(), format!("{:.2}", d.p99)),
            ("checks_passed".into(), metrics.checks_passed.to_string()),
            ("checks_failed".into(), metrics.checks_failed.to_string()),
            ("checks_rate".into(), format!("{:.4}", metrics.checks_rate)),
            ("iterations".into(), metrics.iterations.to_string()),
            (
                "iterations_per_sec".into(),
                format!("{:.2}", metrics.iterations_per_sec),
            ),
            (
                "interrupted_iterations".into(),
                metrics.interrupted_iterations.to_string(),
            ),
            ("elapsed_secs".into(), format!("{:.2}", metrics.elapsed_secs)),
        ];

        for (metric, value) in &rows {
            wtr.write_record([metric, value])?;
        }

        for (status, count) in &metrics.status_codes {
            wtr.write_record([format!("status_{}", status), count.to_string()])?;
        }

        wtr.flush()?;
        Ok(())
    }
}
