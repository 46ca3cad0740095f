//! End-of-test console summary

use crate::metrics::{AggregatedMetrics, DurationStats};
use crate::thresholds::ThresholdReport;
use std::fmt::Write;

/// Render the summary printed after a run
pub fn render_summary(metrics: &AggregatedMetrics, thresholds: &ThresholdReport) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_summary(&mut out, metrics, thresholds);
    out
}

fn write_summary(
    out: &mut String,
    metrics: &AggregatedMetrics,
    thresholds: &ThresholdReport,
) -> std::fmt::Result {
    let rule = "=".repeat(70);

    writeln!(out, "{}", rule)?;
    writeln!(out, "   Load Test Results")?;
    writeln!(out, "{}", rule)?;
    writeln!(out)?;

    if !thresholds.outcomes.is_empty() {
        writeln!(out, "Thresholds:")?;
        for outcome in &thresholds.outcomes {
            writeln!(
                out,
                "  {} {:<20} {:<16} observed {:.2}",
                if outcome.passed { "✓" } else { "✗" },
                outcome.metric.as_str(),
                outcome.expression,
                outcome.observed,
            )?;
        }
        writeln!(out)?;
    }

    if !metrics.checks.is_empty() {
        writeln!(out, "Checks:")?;
        for (name, counts) in &metrics.checks {
            let total = counts.passed + counts.failed;
            writeln!(
                out,
                "  {} {:<24} {:>6.2}%  ✓ {}  ✗ {}",
                if counts.failed == 0 { "✓" } else { "✗" },
                name,
                percent(counts.passed, total),
                counts.passed,
                counts.failed,
            )?;
        }
        writeln!(out)?;
    }

    writeln!(out, "HTTP:")?;
    writeln!(
        out,
        "  http_reqs ..................: {} ({:.2}/s)",
        metrics.http_reqs, metrics.http_reqs_per_sec
    )?;
    writeln!(
        out,
        "  http_req_failed ............: {:.2}% ({} of {})",
        metrics.http_req_failed_rate * 100.0,
        metrics.http_req_failed,
        metrics.http_reqs
    )?;
    writeln!(
        out,
        "  http_req_duration ..........: {}",
        format_durations(&metrics.http_req_duration)
    )?;
    if !metrics.status_codes.is_empty() {
        let codes: Vec<String> = metrics
            .status_codes
            .iter()
            .map(|(status, count)| match status {
                0 => format!("no response={}", count),
                _ => format!("{}={}", status, count),
            })
            .collect();
        writeln!(out, "  status codes ...............: {}", codes.join("  "))?;
    }
    writeln!(out)?;

    writeln!(out, "Execution:")?;
    writeln!(
        out,
        "  iterations .................: {} ({:.2}/s)",
        metrics.iterations, metrics.iterations_per_sec
    )?;
    if metrics.interrupted_iterations > 0 {
        writeln!(
            out,
            "  interrupted iterations .....: {}",
            metrics.interrupted_iterations
        )?;
    }
    writeln!(out, "  elapsed ....................: {:.1}s", metrics.elapsed_secs)?;
    writeln!(out)?;

    if !metrics.scenarios.is_empty() {
        writeln!(out, "Scenarios:")?;
        writeln!(
            out,
            "  {:<20} {:>10} {:>8} {:>10} {:>10} {:>10}",
            "name", "iterations", "reqs", "failed", "p95 ms", "checks"
        )?;
        for (name, scenario) in &metrics.scenarios {
            let checks_total = scenario.checks_passed + scenario.checks_failed;
            let checks = if checks_total == 0 {
                "-".to_string()
            } else {
                format!("{:.1}%", percent(scenario.checks_passed, checks_total))
            };
            writeln!(
                out,
                "  {:<20} {:>10} {:>8} {:>10} {:>10.2} {:>10}",
                name,
                scenario.iterations,
                scenario.http_reqs,
                scenario.http_req_failed,
                scenario.http_req_duration.p95,
                checks,
            )?;
        }
        writeln!(out)?;
    }

    writeln!(
        out,
        "Result: {}",
        if thresholds.passed() {
            "PASSED"
        } else {
            "FAILED (thresholds crossed)"
        }
    )?;
    writeln!(out, "{}", rule)?;

    Ok(())
}

fn format_durations(stats: &DurationStats) -> String {
    format!(
        "avg={:.2}ms min={:.2}ms med={:.2}ms max={:.2}ms p(90)={:.2}ms p(95)={:.2}ms",
        stats.avg, stats.min, stats.med, stats.max, stats.p90, stats.p95
    )
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
