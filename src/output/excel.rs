//! Excel export functionality

use crate::runner::RunOutcome;
use anyhow::Result;
use rust_xlsxwriter::*;

pub struct ExcelExporter;

impl ExcelExporter {
    /// Export a run to an Excel workbook with Summary, Scenarios and Raw Data sheets
    pub fn export(outcome: &RunOutcome, path: &str) -> Result<()> {
        let mut workbook = Workbook::new();

        let summary_sheet = workbook.add_worksheet();
        summary_sheet.set_name("Summary")?;
        Self::write_summary(summary_sheet, outcome)?;

        let scenario_sheet = workbook.add_worksheet();
        scenario_sheet.set_name("Scenarios")?;
        Self::write_scenarios(scenario_sheet, outcome)?;

        let raw_sheet = workbook.add_worksheet();
        raw_sheet.set_name("Raw Data")?;
        Self::write_raw_data(raw_sheet, outcome)?;

        workbook.save(path)?;
        Ok(())
    }

    fn write_summary(sheet: &mut Worksheet, outcome: &RunOutcome) -> Result<()> {
        let agg = &outcome.metrics;
        let d = &agg.http_req_duration;

        let bold = Format::new().set_bold();
        let number_format = Format::new().set_num_format("0.00");

        sheet.write_with_format(0, 0, "Metric", &bold)?;
        sheet.write_with_format(0, 1, "Value", &bold)?;

        let rows: [(&str, f64); 17] = [
            ("HTTP Requests", agg.http_reqs as f64),
            ("Requests/Second", agg.http_reqs_per_sec),
            ("Failed Requests", agg.http_req_failed as f64),
            ("Failed Rate (%)", agg.http_req_failed_rate * 100.0),
            ("Avg Duration (ms)", d.avg),
            ("Min Duration (ms)", d.min),
            ("Median Duration (ms)", d.med),
            ("Max Duration (ms)", d.max),
            ("P90 Duration (ms)", d.p90),
            ("P95 Duration (ms)", d.p95),
            ("P99 Duration (ms)", d.p99),
            ("Checks Passed", agg.checks_passed as f64),
            ("Checks Failed", agg.checks_failed as f64),
            ("Checks Rate (%)", agg.checks_rate * 100.0),
            ("Iterations", agg.iterations as f64),
            ("Interrupted Iterations", agg.interrupted_iterations as f64),
            ("Elapsed (s)", agg.elapsed_secs),
        ];

        let mut row = 1u32;
        for (label, value) in rows {
            sheet.write(row, 0, label)?;
            sheet.write_with_format(row, 1, value, &number_format)?;
            row += 1;
        }

        if !outcome.thresholds.outcomes.is_empty() {
            row += 1;
            sheet.write_with_format(row, 0, "Threshold", &bold)?;
            sheet.write_with_format(row, 1, "Observed", &bold)?;
            sheet.write_with_format(row, 2, "Result", &bold)?;
            row += 1;

            for threshold in &outcome.thresholds.outcomes {
                sheet.write(
                    row,
                    0,
                    format!("{} {}", threshold.metric.as_str(), threshold.expression),
                )?;
                sheet.write_with_format(row, 1, threshold.observed, &number_format)?;
                sheet.write(row, 2, if threshold.passed { "PASS" } else { "FAIL" })?;
                row += 1;
            }
        }

        sheet.set_column_width(0, 28)?;
        sheet.set_column_width(1, 15)?;

        Ok(())
    }

    fn write_scenarios(sheet: &mut Worksheet, outcome: &RunOutcome) -> Result<()> {
        let bold = Format::new().set_bold();
        let number_format = Format::new().set_num_format("0.00");

        let headers = [
            "Scenario",
            "Iterations",
            "Interrupted",
            "Requests",
            "Failed",
            "Avg (ms)",
            "P95 (ms)",
            "Checks Passed",
            "Checks Failed",
        ];
        for (col, header) in headers.iter().enumerate() {
            sheet.write_with_format(0, col as u16, *header, &bold)?;
        }

        for (idx, (name, scenario)) in outcome.metrics.scenarios.iter().enumerate() {
            let row = (idx + 1) as u32;
            sheet.write(row, 0, name.as_str())?;
            sheet.write(row, 1, scenario.iterations as f64)?;
            sheet.write(row, 2, scenario.interrupted_iterations as f64)?;
            sheet.write(row, 3, scenario.http_reqs as f64)?;
            sheet.write(row, 4, scenario.http_req_failed as f64)?;
            sheet.write_with_format(row, 5, scenario.http_req_duration.avg, &number_format)?;
            sheet.write_with_format(row, 6, scenario.http_req_duration.p95, &number_format)?;
            sheet.write(row, 7, scenario.checks_passed as f64)?;
            sheet.write(row, 8, scenario.checks_failed as f64)?;
        }

        sheet.set_column_width(0, 22)?;
        Ok(())
    }

    fn write_raw_data(sheet: &mut Worksheet, outcome: &RunOutcome) -> Result<()> {
        let bold = Format::new().set_bold();

        let headers = [
            "Request #",
            "Timestamp",
            "Scenario",
            "VU",
            "Method",
            "Name",
            "Status",
            "Duration (ms)",
            "Failed",
            "Error Message",
        ];
        for (col, header) in headers.iter().enumerate() {
            sheet.write_with_format(0, col as u16, *header, &bold)?;
        }

        for (idx, request) in outcome.collector.requests().enumerate() {
            let row = (idx + 1) as u32;
            sheet.write(row, 0, (idx + 1) as f64)?;
            sheet.write(row, 1, request.timestamp.to_rfc3339())?;
            sheet.write(row, 2, request.scenario.as_str())?;
            sheet.write(row, 3, request.vu as f64)?;
            sheet.write(row, 4, request.method.as_str())?;
            sheet.write(row, 5, request.name.as_str())?;
            sheet.write(row, 6, request.status as f64)?;
            sheet.write(row, 7, request.duration_ms)?;
            sheet.write(row, 8, request.failed())?;
            if let Some(error) = &request.error {
                sheet.write(row, 9, error.as_str())?;
            }
        }

        sheet.set_column_width(1, 28)?;
        sheet.set_column_width(5, 22)?;
        Ok(())
    }
}
