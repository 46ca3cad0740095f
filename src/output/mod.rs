//! Output formats for load test results

pub mod csv_export;
pub mod excel;
pub mod json_export;
pub mod summary;

pub use csv_export::CsvExporter;
pub use excel::ExcelExporter;
pub use json_export::JsonExporter;
pub use summary::render_summary;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::metrics::{CheckRecord, IterationRecord, MetricsCollector, RequestRecord, Sample};
    use crate::runner::RunOutcome;
    use crate::target::Method;
    use crate::thresholds::ThresholdReport;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn request(scenario: &str, method: Method, name: &str, status: u16, ms: f64) -> RequestRecord {
        RequestRecord {
            scenario: scenario.to_string(),
            vu: 1,
            method,
            name: name.to_string(),
            status,
            duration_ms: ms,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Three requests across two scenarios, one failed check
    pub fn sample_outcome() -> RunOutcome {
        let mut collector = MetricsCollector::new();
        collector.record(Sample::Iteration(IterationRecord {
            scenario: "normal_browsing".to_string(),
            vu: 1,
            requests: vec![request("normal_browsing", Method::Get, "/matches", 200, 12.0)],
            checks: vec![],
        }));
        collector.record(Sample::Iteration(IterationRecord {
            scenario: "flash_sale_spike".to_string(),
            vu: 1,
            requests: vec![request("flash_sale_spike", Method::Post, "/buy/v1/5", 201, 40.0)],
            checks: vec![],
        }));
        collector.record(Sample::Iteration(IterationRecord {
            scenario: "cpu_stress_test".to_string(),
            vu: 1,
            requests: vec![request(
                "cpu_stress_test",
                Method::Get,
                "/validate-ticket/999",
                503,
                80.0,
            )],
            checks: vec![CheckRecord {
                scenario: "cpu_stress_test".to_string(),
                name: "status 200".to_string(),
                passed: false,
            }],
        }));
        collector.set_elapsed(Duration::from_secs(2));

        RunOutcome {
            metrics: collector.aggregate(),
            collector,
            thresholds: ThresholdReport::default(),
            scenarios: BTreeMap::new(),
        }
    }
}
