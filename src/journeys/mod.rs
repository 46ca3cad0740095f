//! Entry functions run by virtual users
//!
//! Each journey performs one iteration of traffic against the target and
//! reports what it did. Journeys hold no per-call state, so one instance is
//! shared by every VU of a scenario. Pausing between iterations is left to
//! the VU loop, which sleeps for [`Journey::think_time`] after each call.

use crate::options::EntryPoint;
use crate::target::{HttpCall, Method, Target};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Match id the flash-sale spike keeps trying to buy
pub const FLASH_SALE_MATCH_ID: u32 = 5;

/// Ticket id hammered by the validation stress test
pub const HEAVY_TICKET_ID: u32 = 999;

/// Name of the status check recorded by [`ValidateHeavy`]
pub const STATUS_200_CHECK: &str = "status 200";

/// One request as seen from inside a journey
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub method: Method,
    pub path: String,
    /// HTTP status, 0 when no response arrived
    pub status: u16,
    pub duration: Duration,
    pub error: Option<String>,
}

impl Exchange {
    /// Send a call and capture its outcome, success or not
    pub async fn capture(target: &dyn Target, call: HttpCall) -> Self {
        let start = Instant::now();
        match target.send(&call).await {
            Ok(response) => Self {
                method: call.method,
                path: call.path,
                status: response.status,
                duration: response.duration,
                error: None,
            },
            Err(e) => {
                tracing::debug!(call = %call, error = %e, "Request got no response");
                Self {
                    method: call.method,
                    path: call.path,
                    status: 0,
                    duration: start.elapsed(),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// A named boolean assertion about a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub passed: bool,
}

/// What one iteration produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Iteration {
    pub exchanges: Vec<Exchange>,
    pub checks: Vec<Check>,
}

/// An entry function
#[async_trait]
pub trait Journey: Send + Sync {
    /// Run one iteration against the target
    async fn iterate(&self, target: &dyn Target) -> Iteration;

    /// Pause after each iteration, `None` to loop back immediately
    fn think_time(&self) -> Option<Duration>;

    fn name(&self) -> &str;
}

/// Baseline browsing: list matches, then idle for a second
#[derive(Debug, Clone, Default)]
pub struct Browsing;

#[async_trait]
impl Journey for Browsing {
    async fn iterate(&self, target: &dyn Target) -> Iteration {
        Iteration {
            exchanges: vec![Exchange::capture(target, HttpCall::get("/matches")).await],
            checks: Vec::new(),
        }
    }

    fn think_time(&self) -> Option<Duration> {
        Some(Duration::from_secs(1))
    }

    fn name(&self) -> &str {
        "browsing"
    }
}

/// Flash-sale purchase attempt on the write-heavy path
///
/// The response is not validated; purchase failures show up in the
/// `http_req_failed` rate and the status code breakdown.
#[derive(Debug, Clone)]
pub struct WarTicketV1 {
    match_id: u32,
}

impl WarTicketV1 {
    pub fn new(match_id: u32) -> Self {
        Self { match_id }
    }

    fn call(&self) -> HttpCall {
        HttpCall::post(format!("/buy/v1/{}", self.match_id))
    }
}

impl Default for WarTicketV1 {
    fn default() -> Self {
        Self::new(FLASH_SALE_MATCH_ID)
    }
}

#[async_trait]
impl Journey for WarTicketV1 {
    async fn iterate(&self, target: &dyn Target) -> Iteration {
        Iteration {
            exchanges: vec![Exchange::capture(target, self.call()).await],
            checks: Vec::new(),
        }
    }

    fn think_time(&self) -> Option<Duration> {
        Some(Duration::from_millis(100))
    }

    fn name(&self) -> &str {
        "war_ticket_v1"
    }
}

/// CPU stress on ticket validation, with no pause between calls
#[derive(Debug, Clone)]
pub struct ValidateHeavy {
    ticket_id: u32,
}

impl ValidateHeavy {
    pub fn new(ticket_id: u32) -> Self {
        Self { ticket_id }
    }

    fn call(&self) -> HttpCall {
        HttpCall::get(format!("/validate-ticket/{}", self.ticket_id))
    }
}

impl Default for ValidateHeavy {
    fn default() -> Self {
        Self::new(HEAVY_TICKET_ID)
    }
}

#[async_trait]
impl Journey for ValidateHeavy {
    async fn iterate(&self, target: &dyn Target) -> Iteration {
        let exchange = Exchange::capture(target, self.call()).await;
        let check = Check {
            name: STATUS_200_CHECK.to_string(),
            passed: exchange.status == 200,
        };

        Iteration {
            exchanges: vec![exchange],
            checks: vec![check],
        }
    }

    fn think_time(&self) -> Option<Duration> {
        None
    }

    fn name(&self) -> &str {
        "validate_heavy"
    }
}

/// Journey implementing an entry point
pub fn journey_for(entry: EntryPoint) -> Arc<dyn Journey> {
    match entry {
        EntryPoint::Browsing => Arc::new(Browsing),
        EntryPoint::WarTicketV1 => Arc::new(WarTicketV1::default()),
        EntryPoint::ValidateHeavy => Arc::new(ValidateHeavy::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{Response, TargetError};
    use std::sync::Mutex;

    // Records every call and answers with a fixed status
    struct MockTarget {
        status: Option<u16>,
        calls: Mutex<Vec<HttpCall>>,
    }

    impl MockTarget {
        fn responding(status: u16) -> Self {
            Self {
                status: Some(status),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn unreachable() -> Self {
            Self {
                status: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<HttpCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Target for MockTarget {
        async fn send(&self, call: &HttpCall) -> Result<Response, TargetError> {
            self.calls.lock().unwrap().push(call.clone());
            match self.status {
                Some(status) => Ok(Response {
                    status,
                    duration: Duration::from_millis(5),
                }),
                None => Err(TargetError::Connect("connection refused".to_string())),
            }
        }

        fn base_url(&self) -> &str {
            "http://mock"
        }
    }

    #[tokio::test]
    async fn test_browsing_lists_matches_then_waits_one_second() {
        let target = MockTarget::responding(200);
        let journey = Browsing;

        for _ in 0..3 {
            let iteration = journey.iterate(&target).await;
            assert_eq!(iteration.exchanges.len(), 1);
            assert!(iteration.checks.is_empty());
        }

        assert_eq!(target.calls(), vec![HttpCall::get("/matches"); 3]);
        assert_eq!(journey.think_time(), Some(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_war_ticket_posts_purchase_without_validation() {
        let target = MockTarget::responding(500);
        let journey = WarTicketV1::default();

        let iteration = journey.iterate(&target).await;

        assert_eq!(target.calls(), vec![HttpCall::post("/buy/v1/5")]);
        assert_eq!(iteration.exchanges[0].status, 500);
        assert!(iteration.checks.is_empty());
        assert_eq!(journey.think_time(), Some(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn test_validate_heavy_checks_status_200() {
        let journey = ValidateHeavy::default();
        assert_eq!(journey.think_time(), None);

        let ok = MockTarget::responding(200);
        let iteration = journey.iterate(&ok).await;
        assert_eq!(ok.calls(), vec![HttpCall::get("/validate-ticket/999")]);
        assert_eq!(
            iteration.checks,
            vec![Check {
                name: STATUS_200_CHECK.to_string(),
                passed: true
            }]
        );

        for status in [201, 204, 503] {
            let target = MockTarget::responding(status);
            let iteration = journey.iterate(&target).await;
            assert!(!iteration.checks[0].passed, "status {} must fail", status);
        }
    }

    #[tokio::test]
    async fn test_validate_heavy_fails_check_without_response() {
        let target = MockTarget::unreachable();
        let iteration = ValidateHeavy::default().iterate(&target).await;

        assert_eq!(iteration.exchanges[0].status, 0);
        assert!(iteration.exchanges[0].error.is_some());
        assert!(!iteration.checks[0].passed);
    }

    #[test]
    fn test_journey_for_entry_points() {
        for entry in EntryPoint::ALL {
            assert_eq!(journey_for(entry).name(), entry.as_str());
        }
    }
}
