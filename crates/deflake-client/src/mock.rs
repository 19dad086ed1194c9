//! Offline transport
//!
//! Backs `--mock` runs (demos, CI dry runs, no API credits spent) and stands
//! in for the brain in tests. Records every request it receives.

use crate::client::ReportClient;
use crate::types::{HealRequest, HealResponse};
use async_trait::async_trait;
use deflake_core::Result;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Canned fix returned in mock mode
const MOCK_FIX: &str = "/* DeFlake Mock Response */\n\
                        /* The button ID changed from #submit-button to .btn-primary-2026 */\n\
                        button[data-testid='submit-btn']";

/// Transport that answers locally with a fixed response
#[derive(Debug)]
pub struct MockReportClient {
    response: HealResponse,
    calls: AtomicUsize,
    requests: Mutex<Vec<HealRequest>>,
}

impl Default for MockReportClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockReportClient {
    /// Mock answering with the canned suggestion
    pub fn new() -> Self {
        Self::with_response(HealResponse::new(json!({
            "status": "success",
            "fix": MOCK_FIX,
        })))
    }

    /// Mock answering with an arbitrary response body
    pub fn with_response(response: HealResponse) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of `heal` calls received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, oldest first
    pub fn requests(&self) -> Vec<HealRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReportClient for MockReportClient {
    async fn heal(&self, request: &HealRequest) -> Result<HealResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        tracing::info!("Mock brain answering locally (no network)");
        Ok(self.response.clone())
    }

    fn endpoint(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_requests() {
        let mock = MockReportClient::new();
        let request = HealRequest {
            error_log: "boom".to_string(),
            html_snapshot: "<p>".to_string(),
            failing_line: Some("Line 3".to_string()),
            source_code: None,
        };

        let response = mock.heal(&request).await.unwrap();
        assert!(response.is_success());
        assert!(response.fix().unwrap().as_str().unwrap().contains("submit-btn"));
        assert_eq!(mock.calls(), 1);
        assert_eq!(mock.requests(), vec![request]);
    }

    #[tokio::test]
    async fn test_mock_custom_response() {
        let mock = MockReportClient::with_response(HealResponse::new(json!({"status": "error"})));
        let request = HealRequest {
            error_log: String::new(),
            html_snapshot: String::new(),
            failing_line: None,
            source_code: None,
        };
        assert!(!mock.heal(&request).await.unwrap().is_success());
        assert_eq!(mock.endpoint(), "mock");
    }
}
