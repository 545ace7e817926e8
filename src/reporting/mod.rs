//! Delivery of error reports to a remote collector.
//!
//! Reporting is a best-effort side channel. The handler dispatches reports
//! without waiting for them and discards every failure; only a success-class
//! response marks the log entry as reported.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorEnvelope};
use crate::host::Site;

/// Request body sent to the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub error: ErrorEnvelope,
    pub user_agent: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorReport {
    /// Builds the report for `error` as dispatched from `site` at `now`.
    pub fn new(error: &AppError, site: &Site, now: DateTime<Utc>) -> Self {
        Self {
            error: error.to_envelope(),
            user_agent: site.user_agent.clone(),
            url: site.url.clone(),
            timestamp: now,
        }
    }
}

/// Errors from delivering a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// No endpoint is configured.
    #[error("no reporting endpoint configured")]
    NotConfigured,

    /// The request never produced a response.
    #[error("report transport failed: {0}")]
    Transport(String),

    /// The collector answered with a non-success status.
    #[error("report rejected with HTTP {status}")]
    Rejected { status: u16 },

    /// The sink could not be set up.
    #[error("report sink misconfigured: {0}")]
    Client(String),
}

pub type ReportResult<T> = Result<T, ReportError>;

/// A destination for error reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Delivers one report. `Ok` means the collector accepted it.
    async fn deliver(&self, endpoint: &str, report: &ErrorReport) -> ReportResult<()>;
}

/// Default request timeout for [`HttpReportSink`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs reports as JSON. Any 2xx response counts as accepted.
#[derive(Debug, Clone)]
pub struct HttpReportSink {
    client: Client,
}

impl Default for HttpReportSink {
    fn default() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl HttpReportSink {
    /// Creates a sink whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> ReportResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("faultline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReportError::Client(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn deliver(&self, endpoint: &str, report: &ErrorReport) -> ReportResult<()> {
        let response = self
            .client
            .post(endpoint)
            .json(report)
            .send()
            .await
            .map_err(|e| ReportError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_report_body_shape() {
        let error = AppError::network("upstream down").with_code("UPSTREAM");
        let site = Site::new("app://orders", "faultline-test");
        let now = Utc::now();

        let value = serde_json::to_value(ErrorReport::new(&error, &site, now)).unwrap();

        assert_eq!(value["error"]["kind"], "network");
        assert_eq!(value["error"]["code"], "UPSTREAM");
        assert_eq!(value["userAgent"], "faultline-test");
        assert_eq!(value["url"], "app://orders");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ReportError::Rejected { status: 503 }.to_string(),
            "report rejected with HTTP 503"
        );
        assert_eq!(
            ReportError::NotConfigured.to_string(),
            "no reporting endpoint configured"
        );
    }

    #[test]
    fn test_http_sink_builds() {
        let sink = HttpReportSink::new(Duration::from_secs(1)).unwrap();
        assert_eq!(sink.name(), "http");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let sink = HttpReportSink::with_client(client);
        let report = ErrorReport::new(
            &AppError::new("x"),
            &Site::new("app://x", "test"),
            Utc::now(),
        );

        let result = sink.deliver("http://127.0.0.1:9/report", &report).await;

        assert!(matches!(result, Err(ReportError::Transport(_))));
    }
}
