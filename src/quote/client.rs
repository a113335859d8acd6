//! Aggregator client and error classification
//!
//! Quote failures are expected operating conditions, not exceptions: they
//! are classified here and land as per-entry routing status upstream.

use super::{QuoteRequest, QuoteResponse, SwapInstructionsRequest, SwapInstructionsResponse};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Classified quote failure.
///
/// `NoRoute` is the aggregator's structured "no route found" answer; every
/// other structured body and every transport failure is `Unknown`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuoteError {
    #[error("no route found")]
    NoRoute,
    #[error("quote failed: {0}")]
    Unknown(String),
}

/// Structured error body the aggregator returns on 400-class failures
#[derive(Debug, Deserialize)]
pub struct QuoteErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<String>,
}

const NO_ROUTE_CODE: &str = "COULD_NOT_FIND_ANY_ROUTE";

/// Map an HTTP failure status and body to a quote error
pub fn classify_quote_failure(status: u16, body: &str) -> QuoteError {
    if status == 400 {
        if let Ok(parsed) = serde_json::from_str::<QuoteErrorBody>(body) {
            if parsed.error_code.as_deref() == Some(NO_ROUTE_CODE) {
                return QuoteError::NoRoute;
            }
        }
    }
    QuoteError::Unknown(format!("http {}: {}", status, body))
}

/// Quote aggregator boundary
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, QuoteError>;

    async fn swap_instructions(
        &self,
        request: &SwapInstructionsRequest,
    ) -> Result<SwapInstructionsResponse, QuoteError>;
}

/// HTTP client against the aggregator's v6 API
pub struct HttpQuoteClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpQuoteClient {
    pub fn new(base_url: &str, timeout_ms: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteClient {
    async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, QuoteError> {
        let url = format!("{}/quote", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&request.query_params())
            .send()
            .await
            .map_err(|e| QuoteError::Unknown(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = classify_quote_failure(status.as_u16(), &body);
            debug!(input = %request.input_mint, %status, ?error, "quote request failed");
            return Err(error);
        }

        response
            .json()
            .await
            .map_err(|e| QuoteError::Unknown(e.to_string()))
    }

    async fn swap_instructions(
        &self,
        request: &SwapInstructionsRequest,
    ) -> Result<SwapInstructionsResponse, QuoteError> {
        let url = format!("{}/swap-instructions", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| QuoteError::Unknown(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_quote_failure(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| QuoteError::Unknown(e.to_string()))
    }
}
