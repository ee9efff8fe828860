// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Anthropic Messages API.
//!
//! Non-streaming: the orchestrator needs whole turns (text and tool-call
//! blocks in order), not deltas. Transient errors (429, 500, 503, 529) are
//! retried once after a short delay.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, warn};
use warden_core::traits::provider::{ChatRequest, ChatResponse, LlmProvider};
use warden_core::WardenError;

use crate::types::{from_api_response, to_api_request, ApiErrorResponse, ApiResponse};

/// Base URL for the Anthropic Messages API.
const API_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

/// API version header value.
const API_VERSION: &str = "2023-06-01";

/// Anthropic-backed [`LlmProvider`].
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl AnthropicProvider {
    /// Create a provider authenticating with the given API key.
    pub fn new(api_key: &str) -> Result<Self, WardenError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| WardenError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(API_VERSION),
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| WardenError::Llm {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: API_BASE_URL.to_string(),
            max_retries: 1,
        })
    }

    /// Override the base URL (tests against a local stub).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, WardenError> {
        let api_request = to_api_request(&request);
        let mut last_error: Option<WardenError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying provider request after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = self
                .client
                .post(&self.base_url)
                .json(&api_request)
                .send()
                .await
                .map_err(|e| WardenError::Llm {
                    message: format!("HTTP request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            debug!(status = %status, attempt, "provider response received");

            if status.is_success() {
                let body: ApiResponse = response.json().await.map_err(|e| WardenError::Llm {
                    message: format!("malformed provider response: {e}"),
                    source: Some(Box::new(e)),
                })?;
                let (content, stop_reason) = from_api_response(body)?;
                debug!(blocks = content.len(), ?stop_reason, "provider round-trip complete");
                return Ok(ChatResponse {
                    content,
                    stop_reason,
                });
            }

            if is_transient_error(status) && attempt < self.max_retries {
                let body = response.text().await.unwrap_or_default();
                warn!(status = %status, body = %body, "transient error, will retry");
                last_error = Some(WardenError::Llm {
                    message: format!("API returned {status}: {body}"),
                    source: None,
                });
                continue;
            }

            // Non-transient error or exhausted retries.
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api_err) => format!(
                    "Anthropic API error ({}): {}",
                    api_err.error.type_, api_err.error.message
                ),
                Err(_) => format!("API returned {status}: {body}"),
            };
            return Err(WardenError::Llm {
                message,
                source: None,
            });
        }

        Err(last_error.unwrap_or(WardenError::Llm {
            message: "provider request failed after retries".to_string(),
            source: None,
        }))
    }
}

/// True for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503 | 529)
}
