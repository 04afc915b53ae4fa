// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for OpenAI-compatible chat-completions endpoints.
//!
//! Provides [`CompletionClient`] which handles request construction,
//! per-device bearer credentials and transient error retry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use parley_config::model::CompletionConfig;
use parley_core::traits::{CompletionProvider, PluginAdapter};
use parley_core::types::{
    AdapterType, CompletionRequest, CompletionResponse, HealthStatus, TokenUsage,
};
use parley_core::ParleyError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::{debug, warn};

use crate::types::{ApiErrorResponse, ChatCompletionRequest, ChatCompletionResponse};

/// Chat-completions client.
///
/// Retries 429 and 5xx responses up to `max_retries` times with a
/// one second pause between attempts.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    endpoint: String,
    default_api_key: Option<String>,
    max_retries: u32,
}

impl CompletionClient {
    pub fn new(config: &CompletionConfig) -> Result<Self, ParleyError> {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ParleyError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            default_api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn auth_header(&self, request_key: Option<&str>) -> Result<Option<HeaderValue>, ParleyError> {
        let Some(key) = request_key.or(self.default_api_key.as_deref()) else {
            return Ok(None);
        };
        HeaderValue::from_str(&format!("Bearer {key}"))
            .map(Some)
            .map_err(|e| ParleyError::Config(format!("invalid API key header value: {e}")))
    }

    /// Sends one chat-completions call and returns the first choice's content.
    pub async fn chat(&self, request: &CompletionRequest) -> Result<CompletionResponse, ParleyError> {
        let body = ChatCompletionRequest {
            model: request.model.clone(),
            messages: request.messages.clone(),
            temperature: request.temperature,
            top_p: request.top_p,
            repetition_penalty: request.repetition_penalty,
        };
        let auth = self.auth_header(request.api_key.as_deref())?;

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying completion request after transient error");
                tokio::time::sleep(CompletionConfig::RETRY_PAUSE).await;
            }

            let mut builder = self.client.post(&self.endpoint).json(&body);
            if let Some(value) = &auth {
                builder = builder.header(AUTHORIZATION, value.clone());
            }

            let started = Instant::now();
            let response = builder.send().await.map_err(|e| ParleyError::Provider {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

            let status = response.status();
            debug!(
                status = %status,
                attempt,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "completion response received"
            );

            if status.is_success() {
                let text = response.text().await.map_err(|e| ParleyError::Provider {
                    message: format!("failed to read response body: {e}"),
                    source: Some(Box::new(e)),
                })?;
                return into_completion(&text, &request.model);
            }

            if is_transient_error(status) && attempt < self.max_retries {
                let text = response.text().await.unwrap_or_default();
                warn!(status = %status, body = %text, "transient error, will retry");
                last_error = Some(ParleyError::Provider {
                    message: format!("API returned {status}: {text}"),
                    source: None,
                });
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorResponse>(&text) {
                Ok(api_err) => format!(
                    "completion API error ({}): {}",
                    api_err.error.type_.as_deref().unwrap_or("unknown"),
                    api_err.error.message
                ),
                Err(_) => format!("API returned {status}: {text}"),
            };
            return Err(ParleyError::Provider { message, source: None });
        }

        Err(last_error.unwrap_or_else(|| ParleyError::Provider {
            message: "completion request failed after retries".into(),
            source: None,
        }))
    }
}

fn into_completion(body: &str, requested_model: &str) -> Result<CompletionResponse, ParleyError> {
    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| ParleyError::Provider {
            message: format!("failed to parse API response: {e}"),
            source: Some(Box::new(e)),
        })?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ParleyError::Provider {
            message: "API response carried no choices".into(),
            source: None,
        })?;

    Ok(CompletionResponse {
        content,
        model: parsed.model.unwrap_or_else(|| requested_model.to_string()),
        usage: parsed.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        }),
    })
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 529)
}

#[async_trait]
impl PluginAdapter for CompletionClient {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Completion
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl CompletionProvider for CompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ParleyError> {
        self.chat(&request).await
    }
}
