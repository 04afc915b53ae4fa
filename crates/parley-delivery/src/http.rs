// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One messaging provider reached over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use parley_config::model::ProviderEndpoint;
use parley_core::traits::{DeliveryGateway, PluginAdapter};
use parley_core::types::{AdapterType, DeliveryReceipt, HealthStatus, MediaKind, OutboundMessage};
use parley_core::ParleyError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Body posted to `{base_url}/messages`.
#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    device_id: &'a str,
    to: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_type: Option<MediaKind>,
}

/// Provider reply. Every field is optional; a bare 2xx counts as delivered.
#[derive(Debug, Default, Deserialize)]
struct SendResponse {
    #[serde(default)]
    delivered: Option<bool>,
    #[serde(default, alias = "message_id")]
    id: Option<String>,
}

/// Delivery through a single HTTP messaging provider.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    name: String,
    client: reqwest::Client,
    endpoint: String,
}

impl HttpProvider {
    pub fn new(endpoint: &ProviderEndpoint, timeout: Duration) -> Result<Self, ParleyError> {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        if let Some(key) = &endpoint.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                    ParleyError::Config(format!(
                        "invalid API key for delivery provider {}: {e}",
                        endpoint.name
                    ))
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ParleyError::Delivery {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            name: endpoint.name.clone(),
            client,
            endpoint: format!("{}/messages", endpoint.base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl PluginAdapter for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Delivery
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl DeliveryGateway for HttpProvider {
    async fn send(&self, msg: OutboundMessage) -> Result<DeliveryReceipt, ParleyError> {
        let body = SendRequest {
            device_id: &msg.device_id,
            to: &msg.recipient,
            text: msg.text.as_deref(),
            media_url: msg.media_url.as_deref(),
            media_type: msg.media_url.as_ref().map(|_| msg.media_kind),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ParleyError::Delivery {
                message: format!("{}: HTTP request failed: {e}", self.name),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        debug!(provider = %self.name, status = %status, recipient = %msg.recipient, "delivery response received");

        if !status.is_success() {
            return Err(ParleyError::Delivery {
                message: format!("{} returned {status}: {text}", self.name),
                source: None,
            });
        }

        let parsed: SendResponse = serde_json::from_str(&text).unwrap_or_default();
        Ok(DeliveryReceipt {
            delivered: parsed.delivered.unwrap_or(true),
            provider_message_id: parsed.id,
        })
    }
}
