// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock delivery gateway for deterministic testing.
//!
//! `MockDelivery` captures every outbound message for assertions and can be
//! switched into a failing mode to exercise delivery error paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use parley_core::traits::adapter::PluginAdapter;
use parley_core::traits::delivery::DeliveryGateway;
use parley_core::types::{AdapterType, DeliveryReceipt, HealthStatus, OutboundMessage};
use parley_core::ParleyError;

/// A delivery gateway that records sends instead of calling a provider.
pub struct MockDelivery {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    failing: AtomicBool,
}

impl MockDelivery {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failing: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent send fail with a delivery error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All messages accepted so far, in send order.
    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Text bodies of the accepted messages.
    pub async fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|m| m.text.clone())
            .collect()
    }

    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }
}

impl Default for MockDelivery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockDelivery {
    fn name(&self) -> &str {
        "mock-delivery"
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
impl DeliveryGateway for MockDelivery {
    async fn send(&self, msg: OutboundMessage) -> Result<DeliveryReceipt, ParleyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ParleyError::Delivery {
                message: "mock delivery failure".into(),
                source: None,
            });
        }
        let mut sent = self.sent.lock().await;
        sent.push(msg);
        Ok(DeliveryReceipt {
            delivered: true,
            provider_message_id: Some(format!("mock-msg-{}", sent.len())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::ConversationKey;

    #[tokio::test]
    async fn captures_sent_messages() {
        let delivery = MockDelivery::new();
        let key = ConversationKey::new("601", "dev");
        let receipt = delivery
            .send(OutboundMessage::text(&key, "hello"))
            .await
            .unwrap();

        assert!(receipt.delivered);
        assert_eq!(receipt.provider_message_id.as_deref(), Some("mock-msg-1"));
        assert_eq!(delivery.sent_texts().await, vec!["hello"]);
    }

    #[tokio::test]
    async fn failing_mode_rejects_sends() {
        let delivery = MockDelivery::new();
        delivery.set_failing(true);
        let key = ConversationKey::new("601", "dev");

        let err = delivery
            .send(OutboundMessage::text(&key, "hello"))
            .await
            .unwrap_err();

        assert!(matches!(err, ParleyError::Delivery { .. }));
        assert_eq!(delivery.sent_count().await, 0);
    }
}
