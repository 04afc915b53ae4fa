// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a real orchestrator over a temp SQLite database,
//! the SQLite session lock, the real completion processor, and mock
//! delivery and completion adapters.

use std::sync::Arc;
use std::time::Duration;

use parley_agent::{Collaborators, CommandParser, Orchestrator, OrchestratorSettings, PassResult};
use parley_completion::{CompletionProcessor, ProcessorSettings};
use parley_config::model::{CompletionConfig, ParleyConfig};
use parley_core::traits::{ConversationStore, StalenessPolicy};
use parley_core::types::{Conversation, ConversationKey, DeviceSettings, InboundMessage};
use parley_core::ParleyError;
use parley_storage::{Database, DatabaseOptions, SqliteSessionLock, SqliteStore};

use crate::faulty_lock::FaultyLock;
use crate::mock_completion::MockCompletion;
use crate::mock_delivery::MockDelivery;

/// Device id used by harness helpers.
pub const TEST_DEVICE: &str = "dev-test";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    replies: Vec<String>,
    throttle: Duration,
    max_steps: usize,
    wait_timeout: Duration,
    flow: Option<String>,
    completion: CompletionConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            replies: Vec::new(),
            throttle: Duration::ZERO,
            max_steps: 64,
            wait_timeout: Duration::from_millis(200),
            flow: None,
            completion: CompletionConfig::default(),
        }
    }

    /// Scripted completion replies, consumed in order.
    pub fn with_replies(mut self, replies: Vec<String>) -> Self {
        self.replies = replies;
        self
    }

    /// Reply throttle. Defaults to zero so tests can send back to back.
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Flow definition stored for [`TEST_DEVICE`].
    pub fn with_flow(mut self, json: &str) -> Self {
        self.flow = Some(json.to_string());
        self
    }

    pub fn with_completion_config(mut self, config: CompletionConfig) -> Self {
        self.completion = config;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, ParleyError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| ParleyError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");
        let options = DatabaseOptions {
            busy_timeout: self.wait_timeout,
            ..DatabaseOptions::default()
        };
        let db = Database::open(&db_path.to_string_lossy(), options).await?;

        let store = Arc::new(SqliteStore::new(db.clone()));
        let lock: Arc<SqliteSessionLock> = Arc::new(SqliteSessionLock::new(
            db,
            StalenessPolicy {
                stale_after: Duration::from_secs(180),
                wait_timeout: self.wait_timeout,
            },
        ));
        let faulty_lock = Arc::new(FaultyLock::new(lock.clone()));
        let delivery = Arc::new(MockDelivery::new());
        let completion = Arc::new(MockCompletion::with_replies(self.replies));

        let mut config = ParleyConfig::default();
        config.flow.throttle_secs = self.throttle.as_secs();
        config.completion = self.completion;

        let processor = Arc::new(CompletionProcessor::new(
            completion.clone(),
            delivery.clone(),
            store.clone(),
            ProcessorSettings::from_config(&config.completion),
            &config.agent.first_stage_label,
        ));

        let settings = OrchestratorSettings {
            throttle: self.throttle,
            max_steps_per_pass: self.max_steps,
            timer_retry: self.wait_timeout,
            drain_timeout: Duration::from_secs(5),
            ..OrchestratorSettings::from_config(&config)
        };
        let orchestrator = Orchestrator::new(
            settings,
            Collaborators {
                store: store.clone(),
                lock: faulty_lock.clone(),
                delivery: delivery.clone(),
                prompts: processor,
            },
            CommandParser::from_config(&config.commands),
        );

        if let Some(flow) = self.flow {
            store.store_flow(TEST_DEVICE, &flow).await?;
        }

        Ok(TestHarness {
            orchestrator,
            store,
            lock,
            faulty_lock,
            delivery,
            completion,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock adapters and temp storage.
pub struct TestHarness {
    pub orchestrator: Arc<Orchestrator>,
    /// SQLite store (temp DB, cleaned up on drop).
    pub store: Arc<SqliteStore>,
    pub lock: Arc<SqliteSessionLock>,
    /// The lock the orchestrator sees; wraps [`TestHarness::lock`].
    pub faulty_lock: Arc<FaultyLock>,
    pub delivery: Arc<MockDelivery>,
    pub completion: Arc<MockCompletion>,
    pub config: ParleyConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A user message from `phone` to [`TEST_DEVICE`].
    pub fn inbound(phone: &str, text: &str) -> InboundMessage {
        InboundMessage {
            device_id: TEST_DEVICE.to_string(),
            instance: None,
            phone_number: phone.to_string(),
            text: Some(text.to_string()),
            media_url: None,
            sender_name: None,
            from_operator: false,
        }
    }

    pub fn key(phone: &str) -> ConversationKey {
        ConversationKey::new(phone, TEST_DEVICE)
    }

    /// Drives one full processing pass for a user message.
    pub async fn send(&self, phone: &str, text: &str) -> PassResult {
        self.orchestrator
            .handle_inbound(Self::inbound(phone, text))
            .await
    }

    /// Drives one pass for text the operator typed on the device.
    pub async fn send_operator(&self, phone: &str, text: &str) -> PassResult {
        let msg = InboundMessage {
            from_operator: true,
            ..Self::inbound(phone, text)
        };
        self.orchestrator.handle_inbound(msg).await
    }

    pub async fn import_flow(&self, json: &str) -> Result<(), ParleyError> {
        self.store.store_flow(TEST_DEVICE, json).await
    }

    pub async fn set_device(&self, settings: DeviceSettings) -> Result<(), ParleyError> {
        self.store.upsert_device(&settings).await
    }

    /// Persisted conversation state for `phone`.
    pub async fn conversation(&self, phone: &str) -> Result<Option<Conversation>, ParleyError> {
        self.store.get_conversation(&Self::key(phone)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ECHO: &str = r#"{
        "nodes": [
            {"id": "s", "type": "start"},
            {"id": "m", "type": "message", "data": {"text": "hello back"}},
            {"id": "w", "type": "user_reply"}
        ],
        "edges": [
            {"source": "s", "target": "m"},
            {"source": "m", "target": "w"}
        ]
    }"#;

    #[tokio::test]
    async fn harness_runs_a_pass_end_to_end() {
        let harness = TestHarness::builder().with_flow(ECHO).build().await.unwrap();

        let result = harness.send("601", "hi").await;

        assert_eq!(
            result,
            PassResult::Ran {
                outcome: "suspended",
                dispatched: 1
            }
        );
        assert_eq!(harness.delivery.sent_texts().await, vec!["hello back"]);
        let conv = harness.conversation("601").await.unwrap().unwrap();
        assert_eq!(conv.current_node_id.as_deref(), Some("w"));
        assert!(conv.waiting_for_reply);
    }

    #[tokio::test]
    async fn harness_without_flow_reports_no_flow() {
        let harness = TestHarness::builder().build().await.unwrap();
        assert_eq!(harness.send("601", "hi").await, PassResult::NoFlow);
        assert!(harness.conversation("601").await.unwrap().is_some());
    }
}
