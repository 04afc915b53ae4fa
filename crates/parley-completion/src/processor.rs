// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Completion Response Processor: prompt a model, parse its reply and
//! dispatch the resulting messages.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parley_config::model::{CompletionConfig, DeviceOverride};
use parley_core::traits::{
    CompletionProvider, ConversationStore, DeliveryGateway, PromptExecutor, PromptOutcome,
};
use parley_core::types::{ChatMessage, CompletionRequest, Conversation, OutboundMessage, PromptSpec};
use parley_core::ParleyError;
use tracing::{debug, info, warn};

use crate::grouping::{group_parts, Dispatch};
use crate::parse::ReplyParser;

/// Appended to every node prompt so replies follow the parseable envelope.
pub const RESPONSE_FORMAT: &str = r#"Reply ONLY with a JSON object of this exact shape and nothing else:
{"Stage": "<current stage of the conversation>", "Response": [{"type": "text", "content": "<message>", "Jenis": "onemessage"}]}
- "type" is "text" or "image"; for "image" the "content" is the image URL.
- Set "Jenis": "onemessage" on consecutive text parts that belong in a single chat bubble; omit it to send a part on its own.
- Do not wrap the object in code fences."#;

/// Sampling parameters and credential defaults.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub default_model: String,
    pub default_api_key: Option<String>,
    pub temperature: f64,
    pub top_p: f64,
    pub repetition_penalty: f64,
    pub overrides: HashMap<String, DeviceOverride>,
}

impl ProcessorSettings {
    pub fn from_config(config: &CompletionConfig) -> Self {
        Self {
            default_model: config.default_model.clone(),
            default_api_key: config.api_key.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            repetition_penalty: config.repetition_penalty,
            overrides: config
                .device_overrides
                .iter()
                .map(|o| (o.device_id.clone(), o.clone()))
                .collect(),
        }
    }
}

/// Model and credential chosen for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
    pub model: String,
    pub api_key: Option<String>,
}

pub struct CompletionProcessor {
    provider: Arc<dyn CompletionProvider>,
    delivery: Arc<dyn DeliveryGateway>,
    store: Arc<dyn ConversationStore>,
    settings: ProcessorSettings,
    parser: ReplyParser,
}

impl CompletionProcessor {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        delivery: Arc<dyn DeliveryGateway>,
        store: Arc<dyn ConversationStore>,
        settings: ProcessorSettings,
        first_stage_label: &str,
    ) -> Self {
        Self {
            provider,
            delivery,
            store,
            settings,
            parser: ReplyParser::new(first_stage_label),
        }
    }

    /// Resolves model and credential for a device.
    ///
    /// Order: configured override, then the device row, then defaults. A
    /// model pinned by the node wins over all of them.
    pub async fn resolve_model(
        &self,
        device_id: &str,
        pinned: Option<&str>,
    ) -> Result<ModelChoice, ParleyError> {
        let defaults = &self.settings;
        let mut choice = if let Some(o) = defaults.overrides.get(device_id) {
            ModelChoice {
                model: o.model.clone(),
                api_key: o.api_key.clone().or_else(|| defaults.default_api_key.clone()),
            }
        } else {
            let device = self.store.device_settings(device_id).await?.unwrap_or_default();
            ModelChoice {
                model: device.model.unwrap_or_else(|| defaults.default_model.clone()),
                api_key: device.api_key.or_else(|| defaults.default_api_key.clone()),
            }
        };
        if let Some(model) = pinned.filter(|m| !m.trim().is_empty()) {
            choice.model = model.to_string();
        }
        Ok(choice)
    }

    fn build_request(
        &self,
        choice: ModelChoice,
        conversation: &Conversation,
        prompt: &PromptSpec,
        user_text: &str,
    ) -> CompletionRequest {
        CompletionRequest {
            model: choice.model,
            messages: vec![
                ChatMessage::system(format!("{}\n\n{}", prompt.prompt.trim(), RESPONSE_FORMAT)),
                ChatMessage::assistant(conversation.conv_last.clone()),
                ChatMessage::user(user_text),
            ],
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
            repetition_penalty: self.settings.repetition_penalty,
            api_key: choice.api_key,
        }
    }

    async fn call_model(&self, request: CompletionRequest) -> Result<String, ParleyError> {
        let model = request.model.clone();
        let response = self.provider.complete(request).await.inspect_err(|e| {
            warn!(model = %model, error = %e, "completion call failed");
        })?;
        if let Some(usage) = response.usage {
            debug!(
                model = %response.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion usage"
            );
        }
        Ok(response.content)
    }
}

#[async_trait]
impl PromptExecutor for CompletionProcessor {
    async fn run_prompt(
        &self,
        conversation: &mut Conversation,
        prompt: &PromptSpec,
        user_text: &str,
    ) -> Result<PromptOutcome, ParleyError> {
        let key = conversation.key.clone();
        let choice = self.resolve_model(&key.device_id, prompt.model.as_deref()).await?;
        let request = self.build_request(choice, conversation, prompt, user_text);

        let started = Instant::now();
        let raw = self.call_model(request).await;
        let elapsed = started.elapsed().as_secs_f64();

        let reply = match raw.and_then(|raw| self.parser.parse(&raw)) {
            Ok(reply) => {
                parley_prometheus::record_completion_call("ok", elapsed);
                reply
            }
            Err(e) => {
                parley_prometheus::record_completion_call(e.kind(), elapsed);
                warn!(phone = %key.phone_number, device_id = %key.device_id, error = %e, "completion aborted");
                return Err(e);
            }
        };

        for rejected in &reply.rejected {
            warn!(phone = %key.phone_number, device_id = %key.device_id, error = %rejected, "skipping response part");
        }
        if reply.parts.is_empty() && !reply.rejected.is_empty() {
            return Err(ParleyError::ResponseParseFailed {
                message: format!("all {} response parts were invalid", reply.rejected.len()),
            });
        }

        let sends = group_parts(&reply.parts);
        let mut dispatched = 0;
        let mut last_error = None;

        for send in &sends {
            let msg = match send {
                Dispatch::Text(text) => OutboundMessage::text(&key, text.clone()),
                Dispatch::Media { kind, url } => OutboundMessage::media(&key, *kind, url.clone(), None),
            };
            match self.delivery.send(msg).await {
                Ok(receipt) if receipt.delivered => {
                    dispatched += 1;
                    conversation.record_bot_output(send.log_text());
                    parley_prometheus::record_dispatch(&send.kind().to_string());
                }
                Ok(_) => {
                    warn!(phone = %key.phone_number, kind = %send.kind(), "delivery gateway did not accept message");
                }
                Err(e) => {
                    warn!(phone = %key.phone_number, kind = %send.kind(), error = %e, "dispatch failed");
                    last_error = Some(e);
                }
            }
        }

        // Nothing reached the user: keep the node so the next message retries it.
        if dispatched == 0 && !sends.is_empty() {
            return Err(last_error.unwrap_or_else(|| ParleyError::Delivery {
                message: format!("none of {} message(s) were accepted for delivery", sends.len()),
                source: None,
            }));
        }

        if let Some(stage) = &reply.stage {
            conversation.stage = Some(stage.clone());
        }

        info!(
            phone = %key.phone_number,
            device_id = %key.device_id,
            strategy = reply.strategy,
            sends = sends.len(),
            dispatched,
            stage = reply.stage.as_deref().unwrap_or(""),
            "completion reply dispatched"
        );

        Ok(PromptOutcome {
            dispatched,
            stage: reply.stage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use parley_core::traits::PluginAdapter;
    use parley_core::types::{
        AdapterType, CompletionResponse, ConversationKey, DeliveryReceipt, DeviceSettings,
        HealthStatus, MediaKind,
    };
    use parley_storage::{Database, DatabaseOptions, SqliteStore};

    struct Scripted {
        replies: Mutex<VecDeque<Result<String, ParleyError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, ParleyError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PluginAdapter for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 0, 0)
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
    impl CompletionProvider for Scripted {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ParleyError> {
            let model = request.model.clone();
            self.requests.lock().unwrap().push(request);
            let content = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))?;
            Ok(CompletionResponse { content, model, usage: None })
        }
    }

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<OutboundMessage>>,
        fail_all: bool,
        never_delivers: bool,
    }

    #[async_trait]
    impl PluginAdapter for Outbox {
        fn name(&self) -> &str {
            "outbox"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 0, 0)
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
    impl DeliveryGateway for Outbox {
        async fn send(&self, msg: OutboundMessage) -> Result<DeliveryReceipt, ParleyError> {
            if self.fail_all {
                return Err(ParleyError::Delivery { message: "down".into(), source: None });
            }
            if self.never_delivers {
                return Ok(DeliveryReceipt { delivered: false, provider_message_id: None });
            }
            self.sent.lock().unwrap().push(msg);
            Ok(DeliveryReceipt { delivered: true, provider_message_id: None })
        }
    }

    struct Fixture {
        processor: CompletionProcessor,
        provider: Arc<Scripted>,
        outbox: Arc<Outbox>,
        store: Arc<SqliteStore>,
        _dir: tempfile::TempDir,
    }

    async fn fixture(replies: Vec<Result<String, ParleyError>>, outbox: Outbox) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.db");
        let db = Database::open(path.to_str().unwrap(), DatabaseOptions::default())
            .await
            .unwrap();
        let store = Arc::new(SqliteStore::new(db));
        let provider = Arc::new(Scripted::new(replies));
        let outbox = Arc::new(outbox);

        let config = CompletionConfig {
            api_key: Some("default-key".into()),
            device_overrides: vec![DeviceOverride {
                device_id: "vip".into(),
                model: "pinned/model".into(),
                api_key: Some("vip-key".into()),
            }],
            ..CompletionConfig::default()
        };
        let processor = CompletionProcessor::new(
            provider.clone(),
            outbox.clone(),
            store.clone(),
            ProcessorSettings::from_config(&config),
            "First Stage",
        );
        Fixture { processor, provider, outbox, store, _dir: dir }
    }

    fn conversation(device: &str) -> Conversation {
        let mut conv = Conversation::new(ConversationKey::new("60111", device));
        conv.conv_last = "previous bot turn".into();
        conv
    }

    fn prompt() -> PromptSpec {
        PromptSpec { prompt: "You sell shoes.".into(), model: None }
    }

    #[tokio::test]
    async fn builds_three_message_context() {
        let fx = fixture(vec![Ok(r#"{"Stage":"S","Response":[]}"#.into())], Outbox::default()).await;
        let mut conv = conversation("dev-1");
        conv.begin_turn("do you have size 42?");

        fx.processor.run_prompt(&mut conv, &prompt(), "do you have size 42?").await.unwrap();

        let requests = fx.provider.requests.lock().unwrap();
        let req = &requests[0];
        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.messages[0].role, "system");
        assert!(req.messages[0].content.starts_with("You sell shoes."));
        assert!(req.messages[0].content.contains("\"Stage\""));
        assert_eq!(req.messages[1], ChatMessage::assistant("previous bot turn"));
        assert_eq!(req.messages[2], ChatMessage::user("do you have size 42?"));
        assert_eq!(req.temperature, 0.67);
        assert_eq!(req.top_p, 1.0);
        assert_eq!(req.repetition_penalty, 1.0);
        assert_eq!(req.model, "openai/gpt-4o-mini");
        assert_eq!(req.api_key.as_deref(), Some("default-key"));
    }

    #[tokio::test]
    async fn model_resolution_order() {
        let fx = fixture(vec![], Outbox::default()).await;
        fx.store
            .upsert_device(&DeviceSettings {
                device_id: "dev-2".into(),
                model: Some("device/model".into()),
                api_key: Some("device-key".into()),
                instance: None,
            })
            .await
            .unwrap();

        let vip = fx.processor.resolve_model("vip", None).await.unwrap();
        assert_eq!(vip, ModelChoice { model: "pinned/model".into(), api_key: Some("vip-key".into()) });

        let dev = fx.processor.resolve_model("dev-2", None).await.unwrap();
        assert_eq!(dev, ModelChoice { model: "device/model".into(), api_key: Some("device-key".into()) });

        let fallback = fx.processor.resolve_model("unknown", None).await.unwrap();
        assert_eq!(fallback.model, "openai/gpt-4o-mini");
        assert_eq!(fallback.api_key.as_deref(), Some("default-key"));

        let node_pinned = fx.processor.resolve_model("vip", Some("node/model")).await.unwrap();
        assert_eq!(node_pinned.model, "node/model");
        assert_eq!(node_pinned.api_key.as_deref(), Some("vip-key"));
    }

    #[tokio::test]
    async fn grouped_reply_dispatches_in_order_and_updates_stage() {
        let raw = r#"{"Stage":"Offer","Response":[
            {"type":"text","content":"Hi","Jenis":"onemessage"},
            {"type":"text","content":"We have it","Jenis":"onemessage"},
            {"type":"image","content":"https://cdn/shoe.jpg"},
            {"type":"text","content":"Want it?","Jenis":"onemessage"}
        ]}"#;
        let fx = fixture(vec![Ok(raw.into())], Outbox::default()).await;
        let mut conv = conversation("dev-1");
        conv.begin_turn("size 42");

        let outcome = fx.processor.run_prompt(&mut conv, &prompt(), "size 42").await.unwrap();

        assert_eq!(outcome.dispatched, 3);
        assert_eq!(outcome.stage.as_deref(), Some("Offer"));
        assert_eq!(conv.stage.as_deref(), Some("Offer"));

        let sent = fx.outbox.sent.lock().unwrap();
        assert_eq!(sent[0].text.as_deref(), Some("Hi\nWe have it"));
        assert_eq!(sent[1].media_kind, MediaKind::Image);
        assert_eq!(sent[1].media_url.as_deref(), Some("https://cdn/shoe.jpg"));
        assert_eq!(sent[2].text.as_deref(), Some("Want it?"));
        assert_eq!(sent[2].recipient, "60111");
        assert_eq!(conv.conv_last, "Hi\nWe have it\nhttps://cdn/shoe.jpg\nWant it?");
    }

    #[tokio::test]
    async fn upstream_failure_sends_nothing() {
        let fx = fixture(
            vec![Err(ParleyError::Provider { message: "API returned 500".into(), source: None })],
            Outbox::default(),
        )
        .await;
        let mut conv = conversation("dev-1");
        conv.stage = Some("Before".into());

        let err = fx.processor.run_prompt(&mut conv, &prompt(), "hi").await.unwrap_err();

        assert_eq!(err.kind(), "upstream_call_failed");
        assert!(fx.outbox.sent.lock().unwrap().is_empty());
        assert_eq!(conv.stage.as_deref(), Some("Before"));
        assert_eq!(conv.conv_last, "previous bot turn");
    }

    #[tokio::test]
    async fn empty_reply_is_parse_failure() {
        let fx = fixture(vec![Ok("   ".into())], Outbox::default()).await;
        let mut conv = conversation("dev-1");
        let err = fx.processor.run_prompt(&mut conv, &prompt(), "hi").await.unwrap_err();
        assert_eq!(err.kind(), "response_parse_failed");
        assert!(fx.outbox.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn invalid_part_is_skipped_with_warning() {
        let raw = r#"{"Stage":"S","Response":[{"type":"text"},{"type":"text","content":"ok"}]}"#;
        let fx = fixture(vec![Ok(raw.into())], Outbox::default()).await;
        let mut conv = conversation("dev-1");

        let outcome = fx.processor.run_prompt(&mut conv, &prompt(), "hi").await.unwrap();

        assert_eq!(outcome.dispatched, 1);
        assert!(logs_contain("skipping response part"));
    }

    #[tokio::test]
    async fn plain_text_reply_falls_back_to_first_stage() {
        let fx = fixture(vec![Ok("Sure, we open at 9.".into())], Outbox::default()).await;
        let mut conv = conversation("dev-1");

        let outcome = fx.processor.run_prompt(&mut conv, &prompt(), "hours?").await.unwrap();

        assert_eq!(outcome.dispatched, 1);
        assert_eq!(conv.stage.as_deref(), Some("First Stage"));
        assert_eq!(fx.outbox.sent.lock().unwrap()[0].text.as_deref(), Some("Sure, we open at 9."));
    }

    #[tokio::test]
    async fn total_delivery_failure_keeps_stage() {
        let raw = r#"{"Stage":"Next","Response":[{"type":"text","content":"hello"}]}"#;
        let fx = fixture(vec![Ok(raw.into())], Outbox { fail_all: true, ..Outbox::default() }).await;
        let mut conv = conversation("dev-1");

        let err = fx.processor.run_prompt(&mut conv, &prompt(), "hi").await.unwrap_err();

        assert_eq!(err.kind(), "delivery");
        assert!(conv.stage.is_none());
    }

    #[tokio::test]
    async fn unaccepted_sends_fail_the_call() {
        let raw = r#"{"Stage":"Next","Response":[{"type":"text","content":"hello"}]}"#;
        let outbox = Outbox { never_delivers: true, ..Outbox::default() };
        let fx = fixture(vec![Ok(raw.into())], outbox).await;
        let mut conv = conversation("dev-1");

        let err = fx.processor.run_prompt(&mut conv, &prompt(), "hi").await.unwrap_err();

        assert_eq!(err.kind(), "delivery");
        assert!(conv.stage.is_none());
        assert_eq!(conv.conv_last, "previous bot turn");
    }
}
