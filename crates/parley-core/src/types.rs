// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Parley orchestrator.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Delivery,
    Completion,
    Storage,
    Lock,
    Observability,
}

// --- Conversation ---

/// Identity of a conversation: one end user talking to one device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub phone_number: String,
    pub device_id: String,
}

impl ConversationKey {
    pub fn new(phone_number: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            device_id: device_id.into(),
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.phone_number, self.device_id)
    }
}

/// Lifecycle of a conversation's flow execution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Active,
    Completed,
    Failed,
}

/// Per-conversation automation state.
///
/// Mutated only by the processing pass that currently holds the session lock
/// for [`Conversation::key`].
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub key: ConversationKey,
    /// Free-text script position label.
    pub stage: Option<String>,
    /// Single source of truth for the flow position.
    pub current_node_id: Option<String>,
    pub last_node_id: Option<String>,
    pub waiting_for_reply: bool,
    /// When set, the flow machine does not run for this conversation.
    pub human_override: bool,
    /// Last time the bot replied or called the completion service (throttle anchor).
    pub last_ai_call_at: Option<DateTime<Utc>>,
    /// Last recorded bot turn, used as the assistant message in model context.
    pub conv_last: String,
    /// Current user turn.
    pub conv_current: String,
    pub execution_status: ExecutionStatus,
    /// Pending delay-node deadline.
    pub delay_until: Option<DateTime<Utc>>,
    pub sender_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    turn_open: bool,
}

impl Conversation {
    /// A fresh conversation positioned before the flow's start node.
    pub fn new(key: ConversationKey) -> Self {
        let now = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        Self {
            key,
            stage: None,
            current_node_id: None,
            last_node_id: None,
            waiting_for_reply: false,
            human_override: false,
            last_ai_call_at: None,
            conv_last: String::new(),
            conv_current: String::new(),
            execution_status: ExecutionStatus::Active,
            delay_until: None,
            sender_name: None,
            created_at: now.clone(),
            updated_at: now,
            turn_open: false,
        }
    }

    /// Records the user turn that drives the current pass.
    pub fn begin_turn(&mut self, user_text: &str) {
        self.conv_current = user_text.to_string();
        self.turn_open = false;
    }

    /// Appends dispatched bot output to the running log for this turn.
    ///
    /// The first output of a pass replaces the previous bot turn; later
    /// outputs of the same pass are appended on new lines.
    pub fn record_bot_output(&mut self, text: &str) {
        if !self.turn_open {
            self.conv_last.clear();
            self.turn_open = true;
        } else if !self.conv_last.is_empty() {
            self.conv_last.push('\n');
        }
        self.conv_last.push_str(text);
    }

    /// Moves the flow position to `node_id`, remembering where it came from.
    pub fn advance_to(&mut self, node_id: &str) {
        self.last_node_id = self.current_node_id.take();
        self.current_node_id = Some(node_id.to_string());
    }
}

// --- Messaging ---

/// Kind of content carried by an outbound message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Text,
    Image,
    Audio,
    Video,
}

/// Which configured messaging provider carries a send.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryRoute {
    #[default]
    Primary,
    Secondary,
}

/// Inbound message normalized from a provider webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub device_id: String,
    #[serde(default)]
    pub instance: Option<String>,
    pub phone_number: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    /// The device's own outgoing message echoed back (operator traffic).
    #[serde(default, alias = "from_me")]
    pub from_operator: bool,
}

impl InboundMessage {
    pub fn key(&self) -> ConversationKey {
        ConversationKey::new(self.phone_number.clone(), self.device_id.clone())
    }

    /// Text the flow machine sees as the user's input.
    pub fn input_text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

/// An outbound message handed to the delivery gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub device_id: String,
    pub recipient: String,
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub media_kind: MediaKind,
    pub route: DeliveryRoute,
}

impl OutboundMessage {
    pub fn text(key: &ConversationKey, text: impl Into<String>) -> Self {
        Self {
            device_id: key.device_id.clone(),
            recipient: key.phone_number.clone(),
            text: Some(text.into()),
            media_url: None,
            media_kind: MediaKind::Text,
            route: DeliveryRoute::Primary,
        }
    }

    pub fn media(
        key: &ConversationKey,
        kind: MediaKind,
        url: impl Into<String>,
        caption: Option<String>,
    ) -> Self {
        Self {
            device_id: key.device_id.clone(),
            recipient: key.phone_number.clone(),
            text: caption,
            media_url: Some(url.into()),
            media_kind: kind,
            route: DeliveryRoute::Primary,
        }
    }

    pub fn via(mut self, route: DeliveryRoute) -> Self {
        self.route = route;
        self
    }
}

/// Result of a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub delivered: bool,
    pub provider_message_id: Option<String>,
}

// --- Completion ---

/// A single chat message in a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

/// A request to the completion service.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub top_p: f64,
    pub repetition_penalty: f64,
    /// Credential for this call; `None` uses the provider's default.
    pub api_key: Option<String>,
}

/// Token usage reported by the completion service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Raw completion reply, before parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// Prompt configuration carried by `ai_prompt` / `advanced_ai_prompt` nodes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PromptSpec {
    pub prompt: String,
    /// Model pinned by the node, overriding device and default selection.
    #[serde(default)]
    pub model: Option<String>,
}

/// Model and credential configured against a device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceSettings {
    pub device_id: String,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub instance: Option<String>,
}
