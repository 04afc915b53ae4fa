// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation, flow, and device persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Conversation, ConversationKey, DeviceSettings};

/// Persistence for everything a processing pass reads or writes.
#[async_trait]
pub trait ConversationStore: PluginAdapter {
    async fn get_conversation(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<Conversation>, ParleyError>;

    /// Inserts a new conversation row. An existing row for the key is kept.
    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), ParleyError>;

    /// Persists every mutable field of the conversation.
    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), ParleyError>;

    async fn set_human_override(
        &self,
        key: &ConversationKey,
        enabled: bool,
    ) -> Result<(), ParleyError>;

    /// Raw flow definition JSON for a device.
    async fn load_flow(&self, device_id: &str) -> Result<Option<String>, ParleyError>;

    async fn store_flow(&self, device_id: &str, definition: &str) -> Result<(), ParleyError>;

    async fn device_settings(&self, device_id: &str)
    -> Result<Option<DeviceSettings>, ParleyError>;

    async fn upsert_device(&self, settings: &DeviceSettings) -> Result<(), ParleyError>;

    /// Active conversations with an unexpired or overdue delay deadline.
    async fn pending_delays(&self) -> Result<Vec<(ConversationKey, DateTime<Utc>)>, ParleyError>;
}
