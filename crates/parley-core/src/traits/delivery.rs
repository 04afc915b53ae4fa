// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery gateway trait for the external messaging providers.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{DeliveryReceipt, OutboundMessage};

/// Sends text and media to end users.
///
/// The message's [`route`](OutboundMessage::route) selects which configured
/// provider carries it. A returned `Err` means the send did not happen.
#[async_trait]
pub trait DeliveryGateway: PluginAdapter {
    async fn send(&self, msg: OutboundMessage) -> Result<DeliveryReceipt, ParleyError>;
}
