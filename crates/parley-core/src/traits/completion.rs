// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Completion provider trait for the OpenAI-compatible text generation service.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CompletionRequest, CompletionResponse};

/// Single-shot chat completion.
#[async_trait]
pub trait CompletionProvider: PluginAdapter {
    /// Sends the request and returns the raw text of the first choice.
    async fn complete(&self, request: CompletionRequest)
    -> Result<CompletionResponse, ParleyError>;
}
