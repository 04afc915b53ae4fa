// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seam between the flow machine and the completion response processor.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::types::{Conversation, PromptSpec};

/// What a prompt node produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptOutcome {
    /// Number of outbound sends that were accepted by the gateway.
    pub dispatched: usize,
    /// Stage label parsed from the reply, if any.
    pub stage: Option<String>,
}

/// Generates a reply for a prompt node and dispatches it to the user.
///
/// On `Ok`, the conversation's stage and bot-turn log have been updated.
/// On `Err`, nothing was committed to the conversation.
#[async_trait]
pub trait PromptExecutor: Send + Sync {
    async fn run_prompt(
        &self,
        conversation: &mut Conversation,
        prompt: &PromptSpec,
        user_text: &str,
    ) -> Result<PromptOutcome, ParleyError>;
}
