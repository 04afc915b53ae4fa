// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Completion service integration for Parley.
//!
//! [`CompletionClient`] talks to an OpenAI-compatible chat-completions API,
//! [`ReplyParser`] reads whatever the model sends back, and
//! [`CompletionProcessor`] ties both to the delivery gateway as the
//! [`PromptExecutor`](parley_core::PromptExecutor) used by the flow engine.

pub mod client;
pub mod grouping;
pub mod parse;
pub mod processor;
pub mod types;

pub use client::CompletionClient;
pub use grouping::{group_parts, Dispatch};
pub use parse::{CompletionReply, ReplyParser, ReplyPart, ReplyStrategy};
pub use processor::{CompletionProcessor, ModelChoice, ProcessorSettings, RESPONSE_FORMAT};
