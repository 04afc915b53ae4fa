// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the orchestrator and its backends.
//!
//! Backend adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod completion;
pub mod delivery;
pub mod lock;
pub mod prompt;
pub mod storage;

pub use adapter::PluginAdapter;
pub use completion::CompletionProvider;
pub use delivery::DeliveryGateway;
pub use lock::{DistributedLock, LockOutcome, LockToken, StalenessPolicy};
pub use prompt::{PromptExecutor, PromptOutcome};
pub use storage::ConversationStore;
