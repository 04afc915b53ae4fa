// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley conversation orchestrator.
//!
//! This crate provides the trait seams, error type, and shared domain types
//! used throughout the Parley workspace. Storage, delivery, completion, and
//! locking backends all implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ParleyError;
pub use types::{
    AdapterType, ChatMessage, CompletionRequest, CompletionResponse, Conversation,
    ConversationKey, DeliveryReceipt, DeliveryRoute, DeviceSettings, ExecutionStatus,
    HealthStatus, InboundMessage, MediaKind, OutboundMessage, PromptSpec, TokenUsage,
};

pub use traits::{
    CompletionProvider, ConversationStore, DeliveryGateway, DistributedLock, LockOutcome, LockToken,
    PluginAdapter, PromptExecutor, PromptOutcome, StalenessPolicy,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_abort_classification() {
        let provider = ParleyError::Provider {
            message: "503".into(),
            source: None,
        };
        let parse = ParleyError::ResponseParseFailed {
            message: "empty".into(),
        };
        let no_match = ParleyError::ConditionNoMatch {
            node_id: "c1".into(),
        };
        let storage = ParleyError::Storage {
            source: Box::new(std::io::Error::other("disk")),
        };
        let rejected = ParleyError::LockRejected {
            key: "601@dev".into(),
        };

        assert!(provider.is_pass_abort());
        assert!(parse.is_pass_abort());
        assert!(no_match.is_pass_abort());
        assert!(!storage.is_pass_abort());
        assert!(!rejected.is_pass_abort());
    }

    #[test]
    fn error_kinds_are_stable_labels() {
        assert_eq!(
            ParleyError::Provider {
                message: "x".into(),
                source: None
            }
            .kind(),
            "upstream_call_failed"
        );
        assert_eq!(ParleyError::Internal("x".into()).kind(), "internal");
        assert_eq!(
            ParleyError::InvalidResponsePart {
                index: 2,
                reason: "missing content".into()
            }
            .to_string(),
            "invalid response part #2: missing content"
        );
    }

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        for variant in [
            AdapterType::Delivery,
            AdapterType::Completion,
            AdapterType::Storage,
            AdapterType::Lock,
            AdapterType::Observability,
        ] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn staleness_policy_defaults() {
        let policy = StalenessPolicy::default();
        assert_eq!(policy.stale_after.as_secs(), 30);
        assert_eq!(policy.wait_timeout.as_millis(), 2000);
    }
}
