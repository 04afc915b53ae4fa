// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley conversation orchestrator.

use thiserror::Error;

/// The primary error type used across all Parley adapter traits and core operations.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Delivery gateway errors (provider unreachable, rejected send).
    #[error("delivery error: {message}")]
    Delivery {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Completion service errors (network failure, 4xx/5xx, malformed envelope).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Another processing pass already holds the session lock for this key.
    ///
    /// Not a failure: duplicate webhook deliveries land here.
    #[error("session lock held for {key}")]
    LockRejected { key: String },

    /// Every reply-parsing strategy was exhausted without a usable result.
    #[error("response parse failed: {message}")]
    ResponseParseFailed { message: String },

    /// A single response part is unusable (missing content, unknown kind).
    #[error("invalid response part #{index}: {reason}")]
    InvalidResponsePart { index: usize, reason: String },

    /// A condition node matched no rule and has no default.
    #[error("no condition rule matched at node {node_id}")]
    ConditionNoMatch { node_id: String },

    /// Malformed flow graph or runaway traversal.
    #[error("flow error: {message}")]
    Flow { message: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Returns true for errors that abort a processing pass while leaving the
    /// conversation at its last good position.
    ///
    /// These are handled at the pass boundary and retried implicitly by the
    /// next inbound message.
    pub fn is_pass_abort(&self) -> bool {
        matches!(
            self,
            ParleyError::Provider { .. }
                | ParleyError::ResponseParseFailed { .. }
                | ParleyError::ConditionNoMatch { .. }
                | ParleyError::Delivery { .. }
                | ParleyError::Timeout { .. }
        )
    }

    /// Short, stable label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ParleyError::Config(_) => "config",
            ParleyError::Storage { .. } => "storage",
            ParleyError::Delivery { .. } => "delivery",
            ParleyError::Provider { .. } => "upstream_call_failed",
            ParleyError::LockRejected { .. } => "lock_rejected",
            ParleyError::ResponseParseFailed { .. } => "response_parse_failed",
            ParleyError::InvalidResponsePart { .. } => "invalid_response_part",
            ParleyError::ConditionNoMatch { .. } => "condition_no_match",
            ParleyError::Flow { .. } => "flow",
            ParleyError::Timeout { .. } => "timeout",
            ParleyError::Internal(_) => "internal",
        }
    }
}
