// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation mutual exclusion across processes.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::ConversationKey;

/// Proof of ownership handed out by a successful acquisition.
///
/// Release only removes the lock while the stored stamp still matches, so a
/// holder whose lock was reclaimed cannot free its successor's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(i64);

impl LockToken {
    pub fn new(stamp: i64) -> Self {
        Self(stamp)
    }

    pub fn stamp(self) -> i64 {
        self.0
    }
}

/// Result of a lock attempt. A rejection is an expected outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired(LockToken),
    Rejected,
}

impl LockOutcome {
    pub fn is_acquired(self) -> bool {
        matches!(self, LockOutcome::Acquired(_))
    }

    pub fn token(self) -> Option<LockToken> {
        match self {
            LockOutcome::Acquired(token) => Some(token),
            LockOutcome::Rejected => None,
        }
    }
}

/// When a held lock may be reclaimed and how long an attempt may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    /// A lock older than this is considered abandoned.
    pub stale_after: Duration,
    /// Upper bound on how long `try_acquire` blocks on contention.
    pub wait_timeout: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30),
            wait_timeout: Duration::from_millis(2000),
        }
    }
}

/// Session lock keyed by (phone number, device id).
///
/// At most one holder per key at any instant, across all processes sharing
/// the backing store. Acquisition never blocks beyond the policy's wait
/// timeout; a stale holder is overwritten.
#[async_trait]
pub trait DistributedLock: PluginAdapter {
    async fn try_acquire(&self, key: &ConversationKey) -> Result<LockOutcome, ParleyError>;

    /// Releases the lock held under `token`.
    ///
    /// Releasing an absent lock, or one since reclaimed by another holder,
    /// is not an error and leaves the current holder in place.
    async fn release(&self, key: &ConversationKey, token: LockToken) -> Result<(), ParleyError>;
}
