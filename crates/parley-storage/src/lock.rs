// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed [`DistributedLock`].

use async_trait::async_trait;
use parley_core::traits::{
    DistributedLock, LockOutcome, LockToken, PluginAdapter, StalenessPolicy,
};
use parley_core::types::{AdapterType, ConversationKey, HealthStatus};
use parley_core::ParleyError;
use tracing::{debug, warn};

use crate::database::{Database, now_ms};
use crate::queries::locks::{self, AcquireResult};

/// Session lock stored in the `session_locks` table.
///
/// Contention on SQLite's write lock is bounded by the database's
/// `busy_timeout`, which [`crate::open_from_config`] sets to the policy's
/// wait timeout.
#[derive(Clone)]
pub struct SqliteSessionLock {
    db: Database,
    policy: StalenessPolicy,
}

impl SqliteSessionLock {
    pub fn new(db: Database, policy: StalenessPolicy) -> Self {
        Self { db, policy }
    }

    pub fn policy(&self) -> StalenessPolicy {
        self.policy
    }
}

#[async_trait]
impl PluginAdapter for SqliteSessionLock {
    fn name(&self) -> &str {
        "sqlite-session-lock"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Lock
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        let stale_cutoff = now_ms() - self.policy.stale_after.as_millis() as i64;
        let stale: i64 = self
            .db
            .call(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM session_locks WHERE acquired_at_ms < ?1",
                    [stale_cutoff],
                    |row| row.get(0),
                )
            })
            .await?;
        if stale > 0 {
            return Ok(HealthStatus::Degraded(format!(
                "{stale} abandoned session lock(s) awaiting reclaim"
            )));
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl DistributedLock for SqliteSessionLock {
    async fn try_acquire(&self, key: &ConversationKey) -> Result<LockOutcome, ParleyError> {
        let stale_after_ms = self.policy.stale_after.as_millis() as i64;

        let result = locks::try_acquire(&self.db, key, stale_after_ms).await?;
        let outcome = match result {
            AcquireResult::Inserted { stamp } => LockOutcome::Acquired(LockToken::new(stamp)),
            AcquireResult::Reclaimed { stamp, held_for_ms } => {
                warn!(
                    phone = %key.phone_number,
                    device_id = %key.device_id,
                    held_for_ms,
                    "reclaimed abandoned session lock"
                );
                LockOutcome::Acquired(LockToken::new(stamp))
            }
            AcquireResult::Held { held_for_ms } => {
                debug!(
                    phone = %key.phone_number,
                    device_id = %key.device_id,
                    held_for_ms,
                    "session lock held by a live pass"
                );
                LockOutcome::Rejected
            }
            AcquireResult::Busy => {
                debug!(
                    phone = %key.phone_number,
                    device_id = %key.device_id,
                    "session lock wait timed out"
                );
                LockOutcome::Rejected
            }
        };
        Ok(outcome)
    }

    async fn release(&self, key: &ConversationKey, token: LockToken) -> Result<(), ParleyError> {
        let removed = locks::release(&self.db, key, token.stamp()).await?;
        if !removed {
            warn!(
                phone = %key.phone_number,
                device_id = %key.device_id,
                "session lock was reclaimed before release, leaving the new holder in place"
            );
        }
        Ok(())
    }
}
