// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lock wrapper that can be told to fail.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use parley_core::traits::{DistributedLock, LockOutcome, LockToken, PluginAdapter};
use parley_core::types::{AdapterType, ConversationKey, HealthStatus};
use parley_core::ParleyError;

/// Delegates to a real lock, except for a configurable number of
/// acquisition attempts that fail with a storage error.
pub struct FaultyLock {
    inner: Arc<dyn DistributedLock>,
    failures_left: AtomicUsize,
}

impl FaultyLock {
    pub fn new(inner: Arc<dyn DistributedLock>) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(0),
        }
    }

    /// Makes the next `count` acquisition attempts fail.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PluginAdapter for FaultyLock {
    fn name(&self) -> &str {
        "faulty-lock"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Lock
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl DistributedLock for FaultyLock {
    async fn try_acquire(&self, key: &ConversationKey) -> Result<LockOutcome, ParleyError> {
        if self.take_failure() {
            return Err(ParleyError::Storage {
                source: "injected lock failure".into(),
            });
        }
        self.inner.try_acquire(key).await
    }

    async fn release(&self, key: &ConversationKey, token: LockToken) -> Result<(), ParleyError> {
        self.inner.release(key, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::traits::StalenessPolicy;
    use parley_storage::{Database, DatabaseOptions, SqliteSessionLock};

    #[tokio::test]
    async fn fails_only_the_requested_number_of_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faulty.db");
        let db = Database::open(&path.to_string_lossy(), DatabaseOptions::default())
            .await
            .unwrap();
        let lock = FaultyLock::new(Arc::new(SqliteSessionLock::new(db, StalenessPolicy::default())));
        let key = ConversationKey::new("601", "dev");

        lock.fail_next(2);
        assert!(lock.try_acquire(&key).await.is_err());
        assert!(lock.try_acquire(&key).await.is_err());

        let token = lock.try_acquire(&key).await.unwrap().token().unwrap();
        lock.release(&key, token).await.unwrap();
    }
}
