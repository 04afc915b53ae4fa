// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database handle: connection setup, PRAGMAs, migrations, and a bounded
//! call path.
//!
//! All statements run on tokio-rusqlite's background thread for the
//! connection. Concurrent callers queue on a semaphore sized by
//! `storage.max_connections`.

use std::sync::Arc;
use std::time::Duration;

use parley_config::model::{LockConfig, StorageConfig};
use parley_core::ParleyError;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::migrations;

/// Maps a tokio-rusqlite error into `ParleyError::Storage`.
pub fn map_tr_err<E>(e: tokio_rusqlite::Error<E>) -> ParleyError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ParleyError::Storage {
        source: Box::new(e),
    }
}

/// Connection-level settings derived from configuration.
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub wal_mode: bool,
    /// SQLite `busy_timeout`; bounds how long a write waits on another process.
    pub busy_timeout: Duration,
    pub max_in_flight: usize,
}

impl DatabaseOptions {
    pub fn from_config(storage: &StorageConfig, lock: &LockConfig) -> Self {
        Self {
            wal_mode: storage.wal_mode,
            busy_timeout: lock.wait_timeout(),
            max_in_flight: storage.max_connections,
        }
    }
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            wal_mode: true,
            busy_timeout: Duration::from_millis(2000),
            max_in_flight: 500,
        }
    }
}

/// Shared handle to the Parley database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    permits: Arc<Semaphore>,
}

impl Database {
    /// Opens (or creates) the database file, applies PRAGMAs, and runs migrations.
    pub async fn open(path: &str, options: DatabaseOptions) -> Result<Self, ParleyError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| ParleyError::Storage {
                source: Box::new(e),
            })?;

        let busy_timeout = options.busy_timeout;
        let wal = options.wal_mode;
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            if wal {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.busy_timeout(busy_timeout)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| migrations::run_migrations(conn))
            .await
            .map_err(map_tr_err)?;

        debug!(
            path,
            wal_mode = wal,
            busy_timeout_ms = busy_timeout.as_millis() as u64,
            "database opened"
        );
        Ok(Self {
            conn,
            permits: Arc::new(Semaphore::new(options.max_in_flight.max(1))),
        })
    }

    /// Runs `f` on the connection thread, waiting for a free slot first.
    pub async fn call<F, R>(&self, f: F) -> Result<R, ParleyError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ParleyError::Internal(format!("database closed: {e}")))?;
        self.conn.call(f).await.map_err(map_tr_err)
    }

    /// Checkpoints the WAL and closes the connection.
    pub async fn close(self) -> Result<(), ParleyError> {
        self.permits.close();
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(map_tr_err)
    }
}

/// Current wall clock as Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
