// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Parley orchestrator.
//!
//! Conversations, flow definitions, device settings, and session locks live
//! in one database file. Schema changes ship as embedded refinery
//! migrations and are applied on open.

pub mod adapter;
pub mod database;
pub mod lock;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStore;
pub use database::{Database, DatabaseOptions};
pub use lock::SqliteSessionLock;

use parley_config::ParleyConfig;
use parley_core::traits::StalenessPolicy;
use parley_core::ParleyError;

/// Opens the configured database and builds the store and lock over it.
pub async fn open_from_config(
    config: &ParleyConfig,
) -> Result<(SqliteStore, SqliteSessionLock), ParleyError> {
    let options = DatabaseOptions::from_config(&config.storage, &config.lock);
    let db = Database::open(&config.storage.database_path, options).await?;
    let policy = StalenessPolicy {
        stale_after: config.lock.stale_after(),
        wait_timeout: config.lock.wait_timeout(),
    };
    Ok((SqliteStore::new(db.clone()), SqliteSessionLock::new(db, policy)))
}
