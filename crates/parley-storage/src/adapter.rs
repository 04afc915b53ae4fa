// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of [`ConversationStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_core::traits::{ConversationStore, PluginAdapter};
use parley_core::types::{
    AdapterType, Conversation, ConversationKey, DeviceSettings, HealthStatus,
};
use parley_core::ParleyError;
use tracing::debug;

use crate::database::Database;
use crate::queries;

/// SQLite-backed conversation store.
///
/// Delegates every operation to the typed query modules.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        self.db
            .call(|conn| conn.execute_batch("SELECT 1;"))
            .await?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        self.db
            .call(|conn| conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);"))
            .await?;
        debug!("shutdown: WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn get_conversation(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<Conversation>, ParleyError> {
        queries::conversations::get_conversation(&self.db, key).await
    }

    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), ParleyError> {
        queries::conversations::create_conversation(&self.db, conversation).await
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), ParleyError> {
        queries::conversations::save_conversation(&self.db, conversation).await
    }

    async fn set_human_override(
        &self,
        key: &ConversationKey,
        enabled: bool,
    ) -> Result<(), ParleyError> {
        queries::conversations::set_human(&self.db, key, enabled).await
    }

    async fn load_flow(&self, device_id: &str) -> Result<Option<String>, ParleyError> {
        queries::flows::get_flow(&self.db, device_id).await
    }

    async fn store_flow(&self, device_id: &str, definition: &str) -> Result<(), ParleyError> {
        queries::flows::put_flow(&self.db, device_id, definition).await
    }

    async fn device_settings(
        &self,
        device_id: &str,
    ) -> Result<Option<DeviceSettings>, ParleyError> {
        queries::devices::get_device(&self.db, device_id).await
    }

    async fn upsert_device(&self, settings: &DeviceSettings) -> Result<(), ParleyError> {
        queries::devices::upsert_device(&self.db, settings).await
    }

    async fn pending_delays(&self) -> Result<Vec<(ConversationKey, DateTime<Utc>)>, ParleyError> {
        queries::conversations::pending_delays(&self.db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseOptions;
    use tempfile::tempdir;

    async fn store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let db = Database::open(path.to_str().unwrap(), DatabaseOptions::default())
            .await
            .unwrap();
        (SqliteStore::new(db), dir)
    }

    #[tokio::test]
    async fn implements_plugin_adapter() {
        let (store, _dir) = store().await;
        assert_eq!(store.name(), "sqlite");
        assert_eq!(store.adapter_type(), AdapterType::Storage);
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn conversation_lifecycle_through_trait() {
        let (store, _dir) = store().await;
        let store: &dyn ConversationStore = &store;
        let key = ConversationKey::new("60122", "dev-7");

        assert!(store.get_conversation(&key).await.unwrap().is_none());
        let mut conv = Conversation::new(key.clone());
        store.create_conversation(&conv).await.unwrap();

        conv.advance_to("start");
        conv.stage = Some("Intro".into());
        store.save_conversation(&conv).await.unwrap();
        store.set_human_override(&key, true).await.unwrap();

        let loaded = store.get_conversation(&key).await.unwrap().unwrap();
        assert_eq!(loaded.current_node_id.as_deref(), Some("start"));
        assert_eq!(loaded.stage.as_deref(), Some("Intro"));
        assert!(loaded.human_override);
    }
}
