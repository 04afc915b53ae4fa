// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-device completion settings.

use parley_core::types::DeviceSettings;
use parley_core::ParleyError;
use rusqlite::{OptionalExtension, params};

use crate::database::Database;

pub async fn get_device(
    db: &Database,
    device_id: &str,
) -> Result<Option<DeviceSettings>, ParleyError> {
    let device_id = device_id.to_string();
    db.call(move |conn| {
        conn.query_row(
            "SELECT device_id, model, api_key, instance FROM devices WHERE device_id = ?1",
            params![device_id],
            |row| {
                Ok(DeviceSettings {
                    device_id: row.get(0)?,
                    model: row.get(1)?,
                    api_key: row.get(2)?,
                    instance: row.get(3)?,
                })
            },
        )
        .optional()
    })
    .await
}

pub async fn upsert_device(db: &Database, settings: &DeviceSettings) -> Result<(), ParleyError> {
    let settings = settings.clone();
    db.call(move |conn| {
        conn.execute(
            "INSERT INTO devices (device_id, model, api_key, instance) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(device_id) DO UPDATE SET
                 model = excluded.model,
                 api_key = excluded.api_key,
                 instance = excluded.instance",
            params![
                settings.device_id,
                settings.model,
                settings.api_key,
                settings.instance
            ],
        )?;
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseOptions;
    use tempfile::tempdir;

    #[tokio::test]
    async fn upsert_then_get() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("devices.db");
        let db = Database::open(path.to_str().unwrap(), DatabaseOptions::default())
            .await
            .unwrap();

        let mut settings = DeviceSettings {
            device_id: "dev-1".into(),
            model: Some("model-a".into()),
            api_key: Some("key-a".into()),
            instance: None,
        };
        upsert_device(&db, &settings).await.unwrap();
        settings.model = Some("model-b".into());
        upsert_device(&db, &settings).await.unwrap();

        let loaded = get_device(&db, "dev-1").await.unwrap().unwrap();
        assert_eq!(loaded, settings);
        assert!(get_device(&db, "dev-2").await.unwrap().is_none());
    }
}
