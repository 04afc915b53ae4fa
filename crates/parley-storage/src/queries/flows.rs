// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flow definition storage. Definitions are stored as raw JSON.

use parley_core::ParleyError;
use rusqlite::{OptionalExtension, params};

use crate::database::Database;

pub async fn get_flow(db: &Database, device_id: &str) -> Result<Option<String>, ParleyError> {
    let device_id = device_id.to_string();
    db.call(move |conn| {
        conn.query_row(
            "SELECT definition FROM flows WHERE device_id = ?1",
            params![device_id],
            |row| row.get(0),
        )
        .optional()
    })
    .await
}

/// Inserts or replaces the flow for a device.
pub async fn put_flow(db: &Database, device_id: &str, definition: &str) -> Result<(), ParleyError> {
    let device_id = device_id.to_string();
    let definition = definition.to_string();
    db.call(move |conn| {
        conn.execute(
            "INSERT INTO flows (device_id, definition) VALUES (?1, ?2)
             ON CONFLICT(device_id) DO UPDATE SET
                 definition = excluded.definition,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![device_id, definition],
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
    async fn put_replaces_existing_flow() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flows.db");
        let db = Database::open(path.to_str().unwrap(), DatabaseOptions::default())
            .await
            .unwrap();

        assert!(get_flow(&db, "dev-1").await.unwrap().is_none());
        put_flow(&db, "dev-1", r#"{"v":1}"#).await.unwrap();
        put_flow(&db, "dev-1", r#"{"v":2}"#).await.unwrap();

        assert_eq!(
            get_flow(&db, "dev-1").await.unwrap().as_deref(),
            Some(r#"{"v":2}"#)
        );
    }
}
