// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation row reads and writes.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use parley_core::types::{Conversation, ConversationKey, ExecutionStatus};
use parley_core::ParleyError;
use rusqlite::{params, Row};

use crate::database::Database;

const COLUMNS: &str = "phone_number, device_id, stage, current_node_id, last_node_id,
     waiting_for_reply, human, balas, conv_last, conv_current, execution_status,
     delay_until, sender_name, created_at, updated_at";

fn to_ms(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(|t| t.timestamp_millis())
}

fn from_ms(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::from_timestamp_millis)
}

fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let key = ConversationKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?);
    let status: String = row.get(10)?;
    let execution_status = ExecutionStatus::from_str(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let mut conv = Conversation::new(key);
    conv.stage = row.get(2)?;
    conv.current_node_id = row.get(3)?;
    conv.last_node_id = row.get(4)?;
    conv.waiting_for_reply = row.get::<_, i64>(5)? != 0;
    conv.human_override = row.get::<_, i64>(6)? != 0;
    conv.last_ai_call_at = from_ms(row.get(7)?);
    conv.conv_last = row.get(8)?;
    conv.conv_current = row.get(9)?;
    conv.execution_status = execution_status;
    conv.delay_until = from_ms(row.get(11)?);
    conv.sender_name = row.get(12)?;
    conv.created_at = row.get(13)?;
    conv.updated_at = row.get(14)?;
    Ok(conv)
}

/// Fetches one conversation by key.
pub async fn get_conversation(
    db: &Database,
    key: &ConversationKey,
) -> Result<Option<Conversation>, ParleyError> {
    let key = key.clone();
    db.call(move |conn| {
        let sql =
            format!("SELECT {COLUMNS} FROM conversations WHERE phone_number = ?1 AND device_id = ?2");
        let result = conn.query_row(
            &sql,
            params![key.phone_number, key.device_id],
            row_to_conversation,
        );
        match result {
            Ok(conv) => Ok(Some(conv)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    })
    .await
}

/// Inserts a new conversation. A row that already exists is left untouched.
pub async fn create_conversation(db: &Database, conv: &Conversation) -> Result<(), ParleyError> {
    let conv = conv.clone();
    db.call(move |conn| {
        conn.execute(
            "INSERT OR IGNORE INTO conversations
                 (phone_number, device_id, stage, current_node_id, last_node_id,
                  waiting_for_reply, human, execution_status, sender_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                conv.key.phone_number,
                conv.key.device_id,
                conv.stage,
                conv.current_node_id,
                conv.last_node_id,
                conv.waiting_for_reply,
                conv.human_override,
                conv.execution_status.to_string(),
                conv.sender_name,
            ],
        )?;
        Ok(())
    })
    .await
}

/// Writes every mutable column and bumps `updated_at`.
pub async fn save_conversation(db: &Database, conv: &Conversation) -> Result<(), ParleyError> {
    let conv = conv.clone();
    db.call(move |conn| {
        conn.execute(
            "UPDATE conversations SET
                 stage = ?3, current_node_id = ?4, last_node_id = ?5,
                 waiting_for_reply = ?6, human = ?7, balas = ?8,
                 conv_last = ?9, conv_current = ?10, execution_status = ?11,
                 delay_until = ?12, sender_name = ?13,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE phone_number = ?1 AND device_id = ?2",
            params![
                conv.key.phone_number,
                conv.key.device_id,
                conv.stage,
                conv.current_node_id,
                conv.last_node_id,
                conv.waiting_for_reply,
                conv.human_override,
                to_ms(conv.last_ai_call_at),
                conv.conv_last,
                conv.conv_current,
                conv.execution_status.to_string(),
                to_ms(conv.delay_until),
                conv.sender_name,
            ],
        )?;
        Ok(())
    })
    .await
}

/// Sets or clears the human override flag.
pub async fn set_human(
    db: &Database,
    key: &ConversationKey,
    enabled: bool,
) -> Result<(), ParleyError> {
    let key = key.clone();
    db.call(move |conn| {
        conn.execute(
            "UPDATE conversations
             SET human = ?3, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE phone_number = ?1 AND device_id = ?2",
            params![key.phone_number, key.device_id, enabled],
        )?;
        Ok(())
    })
    .await
}

/// Active conversations with a delay deadline, oldest first.
pub async fn pending_delays(
    db: &Database,
) -> Result<Vec<(ConversationKey, DateTime<Utc>)>, ParleyError> {
    db.call(|conn| {
        let mut stmt = conn.prepare(
            "SELECT phone_number, device_id, delay_until FROM conversations
             WHERE delay_until IS NOT NULL AND execution_status = 'active' AND human = 0
             ORDER BY delay_until ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                ConversationKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut pending = Vec::new();
        for row in rows {
            let (key, ms) = row?;
            if let Some(at) = DateTime::from_timestamp_millis(ms) {
                pending.push((key, at));
            }
        }
        Ok(pending)
    })
    .await
}
