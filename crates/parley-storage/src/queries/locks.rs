// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lock rows.
//!
//! Acquisition runs inside a `BEGIN IMMEDIATE` transaction, which takes
//! SQLite's reserved lock up front. Every other writer, in this process or
//! another one sharing the file, serializes behind it for at most the
//! connection's `busy_timeout`.

use parley_core::types::ConversationKey;
use parley_core::ParleyError;
use rusqlite::{ErrorCode, OptionalExtension, TransactionBehavior, params};

use crate::database::{Database, now_ms};

/// What a single acquisition attempt found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// No row existed; one was inserted with `stamp`.
    Inserted { stamp: i64 },
    /// A row older than the staleness threshold was restamped with `stamp`.
    Reclaimed { stamp: i64, held_for_ms: i64 },
    /// A live row exists.
    Held { held_for_ms: i64 },
    /// Another writer kept SQLite's write lock past `busy_timeout`.
    Busy,
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// One acquisition attempt against an open connection.
///
/// Waiting on a competing writer is bounded by the connection's
/// `busy_timeout` alone.
pub fn try_acquire_on(
    conn: &mut rusqlite::Connection,
    key: &ConversationKey,
    now_ms: i64,
    stale_after_ms: i64,
) -> rusqlite::Result<AcquireResult> {
    let tx = match conn.transaction_with_behavior(TransactionBehavior::Immediate) {
        Ok(tx) => tx,
        Err(e) if is_busy(&e) => return Ok(AcquireResult::Busy),
        Err(e) => return Err(e),
    };

    let held_at: Option<i64> = tx
        .query_row(
            "SELECT acquired_at_ms FROM session_locks WHERE phone_number = ?1 AND device_id = ?2",
            params![key.phone_number, key.device_id],
            |row| row.get(0),
        )
        .optional()?;

    let result = match held_at {
        None => {
            tx.execute(
                "INSERT INTO session_locks (phone_number, device_id, acquired_at_ms)
                 VALUES (?1, ?2, ?3)",
                params![key.phone_number, key.device_id, now_ms],
            )?;
            AcquireResult::Inserted { stamp: now_ms }
        }
        Some(at) if now_ms - at < stale_after_ms => {
            // Dropping the transaction rolls it back.
            return Ok(AcquireResult::Held {
                held_for_ms: now_ms - at,
            });
        }
        Some(at) => {
            // The new stamp must differ from the reclaimed holder's token.
            let stamp = now_ms.max(at + 1);
            tx.execute(
                "UPDATE session_locks SET acquired_at_ms = ?3
                 WHERE phone_number = ?1 AND device_id = ?2",
                params![key.phone_number, key.device_id, stamp],
            )?;
            AcquireResult::Reclaimed {
                stamp,
                held_for_ms: now_ms - at,
            }
        }
    };

    match tx.commit() {
        Ok(()) => Ok(result),
        Err(e) if is_busy(&e) => Ok(AcquireResult::Busy),
        Err(e) => Err(e),
    }
}

/// Runs one attempt on the shared connection.
///
/// The clock is read once the attempt reaches the connection, so time spent
/// queued behind unrelated queries never counts against the key.
pub async fn try_acquire(
    db: &Database,
    key: &ConversationKey,
    stale_after_ms: i64,
) -> Result<AcquireResult, ParleyError> {
    let key = key.clone();
    db.call(move |conn| try_acquire_on(conn, &key, now_ms(), stale_after_ms))
        .await
}

/// Deletes the lock row if it still carries `stamp`.
///
/// Returns whether a row was removed. A row restamped by a reclaiming pass
/// is left alone.
pub fn release_on(
    conn: &rusqlite::Connection,
    key: &ConversationKey,
    stamp: i64,
) -> rusqlite::Result<bool> {
    let removed = conn.execute(
        "DELETE FROM session_locks
         WHERE phone_number = ?1 AND device_id = ?2 AND acquired_at_ms = ?3",
        params![key.phone_number, key.device_id, stamp],
    )?;
    Ok(removed > 0)
}

pub async fn release(db: &Database, key: &ConversationKey, stamp: i64) -> Result<bool, ParleyError> {
    let key = key.clone();
    db.call(move |conn| release_on(conn, &key, stamp)).await
}
