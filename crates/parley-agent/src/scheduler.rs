// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process timers for `delay` nodes.
//!
//! Timers are not durable: the deadline lives in `delay_until` on the
//! conversation row and is rescheduled on startup.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use parley_core::types::ConversationKey;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type TimerMap = HashMap<ConversationKey, (u64, AbortHandle)>;

/// One pending timer per conversation; scheduling again replaces it.
pub struct DelayScheduler {
    timers: Arc<Mutex<TimerMap>>,
    generation: AtomicU64,
    cancel: CancellationToken,
}

impl DelayScheduler {
    pub fn new() -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        }
    }

    /// Runs `fire(key)` once `until` has passed. Past deadlines fire at once.
    pub fn schedule<F, Fut>(&self, key: ConversationKey, until: DateTime<Utc>, fire: F)
    where
        F: FnOnce(ConversationKey) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return;
        }
        let wait = (until - Utc::now()).to_std().unwrap_or_default();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let cancel = self.cancel.clone();
        let task_key = key.clone();

        // Hold the map while spawning so a timer that fires at once cannot
        // look for its entry before it is inserted.
        let Ok(mut map) = self.timers.lock() else {
            return;
        };
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => return,
            }
            if let Ok(mut map) = timers.lock() {
                if map.get(&task_key).is_some_and(|(g, _)| *g == generation) {
                    map.remove(&task_key);
                }
            }
            debug!(conversation = %task_key, "delay timer fired");
            fire(task_key).await;
        });

        debug!(conversation = %key, wait_ms = wait.as_millis() as u64, "delay timer scheduled");
        if let Some((_, previous)) = map.insert(key, (generation, handle.abort_handle())) {
            previous.abort();
        }
    }

    /// Drops a pending timer, if any.
    pub fn cancel(&self, key: &ConversationKey) {
        if let Ok(mut map) = self.timers.lock() {
            if let Some((_, handle)) = map.remove(key) {
                handle.abort();
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.timers.lock().map(|m| m.len()).unwrap_or_default()
    }

    /// Drops every pending timer and refuses new ones.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        if let Ok(mut map) = self.timers.lock() {
            for (_, (_, handle)) in map.drain() {
                handle.abort();
            }
        }
    }
}

impl Default for DelayScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn key(n: &str) -> ConversationKey {
        ConversationKey::new(n, "dev")
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_deadline() {
        let scheduler = DelayScheduler::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        scheduler.schedule(key("1"), Utc::now() + chrono::Duration::seconds(5), move |k| async move {
            let _ = tx.send(k);
        });
        assert_eq!(scheduler.pending(), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(rx.recv().await.unwrap(), key("1"));
        tokio::task::yield_now().await;
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn past_deadline_fires_immediately() {
        let scheduler = DelayScheduler::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        scheduler.schedule(key("2"), Utc::now() - chrono::Duration::seconds(30), move |k| async move {
            let _ = tx.send(k);
        });
        let fired = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(fired, Some(key("2")));
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_previous_timer() {
        let scheduler = DelayScheduler::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tx2 = tx.clone();

        scheduler.schedule(key("3"), Utc::now() + chrono::Duration::seconds(5), move |_| async move {
            let _ = tx.send("first");
        });
        scheduler.schedule(key("3"), Utc::now() + chrono::Duration::seconds(10), move |_| async move {
            let _ = tx2.send("second");
        });
        assert_eq!(scheduler.pending(), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(rx.recv().await, Some("second"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drops_timers() {
        let scheduler = DelayScheduler::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<ConversationKey>();
        scheduler.schedule(key("4"), Utc::now() + chrono::Duration::seconds(5), move |k| async move {
            let _ = tx.send(k);
        });
        scheduler.shutdown();
        assert_eq!(scheduler.pending(), 0);

        tokio::time::advance(Duration::from_secs(6)).await;
        // Sender was dropped with the aborted task.
        assert_eq!(rx.recv().await, None);
    }
}
