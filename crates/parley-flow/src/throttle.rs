// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimum interval between automated replies to one conversation.

use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Proceed,
    /// Dropped: the last reply was `elapsed` ago.
    Drop { elapsed: Duration },
}

#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    min_interval: Duration,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// A pass proceeds when no reply was recorded or the last one is at least
    /// `min_interval` old. A timestamp in the future counts as zero elapsed.
    pub fn check(&self, last_reply: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ThrottleDecision {
        let Some(last) = last_reply else {
            return ThrottleDecision::Proceed;
        };
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        if elapsed < self.min_interval {
            ThrottleDecision::Drop { elapsed }
        } else {
            ThrottleDecision::Proceed
        }
    }
}
