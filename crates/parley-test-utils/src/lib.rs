// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley integration tests.
//!
//! Provides mock adapters and a [`TestHarness`] that wires a real
//! orchestrator over a temporary SQLite database.

pub mod faulty_lock;
pub mod harness;
pub mod mock_completion;
pub mod mock_delivery;

pub use faulty_lock::FaultyLock;
pub use harness::{TestHarness, TestHarnessBuilder, TEST_DEVICE};
pub use mock_completion::MockCompletion;
pub use mock_delivery::MockDelivery;
