// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation orchestration for Parley.
//!
//! [`Orchestrator`] turns inbound messages and delay timers into serialized
//! processing passes over each conversation's flow.

pub mod commands;
pub mod orchestrator;
pub mod scheduler;
pub mod shutdown;

pub use commands::{CommandParser, OperatorCommand};
pub use orchestrator::{Collaborators, Orchestrator, OrchestratorSettings, PassResult};
pub use scheduler::DelayScheduler;
pub use shutdown::{drain_passes, install_signal_handler};
