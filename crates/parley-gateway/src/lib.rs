// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook gateway for Parley.
//!
//! Messaging providers POST inbound messages to `/webhook/{provider}`. The
//! gateway authenticates and normalizes them and hands them to the
//! orchestrator through a bounded queue.

pub mod auth;
pub mod handlers;
pub mod payload;
pub mod server;

pub use auth::AuthConfig;
pub use server::{build_router, start_server, GatewayState, HealthState, RenderFn, ServerConfig};
