// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message delivery for Parley.
//!
//! Each configured provider is an [`HttpProvider`]; the [`DeliveryRouter`]
//! picks one per message from its [`DeliveryRoute`](parley_core::types::DeliveryRoute).

pub mod http;
pub mod router;

use std::sync::Arc;
use std::time::Duration;

use parley_config::model::DeliveryConfig;
use parley_core::types::DeliveryRoute;
use parley_core::ParleyError;

pub use http::HttpProvider;
pub use router::DeliveryRouter;

/// Builds the router from the `[delivery]` section.
pub fn router_from_config(config: &DeliveryConfig) -> Result<DeliveryRouter, ParleyError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let mut router = DeliveryRouter::new();
    for (route, endpoint) in [
        (DeliveryRoute::Primary, &config.primary),
        (DeliveryRoute::Secondary, &config.secondary),
    ] {
        if let Some(endpoint) = endpoint {
            router = router.with_route(route, Arc::new(HttpProvider::new(endpoint, timeout)?));
            tracing::info!(route = %route, provider = %endpoint.name, "delivery provider configured");
        }
    }
    Ok(router)
}
