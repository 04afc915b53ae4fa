// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routes outbound messages to the primary or secondary provider.

use std::sync::Arc;

use async_trait::async_trait;
use parley_core::traits::{DeliveryGateway, PluginAdapter};
use parley_core::types::{AdapterType, DeliveryReceipt, DeliveryRoute, HealthStatus, OutboundMessage};
use parley_core::ParleyError;
use tracing::{debug, warn};

/// A [`DeliveryGateway`] over up to two providers, selected by
/// [`OutboundMessage::route`].
#[derive(Default, Clone)]
pub struct DeliveryRouter {
    primary: Option<Arc<dyn DeliveryGateway>>,
    secondary: Option<Arc<dyn DeliveryGateway>>,
}

impl DeliveryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, route: DeliveryRoute, gateway: Arc<dyn DeliveryGateway>) -> Self {
        match route {
            DeliveryRoute::Primary => self.primary = Some(gateway),
            DeliveryRoute::Secondary => self.secondary = Some(gateway),
        }
        self
    }

    pub fn has_route(&self, route: DeliveryRoute) -> bool {
        self.gateway(route).is_some()
    }

    fn gateway(&self, route: DeliveryRoute) -> Option<&Arc<dyn DeliveryGateway>> {
        match route {
            DeliveryRoute::Primary => self.primary.as_ref(),
            DeliveryRoute::Secondary => self.secondary.as_ref(),
        }
    }

    fn routes(&self) -> impl Iterator<Item = (DeliveryRoute, &Arc<dyn DeliveryGateway>)> {
        [DeliveryRoute::Primary, DeliveryRoute::Secondary]
            .into_iter()
            .filter_map(move |r| self.gateway(r).map(|g| (r, g)))
    }
}

#[async_trait]
impl PluginAdapter for DeliveryRouter {
    fn name(&self) -> &str {
        "delivery-router"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Delivery
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        if self.primary.is_none() {
            return Ok(HealthStatus::Unhealthy("no primary delivery provider configured".into()));
        }
        let mut reasons = Vec::new();
        for (route, gateway) in self.routes() {
            match gateway.health_check().await? {
                HealthStatus::Healthy => {}
                HealthStatus::Degraded(r) | HealthStatus::Unhealthy(r) => {
                    reasons.push(format!("{route}: {r}"));
                }
            }
        }
        if reasons.is_empty() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded(reasons.join("; ")))
        }
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        for (route, gateway) in self.routes() {
            if let Err(e) = gateway.shutdown().await {
                warn!(route = %route, error = %e, "delivery provider shutdown error");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DeliveryGateway for DeliveryRouter {
    async fn send(&self, msg: OutboundMessage) -> Result<DeliveryReceipt, ParleyError> {
        let route = msg.route;
        let gateway = self.gateway(route).ok_or_else(|| ParleyError::Delivery {
            message: format!("no {route} delivery provider configured"),
            source: None,
        })?;
        debug!(route = %route, provider = gateway.name(), recipient = %msg.recipient, "routing outbound message");
        gateway.send(msg).await
    }
}
