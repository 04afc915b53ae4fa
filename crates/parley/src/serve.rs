// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley serve` command implementation.
//!
//! Opens storage and the session lock, builds the delivery router and the
//! completion processor, starts the webhook gateway, and runs the
//! orchestrator until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Instant;

use parley_agent::{
    install_signal_handler, Collaborators, CommandParser, Orchestrator, OrchestratorSettings,
};
use parley_completion::{CompletionClient, CompletionProcessor, ProcessorSettings};
use parley_config::ParleyConfig;
use parley_core::traits::PluginAdapter;
use parley_core::types::DeliveryRoute;
use parley_core::ParleyError;
use parley_gateway::{AuthConfig, GatewayState, HealthState, RenderFn, ServerConfig};
use parley_prometheus::PrometheusAdapter;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Runs the `parley serve` command.
pub async fn run_serve(config: ParleyConfig) -> Result<(), ParleyError> {
    init_tracing(&config.agent.log_level);

    info!(agent = config.agent.name.as_str(), "starting parley serve");

    let prometheus = if config.prometheus.enabled {
        match PrometheusAdapter::new() {
            Ok(adapter) => {
                info!("prometheus metrics enabled");
                Some(adapter)
            }
            Err(e) => {
                warn!(error = %e, "prometheus initialization failed, continuing without metrics");
                None
            }
        }
    } else {
        None
    };

    let (store, lock) = parley_storage::open_from_config(&config).await?;
    let store = Arc::new(store);
    let lock = Arc::new(lock);
    info!(path = config.storage.database_path.as_str(), "storage ready");

    let delivery = Arc::new(parley_delivery::router_from_config(&config.delivery)?);
    if !delivery.has_route(DeliveryRoute::Primary) {
        warn!("no primary delivery provider configured; outbound messages will fail");
    }

    let client = Arc::new(CompletionClient::new(&config.completion)?);
    info!(
        endpoint = client.endpoint(),
        model = config.completion.default_model.as_str(),
        "completion client ready"
    );

    let processor = Arc::new(CompletionProcessor::new(
        client.clone(),
        delivery.clone(),
        store.clone(),
        ProcessorSettings::from_config(&config.completion),
        &config.agent.first_stage_label,
    ));

    let orchestrator = Orchestrator::new(
        OrchestratorSettings::from_config(&config),
        Collaborators {
            store: store.clone(),
            lock: lock.clone(),
            delivery: delivery.clone(),
            prompts: processor,
        },
        CommandParser::from_config(&config.commands),
    );

    // Delay timers live in memory; rebuild them from persisted deadlines.
    if let Err(e) = orchestrator.reschedule_pending().await {
        warn!(error = %e, "failed to reschedule pending delays");
    }

    let cancel = install_signal_handler();
    let (inbound_tx, inbound_rx) = mpsc::channel(config.gateway.inbound_queue);

    let prometheus_render: Option<RenderFn> = prometheus.map(|adapter| {
        let render: RenderFn = Arc::new(move || adapter.render());
        render
    });
    let state = GatewayState {
        inbound_tx,
        auth: AuthConfig {
            bearer_token: config.gateway.bearer_token.clone(),
            webhook_secret: config.gateway.webhook_secret.clone(),
        },
        health: HealthState {
            start_time: Instant::now(),
            status: None,
            prometheus_render,
        },
    };
    let server_config = ServerConfig {
        host: config.gateway.host.clone(),
        port: config.gateway.port,
    };

    let gateway_cancel = cancel.clone();
    let gateway = tokio::spawn(async move {
        if let Err(e) = parley_gateway::start_server(&server_config, state, gateway_cancel.clone()).await {
            error!(error = %e, "gateway failed, shutting down");
            gateway_cancel.cancel();
        }
    });

    orchestrator.run(inbound_rx, cancel.clone()).await;
    cancel.cancel();

    if let Err(e) = gateway.await {
        error!(error = %e, "gateway task panicked");
    }

    let adapters: [&dyn PluginAdapter; 4] = [&*delivery, &*client, &*lock, &*store];
    for adapter in adapters {
        if let Err(e) = adapter.shutdown().await {
            warn!(adapter = adapter.name(), error = %e, "adapter shutdown failed");
        }
    }

    info!("parley stopped");
    Ok(())
}

/// Initialize the tracing subscriber with an env-filter.
///
/// `RUST_LOG` wins over `agent.log_level` when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
