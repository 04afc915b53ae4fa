// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley flow` subcommands.

use std::path::Path;

use parley_config::ParleyConfig;
use parley_core::traits::{ConversationStore, PluginAdapter};
use parley_core::ParleyError;
use parley_flow::FlowDefinition;

fn read_flow(path: &Path) -> Result<(String, FlowDefinition), ParleyError> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| ParleyError::Config(format!("cannot read {}: {e}", path.display())))?;
    let flow = FlowDefinition::load(&json)?;
    Ok((json, flow))
}

fn describe(flow: &FlowDefinition) -> String {
    format!("{} nodes, {} edges", flow.nodes().len(), flow.edges().len())
}

/// Parses and validates a flow file.
pub fn validate_file(path: &Path) -> Result<String, ParleyError> {
    let (_, flow) = read_flow(path)?;
    Ok(format!("{}: valid ({})", path.display(), describe(&flow)))
}

/// Validates a flow file and stores it as the device's active flow.
///
/// Invalid flows are never written.
pub async fn import_file(
    config: &ParleyConfig,
    device_id: &str,
    path: &Path,
) -> Result<String, ParleyError> {
    let (json, flow) = read_flow(path)?;
    let (store, _lock) = parley_storage::open_from_config(config).await?;
    store.store_flow(device_id, &json).await?;
    store.shutdown().await?;
    Ok(format!("imported flow for {device_id} ({})", describe(&flow)))
}
