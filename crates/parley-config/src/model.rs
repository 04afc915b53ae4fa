// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parley orchestrator.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Session lock timing.
    #[serde(default)]
    pub lock: LockConfig,

    /// Flow machine limits and throttle.
    #[serde(default)]
    pub flow: FlowConfig,

    /// Completion service endpoint and sampling.
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Outbound messaging providers.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Inbound webhook server.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Operator commands recognized in the device's own outgoing messages.
    #[serde(default)]
    pub commands: CommandsConfig,

    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// Orchestrator identity and process-wide limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Ceiling on simultaneously running processing passes.
    #[serde(default = "default_max_concurrent_passes")]
    pub max_concurrent_passes: usize,

    /// Stage assigned when a completion reply carries no structure at all.
    #[serde(default = "default_first_stage_label")]
    pub first_stage_label: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            max_concurrent_passes: default_max_concurrent_passes(),
            first_stage_label: default_first_stage_label(),
        }
    }
}

fn default_agent_name() -> String {
    "parley".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_concurrent_passes() -> usize {
    3000
}

fn default_first_stage_label() -> String {
    "First Stage".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Upper bound on concurrent store operations.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("parley").join("parley.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("parley.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_max_connections() -> usize {
    500
}

/// Session lock configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// Age after which a held lock is treated as abandoned.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// How long an acquisition waits on a contended lock row.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
}

impl LockConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            wait_timeout_ms: default_wait_timeout_ms(),
        }
    }
}

fn default_stale_after_secs() -> u64 {
    30
}

fn default_wait_timeout_ms() -> u64 {
    2000
}

/// Flow machine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FlowConfig {
    /// Minimum seconds between bot replies for one conversation.
    #[serde(default = "default_throttle_secs")]
    pub throttle_secs: u64,

    /// Non-suspending nodes one pass may traverse before it is failed.
    #[serde(default = "default_max_steps_per_pass")]
    pub max_steps_per_pass: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            throttle_secs: default_throttle_secs(),
            max_steps_per_pass: default_max_steps_per_pass(),
        }
    }
}

fn default_throttle_secs() -> u64 {
    4
}

fn default_max_steps_per_pass() -> usize {
    64
}

/// OpenAI-compatible completion service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CompletionConfig {
    /// Base URL; `/chat/completions` is appended.
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,

    /// Default credential. `None` requires a device row or override.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries on 429/5xx before the call is reported as failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_unit")]
    pub top_p: f64,

    #[serde(default = "default_unit")]
    pub repetition_penalty: f64,

    /// Devices pinned to a fixed model and credential.
    #[serde(default)]
    pub device_overrides: Vec<DeviceOverride>,
}

impl CompletionConfig {
    /// Pause the client takes between attempts.
    pub const RETRY_PAUSE: Duration = Duration::from_secs(1);

    /// Longest a single completion call can take, retries included.
    pub fn worst_case_call(&self) -> Duration {
        let attempts = self.max_retries.saturating_add(1);
        Duration::from_secs(self.timeout_secs)
            .saturating_mul(attempts)
            .saturating_add(Self::RETRY_PAUSE.saturating_mul(self.max_retries))
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_completion_base_url(),
            api_key: None,
            default_model: default_model(),
            timeout_secs: default_completion_timeout_secs(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
            top_p: default_unit(),
            repetition_penalty: default_unit(),
            device_overrides: Vec::new(),
        }
    }
}

fn default_completion_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_completion_timeout_secs() -> u64 {
    12
}

fn default_max_retries() -> u32 {
    1
}

fn default_temperature() -> f64 {
    0.67
}

fn default_unit() -> f64 {
    1.0
}

/// A device whose completion calls always use a fixed model and credential.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DeviceOverride {
    pub device_id: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Outbound delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub primary: Option<ProviderEndpoint>,

    #[serde(default)]
    pub secondary: Option<ProviderEndpoint>,

    #[serde(default = "default_delivery_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            primary: None,
            secondary: None,
            timeout_secs: default_delivery_timeout_secs(),
        }
    }
}

fn default_delivery_timeout_secs() -> u64 {
    15
}

/// One messaging provider's send endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProviderEndpoint {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Inbound webhook server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token required on webhook requests.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Shared secret for `X-Signature-256` HMAC verification.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Inbound messages buffered ahead of the orchestrator before the
    /// webhook starts answering 503.
    #[serde(default = "default_inbound_queue")]
    pub inbound_queue: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bearer_token: None,
            webhook_secret: None,
            inbound_queue: default_inbound_queue(),
        }
    }
}

fn default_inbound_queue() -> usize {
    1024
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Operator command markers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CommandsConfig {
    /// Prefix relaying the rest of the message through the primary provider.
    #[serde(default = "default_primary_prefix")]
    pub primary_prefix: String,

    /// Prefix relaying the rest of the message through the secondary provider.
    #[serde(default = "default_secondary_prefix")]
    pub secondary_prefix: String,

    /// Sets `human = 1` for the conversation.
    #[serde(default = "default_disable_automation")]
    pub disable_automation: String,

    /// Sets `human = 0` for the conversation.
    #[serde(default = "default_enable_automation")]
    pub enable_automation: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            primary_prefix: default_primary_prefix(),
            secondary_prefix: default_secondary_prefix(),
            disable_automation: default_disable_automation(),
            enable_automation: default_enable_automation(),
        }
    }
}

fn default_primary_prefix() -> String {
    "%".to_string()
}

fn default_secondary_prefix() -> String {
    "#".to_string()
}

fn default_disable_automation() -> String {
    "!human".to_string()
}

fn default_enable_automation() -> String {
    "!bot".to_string()
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    #[serde(default = "default_prometheus_enabled")]
    pub enabled: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: default_prometheus_enabled(),
        }
    }
}

fn default_prometheus_enabled() -> bool {
    true
}
