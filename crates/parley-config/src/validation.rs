// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::ParleyConfig;

/// Validates a deserialized configuration, collecting every problem.
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    if config.storage.max_connections == 0 {
        errors.push(ConfigError::validation(
            "storage.max_connections must be at least 1",
        ));
    }

    if config.agent.max_concurrent_passes == 0 {
        errors.push(ConfigError::validation(
            "agent.max_concurrent_passes must be at least 1",
        ));
    }

    if config.gateway.inbound_queue == 0 {
        errors.push(ConfigError::validation(
            "gateway.inbound_queue must be at least 1",
        ));
    }

    if config.flow.throttle_secs == 0 {
        errors.push(ConfigError::validation(
            "flow.throttle_secs must be at least 1",
        ));
    }

    if config.flow.max_steps_per_pass == 0 {
        errors.push(ConfigError::validation(
            "flow.max_steps_per_pass must be at least 1",
        ));
    }

    // The wait bound must stay below the reclaim threshold or a waiter could
    // outlive the holder it is waiting on.
    if config.lock.wait_timeout() >= config.lock.stale_after() {
        errors.push(ConfigError::validation(format!(
            "lock.wait_timeout_ms ({}) must be shorter than lock.stale_after_secs ({}s)",
            config.lock.wait_timeout_ms, config.lock.stale_after_secs
        )));
    }

    // A live pass must finish its completion call before its lock looks
    // abandoned, or a second pass could reclaim it mid-call.
    let call_budget = config.completion.worst_case_call();
    if call_budget >= config.lock.stale_after() {
        errors.push(ConfigError::validation(format!(
            "completion.timeout_secs ({}s) x {} attempt(s) plus retry pauses ({}s total) must be shorter than lock.stale_after_secs ({}s)",
            config.completion.timeout_secs,
            config.completion.max_retries.saturating_add(1),
            call_budget.as_secs(),
            config.lock.stale_after_secs
        )));
    }

    let temperature = config.completion.temperature;
    if !(0.0..=2.0).contains(&temperature) {
        errors.push(ConfigError::validation(format!(
            "completion.temperature must be within [0, 2], got {temperature}"
        )));
    }

    let mut seen = HashSet::new();
    for entry in &config.completion.device_overrides {
        if !seen.insert(entry.device_id.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate device_id `{}` in [[completion.device_overrides]]",
                entry.device_id
            )));
        }
    }

    let commands = &config.commands;
    for (name, prefix) in [
        ("primary_prefix", &commands.primary_prefix),
        ("secondary_prefix", &commands.secondary_prefix),
    ] {
        if prefix.chars().count() != 1 {
            errors.push(ConfigError::validation(format!(
                "commands.{name} must be a single character, got `{prefix}`"
            )));
        }
    }
    if commands.primary_prefix == commands.secondary_prefix {
        errors.push(ConfigError::validation(
            "commands.primary_prefix and commands.secondary_prefix must differ",
        ));
    }
    if commands.disable_automation == commands.enable_automation {
        errors.push(ConfigError::validation(
            "commands.disable_automation and commands.enable_automation must differ",
        ));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeviceOverride;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&ParleyConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_fails() {
        let mut config = ParleyConfig::default();
        config.storage.database_path = "  ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "database_path"));
    }

    #[test]
    fn wait_timeout_must_be_below_staleness() {
        let mut config = ParleyConfig::default();
        config.lock.stale_after_secs = 2;
        config.lock.wait_timeout_ms = 2000;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "wait_timeout_ms"));
    }

    #[test]
    fn completion_calls_must_fit_inside_staleness_window() {
        let mut config = ParleyConfig::default();
        config.lock.stale_after_secs = 30;
        config.completion.timeout_secs = 60;
        config.completion.max_retries = 1;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "completion.timeout_secs"));

        // 14s x 2 attempts + 1s pause = 29s.
        config.completion.timeout_secs = 14;
        assert!(validate_config(&config).is_ok());

        // 15s x 2 attempts + 1s pause = 31s.
        config.completion.timeout_secs = 15;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn zero_throttle_and_steps_fail() {
        let mut config = ParleyConfig::default();
        config.flow.throttle_secs = 0;
        config.flow.max_steps_per_pass = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "throttle_secs"));
        assert!(has_error(&errors, "max_steps_per_pass"));
    }

    #[test]
    fn zero_inbound_queue_fails() {
        let mut config = ParleyConfig::default();
        config.gateway.inbound_queue = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "inbound_queue"));
    }

    #[test]
    fn duplicate_device_override_fails() {
        let mut config = ParleyConfig::default();
        let entry = DeviceOverride {
            device_id: "dev-vip".into(),
            model: "m".into(),
            api_key: None,
        };
        config.completion.device_overrides = vec![entry.clone(), entry];
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "duplicate device_id"));
    }

    #[test]
    fn identical_prefixes_fail() {
        let mut config = ParleyConfig::default();
        config.commands.secondary_prefix = "%".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "must differ"));
    }

    #[test]
    fn temperature_out_of_range_fails() {
        let mut config = ParleyConfig::default();
        config.completion.temperature = 2.5;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "temperature"));
    }

    #[test]
    fn errors_are_collected_not_short_circuited() {
        let mut config = ParleyConfig::default();
        config.storage.database_path = String::new();
        config.completion.temperature = -1.0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
