// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Parley configuration system.

use parley_config::diagnostic::ConfigError;
use parley_config::model::ParleyConfig;
use parley_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

#[test]
fn full_toml_deserializes() {
    let toml = r##"
[agent]
name = "parley-test"
log_level = "debug"
max_concurrent_passes = 10
first_stage_label = "Greeting"

[storage]
database_path = "/tmp/parley-test.db"
wal_mode = false
max_connections = 8

[lock]
stale_after_secs = 10
wait_timeout_ms = 500

[flow]
throttle_secs = 2
max_steps_per_pass = 16

[completion]
base_url = "http://localhost:9999/v1"
api_key = "sk-default"
default_model = "model-a"
timeout_secs = 4
temperature = 0.5

[[completion.device_overrides]]
device_id = "dev-vip"
model = "model-vip"
api_key = "sk-vip"

[delivery]
timeout_secs = 5

[delivery.primary]
name = "wablas"
base_url = "http://primary.local"
api_key = "p-key"

[delivery.secondary]
name = "whacenter"
base_url = "http://secondary.local"

[gateway]
host = "0.0.0.0"
port = 8080
bearer_token = "secret"

[commands]
primary_prefix = "%"
secondary_prefix = "#"

[prometheus]
enabled = false
"##;

    let config = load_and_validate_str(toml).expect("valid TOML should load");
    assert_eq!(config.agent.name, "parley-test");
    assert_eq!(config.agent.max_concurrent_passes, 10);
    assert_eq!(config.agent.first_stage_label, "Greeting");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.lock.wait_timeout().as_millis(), 500);
    assert_eq!(config.flow.throttle_secs, 2);
    assert_eq!(config.completion.device_overrides.len(), 1);
    assert_eq!(config.completion.device_overrides[0].model, "model-vip");
    assert_eq!(
        config.delivery.primary.as_ref().map(|p| p.name.as_str()),
        Some("wablas")
    );
    assert!(config.delivery.secondary.as_ref().unwrap().api_key.is_none());
    assert_eq!(config.gateway.port, 8080);
    assert!(!config.prometheus.enabled);
}

#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.agent.name, "parley");
    assert_eq!(config.agent.max_concurrent_passes, 3000);
    assert_eq!(config.agent.first_stage_label, "First Stage");
    assert_eq!(config.storage.max_connections, 500);
    assert_eq!(config.lock.stale_after_secs, 30);
    assert_eq!(config.lock.wait_timeout_ms, 2000);
    assert_eq!(config.flow.throttle_secs, 4);
    assert_eq!(config.completion.temperature, 0.67);
    assert_eq!(config.completion.top_p, 1.0);
    assert_eq!(config.completion.repetition_penalty, 1.0);
    assert_eq!(config.commands.primary_prefix, "%");
    assert_eq!(config.commands.secondary_prefix, "#");
    assert!(config.delivery.primary.is_none());
    assert!(config.gateway.bearer_token.is_none());
}

#[test]
fn unknown_key_is_rejected_with_suggestion() {
    let toml = r#"
[flow]
throtle_secs = 3
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    let suggestion = errors.iter().find_map(|e| match e {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } if key == "throtle_secs" => suggestion.clone(),
        _ => None,
    });
    assert_eq!(suggestion.as_deref(), Some("throttle_secs"));
}

#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[gateway]
port = "eighty"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject wrong type");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. } | ConfigError::Other(_))),
        "got: {errors:?}"
    );
}

#[test]
fn validation_runs_after_successful_parse() {
    let toml = r#"
[lock]
stale_after_secs = 1
wait_timeout_ms = 5000
"#;

    let errors = load_and_validate_str(toml).expect_err("lock timing is inconsistent");
    assert!(errors.iter().any(
        |e| matches!(e, ConfigError::Validation { message } if message.contains("wait_timeout_ms"))
    ));
}

#[test]
fn dotted_override_wins_over_toml() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let config: ParleyConfig = Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::string("[completion]\ndefault_model = \"from-toml\"\n"))
        .merge(("completion.default_model", "from-env"))
        .extract()
        .expect("should merge override");

    assert_eq!(config.completion.default_model, "from-env");
}

#[test]
fn load_from_explicit_path() {
    let dir = std::env::temp_dir().join(format!("parley-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("parley.toml");
    std::fs::write(&path, "[agent]\nname = \"from-file\"\n").unwrap();

    let config = load_and_validate_path(&path).expect("file should load");
    assert_eq!(config.agent.name, "from-file");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn defaults_serialize_to_json() {
    let json = serde_json::to_value(ParleyConfig::default()).unwrap();
    assert_eq!(json["flow"]["max_steps_per_pass"], 64);
    assert_eq!(json["commands"]["disable_automation"], "!human");
}
