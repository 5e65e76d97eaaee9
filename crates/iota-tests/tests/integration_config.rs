// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Configuration Integration Tests
//!
//! Loads configuration files from disk and runs the agent on the result.
//!
//! ## Test Categories
//!
//! - `test_file_*`: Loading per file format
//! - `test_env_*`: Placeholders and environment overrides
//! - `test_devices_*`: Configured devices reaching the agent

use std::io::Write;
use std::time::Duration;

use iota_config::{ConfigError, ConfigFormat, ConfigLoader, LogFormat, LogLevel};
use iota_core::{resolve, Device};
use iota_opcua::{SecurityMode, SecurityPolicy};
use iota_tests::common::*;
use tempfile::NamedTempFile;

fn write_config(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

// =============================================================================
// File Formats
// =============================================================================

#[test]
fn test_file_yaml() {
    let file = write_config(".yaml", ConfigFixtures::yaml());
    let config = ConfigLoader::new()
        .with_var("PROVIDER_URL", "http://agent.factory:4041")
        .load(file.path())
        .unwrap();

    assert_eq!(config.iota.log_level, LogLevel::Info);
    assert_eq!(config.iota.context_broker.host, "orion");
    assert_eq!(config.iota.provider_url, "http://agent.factory:4041");
    assert_eq!(config.opcua.application_name, "iota-opcua-test");
    assert_eq!(config.opcua.connection_strategy.initial_delay, Duration::from_millis(500));
    assert_eq!(config.opcua.connection_strategy.max_retry, 3);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.devices.len(), 1);
    assert_eq!(config.devices[0].attributes[0].object_id, LEVEL_NODE);
}

#[test]
fn test_file_yaml_keeps_attribute_case() {
    let file = write_config(".yaml", ConfigFixtures::yaml_with_connections());
    let config = ConfigLoader::new().load(file.path()).unwrap();

    assert_eq!(config.iota.log_level, LogLevel::Error);
    let internal = &config.devices[0].internal_attributes;
    assert_eq!(internal["opcuaEndpoint"], E1);
    assert_eq!(internal["opcuaCredentials"]["userName"], "operator");

    let tank = resolve(Some(internal)).unwrap();
    assert_eq!(tank.endpoint, E1);
    assert_eq!(tank.security_mode, SecurityMode::Sign);
    assert_eq!(tank.security_policy, SecurityPolicy::Basic256Sha256);
    assert_eq!(tank.credentials.unwrap().user_name, "operator");

    let pump = resolve(Some(&config.devices[1].internal_attributes)).unwrap();
    assert_eq!(pump.endpoint, E2);
    assert_eq!(pump.security_mode, SecurityMode::None);
}

#[test]
fn test_file_yaml_placeholder_default() {
    let file = write_config(".yml", ConfigFixtures::yaml());
    let config = ConfigLoader::new().load(file.path()).unwrap();
    assert_eq!(config.iota.provider_url, "http://iota-opcua:4041");
}

#[test]
fn test_file_json_with_devices() {
    let file = write_config(".json", ConfigFixtures::json());
    let config = ConfigLoader::new().load(file.path()).unwrap();

    assert_eq!(config.iota.log_level, LogLevel::Warn);
    assert_eq!(config.devices.len(), 2);

    let tank = Device::from_config(&config.devices[0], &config.iota);
    assert_eq!(tank.name, "Tank:tank-1");
    assert_eq!(tank.service, "factory");
    assert_eq!(tank.subservice, "/line1");

    let pump = Device::from_config(&config.devices[1], &config.iota);
    assert_eq!(pump.service, "utilities");
    assert_eq!(pump.subservice, "/line1");

    // The array form is merged in order.
    let descriptor = resolve(Some(&pump.internal_attributes)).unwrap();
    assert_eq!(descriptor.endpoint, E2);
    assert_eq!(descriptor.security_mode, SecurityMode::None);
    assert_eq!(descriptor.security_policy, SecurityPolicy::None);
}

#[test]
fn test_file_toml_keeps_attribute_case() {
    let content = r#"
[iota]
log_level = "ERROR"

[[devices]]
device_id = "tank-1"
entity_type = "Tank"

[[devices.attributes]]
object_id = "ns&eq3&sci&eq1001"
name = "level"
type = "Number"

[devices.internal_attributes]
opcuaEndpoint = "opc.tcp://plc-1.factory:4840"
opcuaSecurityMode = "Sign"
opcuaSecurityPolicy = "Basic256Sha256"

[devices.internal_attributes.opcuaCredentials]
userName = "operator"
password = "secret"
"#;
    let file = write_config(".toml", content);
    let config = ConfigLoader::new().load(file.path()).unwrap();

    assert_eq!(config.iota.log_level, LogLevel::Error);
    let descriptor = resolve(Some(&config.devices[0].internal_attributes)).unwrap();
    assert_eq!(descriptor.endpoint, E1);
    assert_eq!(descriptor.security_mode, SecurityMode::Sign);
    assert_eq!(descriptor.credentials.unwrap().user_name, "operator");
}

#[test]
fn test_file_errors() {
    let loader = ConfigLoader::new();

    assert!(matches!(
        loader.load("/nonexistent/iota.yaml"),
        Err(ConfigError::FileNotFound { .. })
    ));

    let file = write_config(".ini", "[iota]");
    assert!(loader.load(file.path()).is_err());

    let file = write_config(".json", "{ \"iota\": ");
    assert!(matches!(loader.load(file.path()), Err(ConfigError::Parse { .. })));
}

#[test]
fn test_file_duplicate_devices_rejected() {
    let content = r#"{
  "devices": [
    { "device_id": "tank-1", "entity_type": "Tank" },
    { "device_id": "tank-1", "entity_type": "Tank" }
  ]
}"#;
    let file = write_config(".json", content);
    assert!(matches!(
        ConfigLoader::new().load(file.path()),
        Err(ConfigError::DuplicateDeviceId { .. })
    ));
}

// =============================================================================
// Environment
// =============================================================================

#[test]
fn test_env_overrides_applied_after_parsing() {
    let config = ConfigLoader::new()
        .with_var("IOTA_LOG_LEVEL", "error")
        .with_var("IOTA_CB_HOST", "orion.internal")
        .with_var("IOTA_TIMESTAMP", "false")
        .with_var("IOTA_OPCUA_MAX_RETRY", "9")
        .load_from_str(ConfigFixtures::json(), ConfigFormat::Json)
        .unwrap();

    assert_eq!(config.iota.log_level, LogLevel::Error);
    assert_eq!(config.iota.context_broker.host, "orion.internal");
    assert!(!config.iota.timestamp);
    assert_eq!(config.opcua.connection_strategy.max_retry, 9);
}

#[test]
fn test_env_custom_prefix() {
    let config = ConfigLoader::new()
        .with_env_prefix("AGENT")
        .with_var("AGENT_SERVICE", "plant")
        .with_var("IOTA_SERVICE", "ignored")
        .load_from_str(ConfigFixtures::json(), ConfigFormat::Json)
        .unwrap();

    assert_eq!(config.iota.service, "plant");
}

#[test]
fn test_env_invalid_override_names_variable() {
    let err = ConfigLoader::new()
        .with_var("IOTA_NORTH_PORT", "not-a-port")
        .load_from_str(ConfigFixtures::json(), ConfigFormat::Json)
        .unwrap_err();

    match err {
        ConfigError::InvalidEnvVar { name, .. } => assert_eq!(name, "IOTA_NORTH_PORT"),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_env_placeholder_without_default_must_be_set() {
    let content = r#"{ "iota": { "provider_url": "${IOTA_TEST_UNSET_PROVIDER}" } }"#;
    let err = ConfigLoader::new()
        .load_from_str(content, ConfigFormat::Json)
        .unwrap_err();
    assert!(matches!(err, ConfigError::EnvVarNotFound { .. }));
}

// =============================================================================
// Configured Devices
// =============================================================================

#[tokio::test]
async fn test_devices_from_file_started_by_agent() {
    init_test_logging();
    let file = write_config(".json", ConfigFixtures::json());
    let config = ConfigLoader::new().load(file.path()).unwrap();

    let harness = AgentHarness::new();
    harness.start(&config).await.unwrap();

    assert_eq!(harness.pool_size(), 2);
    assert_eq!(harness.server.live_nodes(E1), vec!["ns=3;i=1001"]);
    assert_eq!(harness.server.live_nodes(E2), vec!["ns=3;s=Pump(1).Speed"]);
    assert_eq!(harness.framework.device("pump-1").unwrap().service, "utilities");

    harness.agent.stop().await;
    assert_eq!(harness.pool_size(), 0);
}

#[tokio::test]
async fn test_devices_from_yaml_started_by_agent() {
    let file = write_config(".yaml", ConfigFixtures::yaml_with_connections());
    let config = ConfigLoader::new().load(file.path()).unwrap();

    let harness = AgentHarness::new();
    harness.start(&config).await.unwrap();

    assert_eq!(harness.pool_size(), 2);
    assert_eq!(harness.server.live_nodes(E1), vec!["ns=3;i=1001"]);
    assert_eq!(harness.server.live_nodes(E2), vec!["ns=3;s=Pump(1).Speed"]);

    harness.agent.stop().await;
}

#[tokio::test]
async fn test_devices_yaml_without_connection_parameters_fail_start() {
    let file = write_config(".yaml", ConfigFixtures::yaml());
    let config = ConfigLoader::new().load(file.path()).unwrap();

    let harness = AgentHarness::new();
    let errors = expect_validation(harness.start(&config).await.unwrap_err());
    assert_messages(&errors, &["internalAttributes can't be empty!"]);
    assert_eq!(harness.pool_size(), 0);
    assert!(harness.server.calls().is_empty());
}
