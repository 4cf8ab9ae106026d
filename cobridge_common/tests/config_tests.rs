//! Service configuration loading tests.
//!
//! Tests for `ServiceConfig`: defaults when sections are omitted, register
//! presets, unknown field rejection and semantic validation.

use cobridge_common::config::{ConfigError, ConfigLoader, LogLevel, ServiceConfig};
use cobridge_common::xchg::ValueKind;
use std::fs;
use tempfile::TempDir;

/// Write `content` as cobridge.toml in a fresh directory and load it.
fn load(content: &str) -> Result<ServiceConfig, ConfigError> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cobridge.toml");
    fs::write(&path, content).unwrap();
    ServiceConfig::load(&path)
}

#[test]
fn test_full_config_loads() {
    let config = load(
        r#"
[shared]
log_level = "debug"
service_name = "demexco-test"

[backend]
driver = "simulation"
strict = true
latency_ms = 5

[[backend.registers]]
itf = 0
id = 1
reg = 0x6041
subreg = 0
type = "u16"
value = 1234

[[backend.registers]]
itf = 0
id = 1
reg = 0x6064
type = "i32"
value = -5
counter = true

[events]
channel_capacity = 4
"#,
    )
    .expect("config should load");

    config.validate().expect("config should validate");
    assert_eq!(config.shared.log_level, LogLevel::Debug);
    assert_eq!(config.shared.service_name, "demexco-test");
    assert!(config.backend.strict);
    assert_eq!(config.backend.latency_ms, 5);
    assert_eq!(config.backend.registers.len(), 2);

    let status = &config.backend.registers[0];
    assert_eq!(status.reg, 0x6041);
    assert_eq!(status.kind, ValueKind::U16);
    assert_eq!(status.slot().unwrap().u16(), 1234);
    assert!(!status.counter);

    let position = &config.backend.registers[1];
    assert_eq!(position.subreg, 0);
    assert_eq!(position.slot().unwrap().i32(), -5);
    assert!(position.counter);

    assert_eq!(config.events.channel_capacity, 4);
}

#[test]
fn test_sections_default_when_omitted() {
    let config = load("[shared]\nservice_name = \"x\"\n").unwrap();
    assert_eq!(config.backend.driver, "simulation");
    assert!(config.backend.registers.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn test_unknown_backend_field_rejected() {
    let result = load("[backend]\ndriver = \"simulation\"\nbaudrate = 500000\n");
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn test_unknown_value_kind_rejected() {
    let result = load(
        r#"
[[backend.registers]]
itf = 0
id = 1
reg = 1
type = "f32"
"#,
    );
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn test_empty_driver_fails_validation() {
    let config = load("[backend]\ndriver = \"\"\n").unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));
    assert!(err.to_string().contains("driver"));
}

#[test]
fn test_negative_unsigned_preset_fails_validation() {
    let config = load(
        r#"
[[backend.registers]]
itf = 0
id = 2
reg = 0x1000
type = "u32"
value = -1
"#,
    )
    .unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError(_))
    ));
}
