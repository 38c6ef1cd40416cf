//! Unit tests for configuration module
//!
//! Tests configuration parsing, validation, serialization/deserialization,
//! and edge cases in configuration handling.

use super::*;
use anyhow::Result;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_default_configuration_is_valid() {
    let config = TesseraConfig::default();

    assert!(config.validate().is_ok());
    assert_eq!(config.output.width, 800);
    assert_eq!(config.output.height, 600);
    assert_eq!(config.keyboard.layout, "us");
    assert_eq!(config.seat.default_hotspot, (16, 16));
    assert!(config.seat.click_to_focus);
}

#[test]
fn test_configuration_serialization_roundtrip() -> Result<()> {
    let original_config = TesseraConfig::default();

    let toml_string = toml::to_string(&original_config)?;
    let deserialized_config: TesseraConfig = toml::from_str(&toml_string)?;

    assert_eq!(original_config, deserialized_config);
    Ok(())
}

#[test]
fn test_configuration_from_file() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("test_config.toml");

    let test_config = r#"
[keyboard]
rules = "evdev"
model = "pc104"
layout = "de"
variant = "nodeadkeys"
options = "ctrl:nocaps"

[output]
width = 1920
height = 1080
make = "virtual"

[seat]
name = "seat1"
click_to_focus = false

[xwayland]
enabled = false

[logging]
level = "debug"
"#;

    fs::write(&file_path, test_config)?;

    let config = TesseraConfig::load(&file_path)?;

    assert_eq!(config.keyboard.layout, "de");
    assert_eq!(config.keyboard.variant, "nodeadkeys");
    assert_eq!(config.keyboard.options, "ctrl:nocaps");
    assert_eq!(config.output.width, 1920);
    assert_eq!(config.output.make, "virtual");
    // unspecified keys inside a section keep their defaults
    assert_eq!(config.output.refresh, 60_000);
    assert_eq!(config.seat.name, "seat1");
    assert!(!config.seat.click_to_focus);
    assert!(!config.xwayland.enabled);
    assert_eq!(config.xwayland.max_restarts, 5);
    assert_eq!(config.logging.level, "debug");

    Ok(())
}

#[test]
fn test_empty_file_is_default_configuration() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("empty.toml");
    fs::write(&file_path, "")?;

    let config = TesseraConfig::load(&file_path)?;
    assert_eq!(config, TesseraConfig::default());
    Ok(())
}

#[test]
fn test_invalid_output_size_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("bad_output.toml");
    fs::write(&file_path, "[output]\nwidth = 0\nheight = 600\n")?;

    let err = TesseraConfig::load(&file_path).unwrap_err();
    assert!(err.to_string().contains("Invalid output size"));
    Ok(())
}

#[test]
fn test_invalid_log_level_is_rejected() {
    let mut config = TesseraConfig::default();
    config.logging.level = "verbose".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_keymap_file_allows_empty_layout() {
    let mut config = TesseraConfig::default();
    config.keyboard.layout = String::new();
    assert!(config.validate().is_err());

    config.keyboard.keymap_file = Some("/etc/tessera/keymap.xkb".into());
    assert!(config.validate().is_ok());
}

#[test]
fn test_malformed_toml_reports_path() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("broken.toml");
    fs::write(&file_path, "[output\nwidth = 10")?;

    let err = TesseraConfig::load(&file_path).unwrap_err();
    assert!(format!("{:#}", err).contains("broken.toml"));
    Ok(())
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(TesseraConfig::load("/nonexistent/tessera.toml").is_err());
}

#[test]
fn test_save_then_load() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("saved.toml");

    let mut config = TesseraConfig::default();
    config.output.width = 1024;
    config.keyboard.options = "compose:ralt".to_string();
    config.save(&file_path)?;

    let loaded = TesseraConfig::load(&file_path)?;
    assert_eq!(loaded.output.width, 1024);
    assert_eq!(loaded.keyboard.options, "compose:ralt");
    Ok(())
}
