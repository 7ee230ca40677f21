//! Tests for configuration loading, writing and API key resolution
//!
//! Tests that manipulate API key environment variables are marked with
//! #[serial] so they never run in parallel.

use mw_common::config::{
    load_toml_config, resolve_api_key, write_toml_config, LoggingConfig, TomlConfig,
};
use mw_common::Error;
use serial_test::serial;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_env() {
    std::env::remove_var("GEMINI_API_KEY");
    std::env::remove_var("API_KEY");
}

fn config_with_key(key: Option<&str>) -> TomlConfig {
    TomlConfig {
        api_key: key.map(str::to_string),
        ..Default::default()
    }
}

// ============================================================================
// API key resolution
// ============================================================================

#[test]
#[serial]
fn test_gemini_env_overrides_api_key_env_and_toml() {
    clear_env();
    std::env::set_var("GEMINI_API_KEY", "gemini-env-key");
    std::env::set_var("API_KEY", "generic-env-key");

    let key = resolve_api_key(&config_with_key(Some("toml-key"))).unwrap();
    assert_eq!(key, "gemini-env-key");

    clear_env();
}

#[test]
#[serial]
fn test_api_key_env_fallback() {
    clear_env();
    std::env::set_var("API_KEY", "generic-env-key");

    let key = resolve_api_key(&config_with_key(Some("toml-key"))).unwrap();
    assert_eq!(key, "generic-env-key");

    clear_env();
}

#[test]
#[serial]
fn test_whitespace_env_falls_through_to_toml() {
    clear_env();
    std::env::set_var("GEMINI_API_KEY", "   ");

    let key = resolve_api_key(&config_with_key(Some("toml-key"))).unwrap();
    assert_eq!(key, "toml-key");

    clear_env();
}

#[test]
#[serial]
fn test_missing_key_is_config_error() {
    clear_env();

    let result = resolve_api_key(&config_with_key(None));
    assert!(matches!(result, Err(Error::Config(_))));
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_missing_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent.toml");

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_malformed_file_is_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "port = \"not a number").unwrap();

    let result = load_toml_config(&path);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_load_reads_values() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("mw-studio.toml");
    std::fs::write(
        &path,
        r#"
voice = "Puck"
require_listening_script = false
audio_device = "USB Speakers"

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.voice, "Puck");
    assert!(!config.require_listening_script);
    assert_eq!(config.audio_device.as_deref(), Some("USB Speakers"));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.port, 5730);
}

// ============================================================================
// Atomic write
// ============================================================================

#[test]
fn test_write_then_load_preserves_fields() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("mw-studio.toml");

    let config = TomlConfig {
        api_key: Some("key123".to_string()),
        port: 6123,
        logging: LoggingConfig {
            level: "warn".to_string(),
            file: Some(PathBuf::from("/tmp/mw.log")),
        },
        ..Default::default()
    };

    write_toml_config(&config, &path).unwrap();

    assert!(path.exists());
    assert!(!temp_dir.path().join("nested").join("mw-studio.toml.tmp").exists());

    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
#[cfg(unix)]
fn test_write_sets_permissions_0600() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("mw-studio.toml");

    write_toml_config(&config_with_key(Some("secret")), &path).unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_written_defaults_load_back_as_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("mw-studio.toml");

    write_toml_config(&TomlConfig::default(), &path).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("port = 5730"));
    assert!(!content.contains("api_key"));
    assert_eq!(load_toml_config(&path).unwrap(), TomlConfig::default());
}
