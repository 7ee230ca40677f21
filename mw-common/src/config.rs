//! Configuration loading for MaestroWarmup
//!
//! Settings are resolved in priority order:
//! 1. Command-line arguments (handled by the binary)
//! 2. Environment variables (API key)
//! 3. TOML configuration file
//! 4. Built-in defaults

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variables consulted for the API key, highest priority first
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_PORT: u16 = 5730;
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_VOICE: &str = "Kore";
pub const DEFAULT_METADATA_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// Studio configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Gemini API key (environment takes precedence)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub models: ModelConfig,

    /// Prebuilt voice used for speech synthesis
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Timeout applied to every AI request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Largest accepted lesson document upload
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Treat a listening activity without a script as a failed generation
    #[serde(default = "default_true")]
    pub require_listening_script: bool,

    /// Output device name (default device if unset or not found)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_device: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Model identifiers per AI operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_metadata_model")]
    pub metadata: String,
    #[serde(default = "default_generation_model")]
    pub generation: String,
    #[serde(default = "default_speech_model")]
    pub speech: String,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: default_api_base_url(),
            port: default_port(),
            bind_address: default_bind_address(),
            logging: LoggingConfig::default(),
            models: ModelConfig::default(),
            voice: default_voice(),
            request_timeout_secs: default_request_timeout_secs(),
            max_upload_bytes: default_max_upload_bytes(),
            require_listening_script: true,
            audio_device: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            metadata: default_metadata_model(),
            generation: default_generation_model(),
            speech: default_speech_model(),
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

fn default_metadata_model() -> String {
    DEFAULT_METADATA_MODEL.to_string()
}

fn default_generation_model() -> String {
    DEFAULT_GENERATION_MODEL.to_string()
}

fn default_speech_model() -> String {
    DEFAULT_SPEECH_MODEL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

/// Default config file location: `{config_dir}/maestro-warmup/mw-studio.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("maestro-warmup").join("mw-studio.toml"))
}

/// Load TOML configuration.
///
/// A missing file yields defaults; a file that exists but cannot be read or
/// parsed is a configuration error. Runs before logging is initialized, so
/// callers report which file was used.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Write TOML configuration atomically (temp file + rename).
///
/// On Unix the file is restricted to 0600 since it may hold the API key.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    std::fs::write(&tmp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    debug!("Wrote configuration to {}", path.display());
    Ok(())
}

/// Resolve the Gemini API key.
///
/// **Priority:** `GEMINI_API_KEY` → `API_KEY` → TOML `api_key`
pub fn resolve_api_key(toml_config: &TomlConfig) -> Result<String> {
    for var in API_KEY_ENV_VARS {
        if let Ok(key) = std::env::var(var) {
            if is_valid_key(&key) {
                info!("API key loaded from environment variable {}", var);
                return Ok(key);
            }
        }
    }

    if let Some(key) = toml_config.api_key.as_ref() {
        if is_valid_key(key) {
            info!("API key loaded from TOML config");
            return Ok(key.clone());
        }
    }

    Err(Error::Config(
        "Gemini API key not configured. Please configure using one of:\n\
         1. Environment: GEMINI_API_KEY=your-key-here\n\
         2. TOML config: ~/.config/maestro-warmup/mw-studio.toml (api_key = \"your-key\")"
            .to_string(),
    ))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.port, 5730);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.voice, "Kore");
        assert_eq!(config.models.speech, "gemini-2.5-flash-preview-tts");
        assert_eq!(config.max_upload_bytes, 20 * 1024 * 1024);
        assert!(config.require_listening_script);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            port = 6000

            [models]
            generation = "gemini-custom"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 6000);
        assert_eq!(config.models.generation, "gemini-custom");
        assert_eq!(config.models.metadata, DEFAULT_METADATA_MODEL);
        assert_eq!(config.request_timeout_secs, 120);
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   \t"));
    }
}
