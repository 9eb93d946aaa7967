//! Configuration loading for the recap engine.
//!
//! Layered precedence: built-in defaults -> config file
//! (~/.config/recap/config.toml) -> environment variables (RECAP_*) ->
//! CLI flags (applied by the caller after loading).

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::RecapError;

/// Extraction oracle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSettings {
    /// Provider name ("openai" or "anthropic")
    #[serde(default = "default_extraction_provider")]
    pub provider: String,

    /// Model name (e.g. "gpt-4o-mini", "claude-3-haiku-20240307")
    #[serde(default = "default_extraction_model")]
    pub model: String,

    /// API key (set via RECAP_EXTRACTION_API_KEY, not the config file)
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL override (for custom endpoints)
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Instruction template override; a built-in template is used if unset
    #[serde(default)]
    pub instructions: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Output token cap for the extraction call
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum API retries before reporting failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_extraction_provider() -> String {
    "openai".to_string()
}

fn default_extraction_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_output_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            provider: default_extraction_provider(),
            model: default_extraction_model(),
            api_key: None,
            api_base_url: None,
            instructions: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Digest compiler configuration.
///
/// The 1500-character default matches the context budget the digest is
/// injected under; it is configurable rather than hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestSettings {
    /// Hard character cap for the compiled digest
    #[serde(default = "default_digest_max_chars")]
    pub max_chars: usize,
}

fn default_digest_max_chars() -> usize {
    1500
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            max_chars: default_digest_max_chars(),
        }
    }
}

/// Merge engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeSettings {
    /// Ring-buffer capacity for merge deltas
    #[serde(default = "default_delta_capacity")]
    pub delta_capacity: usize,
}

fn default_delta_capacity() -> usize {
    20
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            delta_capacity: default_delta_capacity(),
        }
    }
}

/// Main engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecapConfig {
    /// Path to the RocksDB storage directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Whether turn processing is enabled at all. This is the settings
    /// collaborator's policy knob; the engine itself never consults it.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Extraction oracle settings
    #[serde(default)]
    pub extraction: ExtractionSettings,

    /// Digest compiler settings
    #[serde(default)]
    pub digest: DigestSettings,

    /// Merge engine settings
    #[serde(default)]
    pub merge: MergeSettings,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "recap")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RecapConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            enabled: default_enabled(),
            log_level: default_log_level(),
            extraction: ExtractionSettings::default(),
            digest: DigestSettings::default(),
            merge: MergeSettings::default(),
        }
    }
}

impl RecapConfig {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/recap/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (RECAP_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, RecapError> {
        let config_dir = ProjectDirs::from("", "", "recap")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| RecapError::Config(e.to_string()))?
            .set_default("enabled", default_enabled())
            .map_err(|e| RecapError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| RecapError::Config(e.to_string()))?
            .set_default("extraction.provider", default_extraction_provider())
            .map_err(|e| RecapError::Config(e.to_string()))?
            .set_default("extraction.model", default_extraction_model())
            .map_err(|e| RecapError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: RECAP_DB_PATH, RECAP_EXTRACTION__API_KEY, etc.
        // Double underscore separates nesting levels so that keys
        // containing underscores survive.
        builder = builder.add_source(
            Environment::with_prefix("RECAP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| RecapError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| RecapError::Config(e.to_string()))
    }

    /// Expand ~ in db_path to the actual home directory.
    pub fn expanded_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(home).join(rest);
            }
        }
        PathBuf::from(&self.db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RecapConfig::default();
        assert!(config.enabled);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.extraction.provider, "openai");
        assert_eq!(config.digest.max_chars, 1500);
        assert_eq!(config.merge.delta_capacity, 20);
    }

    #[test]
    fn test_load_with_defaults() {
        let config = RecapConfig::load(None).unwrap();
        assert_eq!(config.digest.max_chars, 1500);
        assert_eq!(config.extraction.max_retries, 3);
    }

    #[test]
    fn test_expanded_db_path_passthrough() {
        let config = RecapConfig {
            db_path: "/var/lib/recap/db".to_string(),
            ..RecapConfig::default()
        };
        assert_eq!(config.expanded_db_path(), PathBuf::from("/var/lib/recap/db"));
    }

    #[test]
    fn test_extraction_settings_fill_defaults() {
        // serde defaults fill in everything a partial source omits
        let settings: ExtractionSettings =
            serde_json::from_value(serde_json::json!({ "provider": "anthropic" })).unwrap();
        assert_eq!(settings.provider, "anthropic");
        assert_eq!(settings.max_output_tokens, 1024);
        assert!(settings.api_key.is_none());
    }
}
