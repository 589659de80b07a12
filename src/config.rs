//! Engine configuration
//!
//! Loaded from JSON bytes handed over by the host (the same document that
//! carries the rest of its detection settings). Every field has a default.

use serde::Deserialize;
use thiserror::Error;

use crate::buffers::DEFAULT_MAX_INSTANCES;
use crate::content::SpmAlgorithm;

/// Detection engine configuration
#[derive(Clone, Debug, Deserialize)]
pub struct EngineConfig {
    /// Allow rules on JA3/JA3S buffers
    #[serde(default = "default_ja3_enabled")]
    pub ja3_enabled: bool,

    /// Single-pattern search algorithm for rule literals
    #[serde(default)]
    pub spm_algorithm: SpmAlgorithm,

    /// Highest multi-instance index (exclusive) that will be probed
    #[serde(default = "default_max_buffer_instances")]
    pub max_buffer_instances: u32,

    /// Whether to emit alert events
    #[serde(default = "default_log_alerts")]
    pub log_alerts: bool,
}

fn default_ja3_enabled() -> bool {
    true
}

fn default_max_buffer_instances() -> u32 {
    DEFAULT_MAX_INSTANCES
}

fn default_log_alerts() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ja3_enabled: default_ja3_enabled(),
            spm_algorithm: SpmAlgorithm::default(),
            max_buffer_instances: default_max_buffer_instances(),
            log_alerts: default_log_alerts(),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config_str =
            std::str::from_utf8(bytes).map_err(|e| ConfigError::InvalidUtf8(e.to_string()))?;

        serde_json::from_str(config_str).map_err(|e| ConfigError::InvalidJson(e.to_string()))
    }
}

/// Configuration parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(String),
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.ja3_enabled);
        assert_eq!(config.spm_algorithm, SpmAlgorithm::Horspool);
        assert_eq!(config.max_buffer_instances, DEFAULT_MAX_INSTANCES);
    }

    #[test]
    fn test_parse_config() {
        let json = r#"{"ja3_enabled": false, "spm_algorithm": "kmp", "max_buffer_instances": 8}"#;
        let config = EngineConfig::from_bytes(json.as_bytes()).unwrap();
        assert!(!config.ja3_enabled);
        assert_eq!(config.spm_algorithm, SpmAlgorithm::Kmp);
        assert_eq!(config.max_buffer_instances, 8);
        assert!(config.log_alerts);
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = EngineConfig::from_bytes(b"{}").unwrap();
        assert!(config.ja3_enabled);
        assert_eq!(config.spm_algorithm, SpmAlgorithm::Horspool);
    }

    #[test]
    fn test_invalid_input() {
        assert!(matches!(
            EngineConfig::from_bytes(&[0xff, 0xfe]),
            Err(ConfigError::InvalidUtf8(_))
        ));
        assert!(matches!(
            EngineConfig::from_bytes(b"{\"spm_algorithm\": \"bogus\"}"),
            Err(ConfigError::InvalidJson(_))
        ));
    }
}
