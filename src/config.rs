//! Transform configuration.
//!
//! ## Environment
//!
//! - `EMBED_CLIENT_ID_KEY`: wire field carrying placeholder ids (default: `client_id`)
//! - `EMBED_MAX_DEPTH`: maximum embedding depth in either direction (default: 32)

use serde::{Deserialize, Serialize};

/// Default wire field for placeholder ids.
pub const DEFAULT_CLIENT_ID_KEY: &str = "client_id";

/// Default maximum nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Error type for configuration loading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held an unusable value.
    #[error("Invalid value for {var}: {value:?}")]
    InvalidVar {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Settings shared by the flattening and embedding passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Wire field carrying placeholder ids on embedded children.
    pub client_id_key: String,
    /// Maximum embedding depth. The root is depth 0.
    ///
    /// Two types that embed each other `always` would otherwise recurse
    /// without bound on a cyclic record graph.
    pub max_depth: usize,
}

impl EmbedConfig {
    /// Create a config with a custom placeholder field.
    pub fn with_client_id_key(client_id_key: impl Into<String>) -> Self {
        Self {
            client_id_key: client_id_key.into(),
            ..Self::default()
        }
    }

    /// Load from `EMBED_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(key) = std::env::var("EMBED_CLIENT_ID_KEY") {
            if key.trim().is_empty() {
                return Err(ConfigError::InvalidVar { var: "EMBED_CLIENT_ID_KEY", value: key });
            }
            config.client_id_key = key;
        }

        if let Ok(depth) = std::env::var("EMBED_MAX_DEPTH") {
            config.max_depth = match depth.parse::<usize>() {
                Ok(d) if d > 0 => d,
                _ => return Err(ConfigError::InvalidVar { var: "EMBED_MAX_DEPTH", value: depth }),
            };
        }

        Ok(config)
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            client_id_key: DEFAULT_CLIENT_ID_KEY.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EmbedConfig::default();
        assert_eq!(config.client_id_key, "client_id");
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EmbedConfig = serde_json::from_str(r#"{ "client_id_key": "_clientId" }"#).unwrap();
        assert_eq!(config.client_id_key, "_clientId");
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
    }
}
