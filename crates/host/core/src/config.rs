//! Configuration of the batch repository.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// The role a host plays in the network.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Produces batches. Falls back to its own enclave for batches it is missing.
    #[display("sequencer")]
    Sequencer,
    /// Follows the sequencer. Recovers missing batches from peers.
    #[default]
    #[display("validator")]
    Validator,
}

/// Errors raised while loading a [`RepositoryConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration is not valid TOML or does not match the expected layout.
    #[error("invalid repository config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is outside its accepted range.
    #[error("invalid repository config: {0}")]
    InvalidValue(String),
}

/// Tunables of the [`BatchRepository`](crate::BatchRepository).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Role of this host.
    pub node_type: NodeType,
    /// Upper bound on the number of batches sent in reply to a single catch-up request.
    pub max_batches_in_response: usize,
    /// How long an unanswered catch-up request suppresses new ones, in seconds.
    pub catch_up_request_timeout_secs: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            node_type: NodeType::default(),
            max_batches_in_response: Self::DEFAULT_MAX_BATCHES_IN_RESPONSE,
            catch_up_request_timeout_secs: Self::DEFAULT_CATCH_UP_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl RepositoryConfig {
    /// Default cap on batches served per catch-up request.
    pub const DEFAULT_MAX_BATCHES_IN_RESPONSE: usize = 50;

    /// Default freshness window of an in-flight catch-up request.
    pub const DEFAULT_CATCH_UP_REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Creates a default configuration for the given role.
    pub fn for_node_type(node_type: NodeType) -> Self {
        Self { node_type, ..Default::default() }
    }

    /// Parses a configuration from TOML. Missing keys take their default value.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        if config.max_batches_in_response == 0 {
            return Err(ConfigError::InvalidValue(
                "max_batches_in_response must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Returns `true` if this host is the sequencer.
    pub const fn is_sequencer(&self) -> bool {
        matches!(self.node_type, NodeType::Sequencer)
    }

    /// Freshness window of an in-flight catch-up request.
    pub const fn catch_up_request_timeout(&self) -> Duration {
        Duration::from_secs(self.catch_up_request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RepositoryConfig::default();
        assert_eq!(config.node_type, NodeType::Validator);
        assert_eq!(config.max_batches_in_response, 50);
        assert_eq!(config.catch_up_request_timeout(), Duration::from_secs(30));
        assert!(!config.is_sequencer());
    }

    #[test]
    fn test_from_toml_fills_missing_keys() {
        let config = RepositoryConfig::from_toml("node_type = \"sequencer\"").expect("parse");
        assert!(config.is_sequencer());
        assert_eq!(config.max_batches_in_response, 50);

        let config = RepositoryConfig::from_toml(
            "max_batches_in_response = 10\ncatch_up_request_timeout_secs = 5",
        )
        .expect("parse");
        assert_eq!(config.node_type, NodeType::Validator);
        assert_eq!(config.max_batches_in_response, 10);
        assert_eq!(config.catch_up_request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_from_toml_rejects_bad_input() {
        assert!(matches!(
            RepositoryConfig::from_toml("node_type = \"observer\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            RepositoryConfig::from_toml("max_batches_in_response = 0"),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_node_type_display() {
        assert_eq!(NodeType::Sequencer.to_string(), "sequencer");
        assert_eq!(NodeType::Validator.to_string(), "validator");
    }
}
