//! Repository configuration.

use serde::Deserialize;

use strongroom_session::SessionConfig;

use crate::error::{RepositoryError, Result};

/// Configuration for the repository service.
///
/// Secrets are not part of it; they live in
/// [`ServerKeys`](strongroom_session::ServerKeys).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Session lifetime in seconds.
    pub session_ttl_secs: i64,
    /// Name of the role created for an organization's founder.
    pub founding_role: String,
    /// Reject requests declaring `Encryption: none`.
    pub require_encryption: bool,
    /// Repackage responses as `{"code","data"}` with status 200.
    pub obfuscate_responses: bool,
    /// Attempts at a session update before reporting a conflict.
    pub max_session_retries: u32,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 30 * 60,
            founding_role: "Managers".to_string(),
            require_encryption: true,
            obfuscate_responses: true,
            max_session_retries: 8,
        }
    }
}

impl RepositoryConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| RepositoryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.session_ttl_secs <= 0 {
            return Err(RepositoryError::Config("session_ttl_secs must be positive".into()));
        }
        if self.founding_role.trim().is_empty() {
            return Err(RepositoryError::Config("founding_role must not be empty".into()));
        }
        if self.max_session_retries == 0 {
            return Err(RepositoryError::Config("max_session_retries must be at least 1".into()));
        }
        Ok(())
    }

    /// The session manager's share of the configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ttl_secs: self.session_ttl_secs,
            max_retries: self.max_session_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RepositoryConfig::default();
        assert_eq!(config.session_ttl_secs, 1800);
        assert_eq!(config.founding_role, "Managers");
        assert!(config.require_encryption);
    }

    #[test]
    fn test_partial_json() {
        let config = RepositoryConfig::from_json(r#"{"founding_role": "Founders"}"#).unwrap();
        assert_eq!(config.founding_role, "Founders");
        assert_eq!(config.session_ttl_secs, 1800);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(RepositoryConfig::from_json(r#"{"session_ttl_secs": 0}"#).is_err());
        assert!(RepositoryConfig::from_json(r#"{"founding_role": " "}"#).is_err());
        assert!(RepositoryConfig::from_json("not json").is_err());
    }
}
