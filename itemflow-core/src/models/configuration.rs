//! Configuration data structures

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Logging level configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum LogLevel {
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "info")]
    #[default]
    Info,
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "trace")]
    Trace,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Logging verbosity level
    pub log_level: LogLevel,
    /// Repository document (JSON or YAML)
    pub repository_path: PathBuf,
    /// Principal used when none is given
    pub default_user: String,
    /// Session discriminator for resumable operations
    pub session: String,
    /// Comment recorded when an item enters a workflow
    pub item_created_comment: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            repository_path: PathBuf::from("repository.json"),
            default_user: "anonymous".to_string(),
            session: "default".to_string(),
            item_created_comment: crate::models::DEFAULT_ITEM_CREATED_COMMENT.to_string(),
        }
    }
}

impl Configuration {
    /// Load configuration from file
    pub fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Configuration = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Return default configuration if file doesn't exist
            Ok(Configuration::default())
        }
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the XDG config directory path
    pub fn default_config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_dir = dirs::config_dir().ok_or("Could not determine config directory")?;
        Ok(config_dir.join("itemflow").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.repository_path.as_os_str().is_empty() {
            errors.push("repository_path must not be empty".to_string());
        }

        if !is_valid_identity(&self.default_user) {
            errors.push("default_user must be a non-empty name without whitespace".to_string());
        }

        if !is_valid_identity(&self.session) {
            errors.push("session must be a non-empty name without whitespace".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn is_valid_identity(name: &str) -> bool {
    !name.is_empty() && name.len() <= 128 && !name.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.session, "default");
        assert_eq!(config.item_created_comment, "Item created");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_configuration_validation() {
        let config = Configuration {
            repository_path: PathBuf::new(),
            default_user: "two words".to_string(),
            session: String::new(),
            ..Configuration::default()
        };

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("repository_path")));
        assert!(errors.iter().any(|e| e.contains("default_user")));
        assert!(errors.iter().any(|e| e.contains("session")));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Configuration = toml::from_str("log_level = \"debug\"").unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.default_user, "anonymous");
    }

    #[test]
    fn test_config_file_operations() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config").join("itemflow.toml");

        let config = Configuration {
            default_user: "editor".to_string(),
            session: "web-42".to_string(),
            ..Configuration::default()
        };

        config.save_to_file(&config_path).unwrap();
        assert!(config_path.exists());

        let loaded = Configuration::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.default_user, "editor");
        assert_eq!(loaded.session, "web-42");
    }

    #[test]
    fn test_missing_file_returns_defaults() {
        let temp_dir = tempdir().unwrap();
        let loaded = Configuration::load_from_file(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.session, "default");
    }
}
