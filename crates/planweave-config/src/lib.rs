//! Configuration for the planweave engine.
//!
//! A small YAML file selects the chat model, output verbosity, endpoint,
//! and retry settings. Every field has a default, so an absent or empty
//! file yields a working configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chat models known to work with the recognizer prompt.
pub const CHAT_MODELS: &[&str] = &[
    "gpt-3.5-turbo",
    "gpt-4",
    "gpt-4-turbo",
    "gpt-4o",
    "o1-preview",
    "o1-mini",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Retry settings for chat requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat model used for recognition and model-backed commands.
    pub chat_model: String,
    /// 0 silent, 1 show the graph, 2 also show raw plan text.
    pub verbosity: u8,
    /// OpenAI-compatible chat-completions endpoint.
    pub endpoint: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub retry: RetrySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chat_model: "gpt-4o".to_string(),
            verbosity: 1,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.2,
            retry: RetrySettings::default(),
        }
    }
}

impl Config {
    pub fn new(chat_model: impl Into<String>, verbosity: u8) -> Result<Self, ConfigError> {
        let config = Self {
            chat_model: chat_model.into(),
            verbosity,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chat_model.is_empty() {
            return Err(ConfigError::Invalid("chat_model is empty".to_string()));
        }
        if self.verbosity > 2 {
            return Err(ConfigError::Invalid(format!(
                "verbosity must be 0, 1, or 2, got {}",
                self.verbosity
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.endpoint.is_empty() {
            return Err(ConfigError::Invalid("endpoint is empty".to_string()));
        }
        Ok(())
    }

    /// API key from the configured environment variable, if set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok()
    }
}

/// Rough instruction-following tier of a model: 3 for the gpt-4 family,
/// 2 for gpt-3.5, 1 otherwise. Callers may relax prompting for higher tiers.
pub fn understanding_level(model: &str) -> u8 {
    if model.starts_with("gpt-4") || model.starts_with("o1") {
        3
    } else if model.starts_with("gpt-3.5") {
        2
    } else {
        1
    }
}

/// Whether a model name is on the known-good list. Unknown models are
/// allowed, callers just warn.
pub fn model_is_known(model: &str) -> bool {
    CHAT_MODELS.contains(&model)
}

/// Load and validate a config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&text)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_verbosity() {
        let err = Config::new("gpt-4o", 3).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("verbosity")));
    }

    #[test]
    fn test_rejects_empty_model() {
        let err = Config::new("", 1).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("chat_model")));
    }

    #[test]
    fn test_load_partial_yaml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chat_model: gpt-4\nverbosity: 2").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.chat_model, "gpt-4");
        assert_eq!(config.verbosity, 2);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_load_invalid_yaml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chat_model: [unclosed").unwrap();
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn test_model_is_known() {
        assert!(model_is_known("gpt-4o"));
        assert!(!model_is_known("made-up-model"));
    }

    #[test]
    fn test_understanding_levels() {
        assert_eq!(understanding_level("gpt-4o"), 3);
        assert_eq!(understanding_level("gpt-3.5-turbo"), 2);
        assert_eq!(understanding_level("some-local-model"), 1);
    }
}
