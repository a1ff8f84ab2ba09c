use std::{collections::HashMap, fs, path::Path};

use serde::{Deserialize, Serialize};

/// Address the webhook server listens on when none is configured.
pub const DEFAULT_LISTEN: &str = ":8080";

/// Shortest bearer token the webhook server accepts.
pub const MIN_TOKEN_LEN: usize = 8;

/// Config represents the contents of a dronetrigger.yml file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the Drone server
    pub url: String,
    /// API token used for all calls to Drone
    pub token: String,
    /// Webhook server settings, only needed by dronetrigger-web
    pub web: Option<WebConfig>,
}

/// WebConfig holds the settings of the webhook server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebConfig {
    /// Bearer token required per repository
    #[serde(default)]
    pub bearer_token: HashMap<String, String>,
    /// Listen address, `:port` binds all interfaces
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

#[derive(Deserialize)]
struct RawConfig {
    url: Option<String>,
    token: Option<String>,
    web: Option<WebConfig>,
}

impl Config {
    /// Loads a Config from a YAML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the config file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_str(&contents)
    }

    /// Parses a Config from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed or `url`/`token` are missing.
    pub fn from_str(yaml: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        let url = required(raw.url, "url")?;
        let token = required(raw.token, "token")?;

        Ok(Config {
            url: url.trim_end_matches('/').to_string(),
            token,
            web: raw.web.map(|mut web| {
                if web.listen.is_empty() {
                    web.listen = default_listen();
                }
                web
            }),
        })
    }

    /// Returns the webhook server settings.
    pub fn web(&self) -> Result<&WebConfig, ConfigError> {
        self.web.as_ref().ok_or(ConfigError::MissingWeb)
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

impl WebConfig {
    /// Checks that every configured bearer token is long enough.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut repos: Vec<&String> = self.bearer_token.keys().collect();
        repos.sort();
        for repo in repos {
            if self.bearer_token[repo].len() < MIN_TOKEN_LEN {
                return Err(ConfigError::TokenTooShort(repo.clone()));
            }
        }
        Ok(())
    }

    /// Returns the bearer token configured for `repo`, if any.
    pub fn token_for(&self, repo: &str) -> Option<&str> {
        self.bearer_token.get(repo).map(String::as_str)
    }

    /// Returns the listen address in a form a socket can bind.
    pub fn bind_address(&self) -> String {
        if self.listen.starts_with(':') {
            format!("0.0.0.0{}", self.listen)
        } else {
            self.listen.clone()
        }
    }
}

/// Errors that can occur when loading or validating a Config.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading the file
    #[error("unable to open config: {0}")]
    IoError(String),
    /// Error parsing the YAML
    #[error("unable to parse config: {0}")]
    ParseError(String),
    /// Required field is missing
    #[error("missing required field: {0}")]
    MissingField(String),
    /// No `web` section present
    #[error("no configuration for web found")]
    MissingWeb,
    /// Bearer token below the minimum length
    #[error("configured bearer token for {0:?} is too short")]
    TokenTooShort(String),
}
