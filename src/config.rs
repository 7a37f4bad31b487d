//! Configuration Management
//!
//! Loads the run configuration for hxpolicy from a YAML file. Every field has
//! a default so a partial file (or no file at all) is valid; command-line
//! flags override file values in `main`.

use crate::context::AccountContext;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://intersight.com/api/v1";

/// Environment variable that overrides any configured token
pub const TOKEN_ENV: &str = "HXPOLICY_TOKEN";

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    60
}

fn default_concurrency() -> usize {
    1
}

fn default_smtp_port() -> u16 {
    25
}

fn default_alert_timeout() -> u64 {
    10
}

fn default_helo_name() -> String {
    "localhost".to_string()
}

/// Mail settings for the availability alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default = "default_alert_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_helo_name")]
    pub helo_name: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            sender: String::new(),
            recipients: Vec::new(),
            timeout_secs: default_alert_timeout(),
            helo_name: default_helo_name(),
        }
    }
}

impl AlertConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the management API
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Literal bearer token
    #[serde(default)]
    pub token: Option<String>,
    /// File holding the bearer token
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Service account description used in alerts
    #[serde(default)]
    pub account: AccountContext,
    /// Files attached to the availability alert
    #[serde(default)]
    pub attachments: Vec<PathBuf>,
    #[serde(default)]
    pub alert: AlertConfig,
    /// Policy file replacing the embedded default set
    #[serde(default)]
    pub policies: Option<PathBuf>,
    /// Maximum creates in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token: None,
            token_file: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            account: AccountContext::default(),
            attachments: Vec::new(),
            alert: AlertConfig::default(),
            policies: None,
            concurrency: default_concurrency(),
        }
    }
}

/// Where the token comes from, after precedence is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Literal(String),
    File(PathBuf),
}

impl Config {
    /// Default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hxpolicy").join("config.yaml"))
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("Failed to parse configuration YAML")
    }

    /// Load configuration. An explicit path must exist; the default path
    /// is optional and falls back to defaults when absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    tracing::debug!("No configuration file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration file {:?}", path))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid configuration file {:?}", path))?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Effective token source (env > token > token_file)
    pub fn token_source(&self, env_token: Option<String>) -> Option<TokenSource> {
        env_token
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.token.clone().filter(|t| !t.trim().is_empty()))
            .map(TokenSource::Literal)
            .or_else(|| self.token_file.clone().map(TokenSource::File))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
