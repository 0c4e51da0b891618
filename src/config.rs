//! Configuration
//!
//! Layered configuration for the ledger, the HTTP server and the CLI:
//! - Built-in defaults for every section
//! - Optional TOML file (`llm-usage.toml`, `.llm-usage.toml`, or the user
//!   config directory), or an explicit path
//! - Environment variable overrides
//! - Validation before anything is built from it
//!
//! The loaded [`Config`] is passed to whatever needs it; there is no global.

use crate::partition::DEFAULT_PARTITION_PREFIX;
use crate::pricing::PricingEntry;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::info;

pub const LOG_FORMATS: [&str; 2] = ["pretty", "json"];
pub const LOG_OUTPUTS: [&str; 3] = ["console", "file", "both"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
    pub server: ServerConfig,
    pub pricing: PricingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the usage partitions
    pub usage_log_directory: PathBuf,
    pub partition_prefix: String,
    /// Directory for the application's own log files
    pub log_directory: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Entries layered over the built-in table
    pub models: Vec<PricingEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub json_pretty: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "WARN".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            usage_log_directory: PathBuf::from("./cost_logs"),
            partition_prefix: DEFAULT_PARTITION_PREFIX.to_string(),
            log_directory: PathBuf::from("logs"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("Invalid server host: {}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Config {
    /// Load from `explicit` if given, otherwise from the first config file
    /// found, then apply environment overrides and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => Self::discover()?,
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn discover() -> Result<Self> {
        let candidates = [
            Some(PathBuf::from("llm-usage.toml")),
            Some(PathBuf::from(".llm-usage.toml")),
            dirs::config_dir().map(|d| d.join("llm-usage").join("config.toml")),
        ];

        for path in candidates.iter().flatten() {
            if path.exists() {
                info!(config_file = %path.display(), "Loading configuration from file");
                return Self::load_from_file(path);
            }
        }

        Ok(Self::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from any key lookup; the process environment in
    /// production, a map in tests.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Some(val) = lookup("LOG_OUTPUT") {
            self.logging.output = val;
        }

        if let Some(val) = lookup("COST_LOG_DIR") {
            self.paths.usage_log_directory = PathBuf::from(val);
        }
        if let Some(val) = lookup("LLM_USAGE_PARTITION_PREFIX") {
            self.paths.partition_prefix = val;
        }
        if let Some(val) = lookup("LLM_USAGE_APP_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        if let Some(val) = lookup("LLM_USAGE_HOST") {
            self.server.host = val;
        }
        if let Some(val) = lookup("PORT") {
            self.server.port = val.trim().parse().context("Invalid PORT")?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            bail!(
                "Log format must be one of {:?}, got {:?}",
                LOG_FORMATS,
                self.logging.format
            );
        }
        if !LOG_OUTPUTS.contains(&self.logging.output.as_str()) {
            bail!(
                "Log output must be one of {:?}, got {:?}",
                LOG_OUTPUTS,
                self.logging.output
            );
        }

        let prefix = &self.paths.partition_prefix;
        if prefix.trim().is_empty() {
            bail!("Partition prefix must not be empty");
        }
        if prefix.contains(['/', '\\']) {
            bail!("Partition prefix must be a file name prefix, got {prefix:?}");
        }

        if self.server.port == 0 {
            bail!("Server port must be greater than 0");
        }

        for entry in &self.pricing.models {
            entry
                .validate()
                .with_context(|| format!("Invalid pricing override for {}", entry.model_id))?;
        }

        Ok(())
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Configuration saved to file");
        Ok(())
    }
}
