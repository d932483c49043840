//! Service configuration.
//!
//! Resolution order: built-in defaults → optional JSON file → environment
//! overrides. Every section is `#[serde(default)]`, so a config file only
//! needs the keys it changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MeterError, Result};
use crate::providers::openai::DEFAULT_OPENAI_MODEL;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "RISKMETER_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub meter: MeterConfig,
    pub provider: ProviderConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (default: 0.0.0.0).
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Rating pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// How long a computed verdict is served before recomputing.
    pub cache_ttl_secs: u64,
    pub model: String,
    /// Output-length hint passed to the provider.
    pub max_tokens: u32,
    /// Sampling temperature. `None` leaves the provider default.
    pub temperature: Option<f32>,
    /// Prompt template location. `None` means `prompt.xml` next to the executable.
    pub prompt_path: Option<PathBuf>,
    /// Let one request recompute an expired verdict and share its outcome
    /// with concurrent misses.
    pub coalesce_misses: bool,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 15 * 60,
            model: DEFAULT_OPENAI_MODEL.to_string(),
            max_tokens: 1000,
            temperature: None,
            prompt_path: None,
            coalesce_misses: true,
        }
    }
}

impl MeterConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Generation service connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_base: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Whole-request timeout for one completion call.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = MeterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(MeterError::Config(format!("unknown log format '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Config file path from `RISKMETER_CONFIG`, if set.
    pub fn path_from_env() -> Option<PathBuf> {
        std::env::var_os(CONFIG_PATH_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    /// Parse a JSON config file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            MeterError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&data).map_err(|e| {
            MeterError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Load file (if any), apply process environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                debug!(path = %p.display(), "Loading config file");
                Self::load_from_path(p)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process env in production).
    pub fn apply_env_overrides_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.server.port = parse_number("PORT", &port)?;
        }
        if let Some(bind) = get("RISKMETER_BIND") {
            self.server.bind = bind;
        }
        if let Some(ttl) = get("RISKMETER_CACHE_TTL_SECS") {
            self.meter.cache_ttl_secs = parse_number("RISKMETER_CACHE_TTL_SECS", &ttl)?;
        }
        if let Some(model) = get("RISKMETER_MODEL") {
            self.meter.model = model;
        }
        if let Some(path) = get("RISKMETER_PROMPT_PATH") {
            self.meter.prompt_path = Some(PathBuf::from(path));
        }
        if let Some(format) = get("RISKMETER_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        if let Some(level) = get("RISKMETER_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.meter.model.trim().is_empty() {
            return Err(MeterError::Config("meter.model must not be empty".into()));
        }
        if self.meter.max_tokens == 0 {
            return Err(MeterError::Config("meter.max_tokens must be > 0".into()));
        }
        if let Some(t) = self.meter.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(MeterError::Config(
                    "meter.temperature must be between 0 and 2".into(),
                ));
            }
        }
        if self.provider.api_key_env.trim().is_empty() {
            return Err(MeterError::Config(
                "provider.api_key_env must not be empty".into(),
            ));
        }
        if self.provider.timeout_secs == 0 {
            return Err(MeterError::Config(
                "provider.timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| MeterError::Config(format!("{} must be a number, got '{}'", key, value)))
}
