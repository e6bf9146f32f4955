//! Serializable engine configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file is a valid
//! config:
//!
//! ```toml
//! max_in_flight = 4
//!
//! [providers.polygon]
//! base_url = "https://api.polygon.io"
//! timeout_secs = 30
//! api_key_env = "POLYGON_API_KEY"
//! ```

use crate::domain::{Credentials, ProviderName};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Connection settings for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub base_url: String,
    /// Per-call timeout. A timeout is reported as a transport error for that pair.
    pub timeout_secs: u64,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl ProviderSettings {
    fn new(base_url: &str, timeout_secs: u64, api_key_env: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            timeout_secs,
            api_key_env: api_key_env.to_string(),
        }
    }

    pub fn default_for(provider: ProviderName) -> Self {
        match provider {
            ProviderName::Eodhd => Self::new("https://eodhd.com", 30, "EODHD_API_KEY"),
            ProviderName::Databento => {
                Self::new("https://hist.databento.com", 60, "DATABENTO_API_KEY")
            }
            ProviderName::Polygon => Self::new("https://api.polygon.io", 30, "POLYGON_API_KEY"),
            ProviderName::ThetaData => Self::new("http://127.0.0.1:25510", 30, "THETADATA_API_KEY"),
        }
    }
}

fn default_eodhd() -> ProviderSettings {
    ProviderSettings::default_for(ProviderName::Eodhd)
}

fn default_databento() -> ProviderSettings {
    ProviderSettings::default_for(ProviderName::Databento)
}

fn default_polygon() -> ProviderSettings {
    ProviderSettings::default_for(ProviderName::Polygon)
}

fn default_thetadata() -> ProviderSettings {
    ProviderSettings::default_for(ProviderName::ThetaData)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_eodhd")]
    pub eodhd: ProviderSettings,
    #[serde(default = "default_databento")]
    pub databento: ProviderSettings,
    #[serde(default = "default_polygon")]
    pub polygon: ProviderSettings,
    #[serde(default = "default_thetadata")]
    pub thetadata: ProviderSettings,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            eodhd: default_eodhd(),
            databento: default_databento(),
            polygon: default_polygon(),
            thetadata: default_thetadata(),
        }
    }
}

impl ProvidersConfig {
    pub fn get(&self, provider: ProviderName) -> &ProviderSettings {
        match provider {
            ProviderName::Eodhd => &self.eodhd,
            ProviderName::Databento => &self.databento,
            ProviderName::Polygon => &self.polygon,
            ProviderName::ThetaData => &self.thetadata,
        }
    }
}

fn default_max_in_flight() -> usize {
    4
}

/// Engine configuration: concurrency bound and per-provider connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of adapter calls running at once.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_in_flight == 0 {
            return Err(ConfigError::Invalid("max_in_flight must be at least 1".into()));
        }
        for provider in ProviderName::ALL {
            let settings = self.providers.get(provider);
            if settings.timeout_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "providers.{provider}.timeout_secs must be at least 1"
                )));
            }
            if !(settings.base_url.starts_with("http://") || settings.base_url.starts_with("https://"))
            {
                return Err(ConfigError::Invalid(format!(
                    "providers.{provider}.base_url must be an http(s) URL, got '{}'",
                    settings.base_url
                )));
            }
        }
        Ok(())
    }

    /// Read each provider's API key from its configured environment variable.
    pub fn credentials_from_env(&self) -> Credentials {
        Credentials::from_lookup(|provider| {
            std::env::var(&self.providers.get(provider).api_key_env).ok()
        })
    }
}
