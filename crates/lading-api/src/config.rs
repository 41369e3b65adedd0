//! Service configuration with defaults, file, and environment overrides.

use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use lading_mapper::MapperConfig;
use lading_sync::{ConsumerConfig, SelectorConfig};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.toml";

/// Complete service configuration.
///
/// Loaded in priority order: environment variables (prefix `LADING_`,
/// sections separated by `__`), then `config.toml`, then built-in
/// defaults. The service runs out of the box against local platform
/// stubs; a deployment sets the platform URLs and keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server bind address.
    pub host: String,
    /// Server port.
    pub port: u16,

    /// Order platform base URL, without a trailing slash.
    pub upstream_url: String,
    /// Order platform API key.
    pub upstream_api_key: String,
    /// Shipping platform base URL, without a trailing slash.
    pub downstream_url: String,
    /// Shipping platform API key.
    pub downstream_api_key: String,

    /// Directory holding per-stream checkpoint files.
    pub checkpoint_dir: PathBuf,
    /// Seconds between polling cycles.
    pub poll_interval_seconds: u64,

    /// Event consumer settings.
    pub consumer: ConsumerConfig,
    /// Carrier selection settings.
    pub selector: SelectorConfig,
    /// Order mapping settings.
    pub mapper: MapperConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            upstream_url: "http://localhost:9200".to_string(),
            upstream_api_key: String::new(),
            downstream_url: "http://localhost:9300".to_string(),
            downstream_api_key: String::new(),
            checkpoint_dir: PathBuf::from("./checkpoints"),
            poll_interval_seconds: 60,
            consumer: ConsumerConfig::default(),
            selector: SelectorConfig::default(),
            mapper: MapperConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from defaults, `config.toml`, and the
    /// environment.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("LADING_").split("__"));

        let config: Self = figment.extract().context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// The address the server binds to.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        SocketAddr::from_str(&format!("{}:{}", self.host, self.port))
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.port != 0, "port must be nonzero");
        anyhow::ensure!(!self.upstream_url.is_empty(), "upstream_url must be set");
        anyhow::ensure!(!self.downstream_url.is_empty(), "downstream_url must be set");
        anyhow::ensure!(
            !self.upstream_url.ends_with('/') && !self.downstream_url.ends_with('/'),
            "platform URLs must not end with a slash"
        );
        anyhow::ensure!(self.poll_interval_seconds >= 1, "poll_interval_seconds must be at least 1");
        anyhow::ensure!(
            self.consumer.fan_out_batch >= 1,
            "consumer.fan_out_batch must be at least 1"
        );
        Ok(())
    }
}
