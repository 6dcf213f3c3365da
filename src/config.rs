//! Configuration loading and validation.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConfigError, Result, ValidationError};

/// Main configuration for the hosts container.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Identifier of the rules list generated from the hosts files.
    #[serde(default = "default_list_id")]
    pub list_id: i32,

    /// Root of the file system the hosts paths are relative to.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Hosts files or directories of hosts files, read in order.
    #[serde(default = "default_hosts_paths")]
    pub hosts_paths: Vec<PathBuf>,

    /// Prometheus metrics settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Expose a `/metrics` endpoint.
    #[serde(default)]
    pub enabled: bool,

    /// Address of the `/metrics` endpoint.
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            list_id: default_list_id(),
            root: default_root(),
            hosts_paths: default_hosts_paths(),
            metrics: MetricsConfig::default(),
        }
    }
}

const fn default_list_id() -> i32 {
    1
}

fn default_root() -> PathBuf {
    PathBuf::from("/")
}

const fn default_metrics_listen() -> SocketAddr {
    SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::LOCALHOST), 9090)
}

/// Returns the location of the system hosts file, relative to the root.
#[must_use]
pub fn default_hosts_paths() -> Vec<PathBuf> {
    let path = if cfg!(target_os = "windows") {
        "Windows/System32/drivers/etc/hosts"
    } else if cfg!(target_os = "macos") {
        "private/etc/hosts"
    } else {
        "etc/hosts"
    };

    vec![PathBuf::from(path)]
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::Validation(ValidationError::EmptyRoot).into());
        }

        for (index, path) in self.hosts_paths.iter().enumerate() {
            if path.as_os_str().is_empty() {
                return Err(
                    ConfigError::Validation(ValidationError::EmptyHostsPath { index }).into(),
                );
            }
        }

        Ok(())
    }
}
