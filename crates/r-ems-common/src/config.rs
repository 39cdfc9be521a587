//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the core runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use r_ems_channel::{Properties, ASSET_DESCRIPTION_KEY, DRIVER_PID_KEY};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_gateway_name() -> String {
    "r-ems-gateway".to_owned()
}

fn default_channel_capacity() -> usize {
    256
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(1_000)
}

fn default_true() -> bool {
    true
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9898))
}

/// Primary configuration object for the gateway daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub assets: IndexMap<String, AssetConfig>,
}

/// Metadata describing where a [`GatewayConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedGatewayConfig {
    pub config: GatewayConfig,
    pub source: PathBuf,
}

impl GatewayConfig {
    pub const ENV_CONFIG_PATH: &str = "R_EMS_GATEWAY_CONFIG";

    /// Load configuration from disk, respecting the `R_EMS_GATEWAY_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedGatewayConfig> {
        let env_path = std::env::var(Self::ENV_CONFIG_PATH)
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        let source = match env_path {
            Some(path) => path,
            None => candidates
                .iter()
                .map(|candidate| candidate.as_ref())
                .find(|candidate| candidate.exists())
                .map(Path::to_path_buf)
                .ok_or_else(|| {
                    anyhow!(
                        "no configuration files found. inspected: {}",
                        candidates
                            .iter()
                            .map(|p| p.as_ref().display().to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                })?,
        };

        let config = Self::from_path(&source)?;
        Ok(LoadedGatewayConfig { config, source })
    }

    /// Read, parse and validate one file.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<GatewayConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Retrieve an asset configuration by name.
    pub fn asset(&self, name: &str) -> Option<&AssetConfig> {
        self.assets.get(name)
    }

    /// Assets that should be started.
    pub fn enabled_assets(&self) -> impl Iterator<Item = (&String, &AssetConfig)> {
        self.assets.iter().filter(|(_, asset)| asset.enabled)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.name.trim().is_empty() {
            return Err(anyhow!("gateway name must not be empty"));
        }
        if self.gateway.channel_capacity == 0 {
            return Err(anyhow!("gateway channel_capacity must be greater than zero"));
        }
        if self.assets.is_empty() {
            return Err(anyhow!("configuration must contain at least one asset"));
        }
        for (name, asset) in &self.assets {
            asset.validate(name)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for GatewayConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: GatewayConfig =
            toml::from_str(content).context("failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Gateway-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySection {
    #[serde(default = "default_gateway_name")]
    pub name: String,
    /// Capacity of each asset's downstream broadcast channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            name: default_gateway_name(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// One asset: a driver binding plus its flat property bag.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Driver kind the asset binds to.
    pub driver: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,
    /// Emit options and channel definitions.
    #[serde(default)]
    pub properties: IndexMap<String, JsonValue>,
}

impl AssetConfig {
    pub fn validate(&self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(anyhow!("asset names must not be empty"));
        }
        if self.driver.trim().is_empty() {
            return Err(anyhow!("asset '{}' must name a driver", name));
        }
        if self.poll_interval.is_zero() {
            return Err(anyhow!(
                "asset '{}' must use a non-zero poll_interval",
                name
            ));
        }
        Ok(())
    }

    /// Property bag with the asset-level keys filled in from the typed fields.
    ///
    /// Explicit entries in `properties` win.
    pub fn property_bag(&self) -> Properties {
        let mut bag = self.properties.clone();
        bag.entry(DRIVER_PID_KEY.to_owned())
            .or_insert_with(|| JsonValue::String(self.driver.clone()));
        if let Some(description) = &self.description {
            bag.entry(ASSET_DESCRIPTION_KEY.to_owned())
                .or_insert_with(|| JsonValue::String(description.clone()));
        }
        bag
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_metrics_listen(),
        }
    }
}
