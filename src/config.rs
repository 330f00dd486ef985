//! Runtime configuration.
//!
//! Loaded from ~/.config/artloop/artloop.yml or .artloop.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::selection::RecencyWindows;

/// Top-level configuration for artloop.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ArtloopConfig {
    /// Image library settings.
    pub library: LibraryConfig,

    /// Recency windows applied to scheduled shuffles.
    pub recency: RecencyWindows,

    /// Device transfer settings.
    pub transfer: TransferConfig,

    /// State and event-history storage.
    pub storage: StorageConfig,

    /// Devices seeded into state at startup, keyed by device id.
    pub devices: BTreeMap<String, DeviceSeed>,
}

impl ArtloopConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .artloop.yml in current directory
    /// 3. ~/.config/artloop/artloop.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(".artloop.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .artloop.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .artloop.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("artloop").join("artloop.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.library.dir.as_os_str().is_empty() {
            eyre::bail!("library.dir must be set");
        }
        if self.transfer.retry_delay_secs == 0 {
            eyre::bail!("transfer.retry-delay-secs must be > 0");
        }
        for (id, device) in &self.devices {
            if device.address.is_empty() {
                eyre::bail!("devices.{id}.address must be set");
            }
        }
        Ok(())
    }
}

/// Image library settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Directory holding metadata.json and the library/ asset directory.
    pub dir: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        let dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("artloop");
        Self { dir }
    }
}

/// Device transfer settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Port of the device art endpoint.
    pub port: u16,

    /// Seconds to wait before the single transfer retry.
    #[serde(rename = "retry-delay-secs")]
    pub retry_delay_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            port: 8002,
            retry_delay_secs: 60,
        }
    }
}

/// State and event-history storage.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Override for the state directory; defaults to
    /// ~/.artloop/<library-hash>.
    #[serde(rename = "state-dir")]
    pub state_dir: Option<PathBuf>,

    /// Override for the event database path; defaults to events.db next to
    /// the state file.
    #[serde(rename = "activity-db")]
    pub activity_db: Option<PathBuf>,
}

/// One configured display device.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceSeed {
    /// Human-readable name; falls back to the device id.
    pub name: String,

    /// Network address of the device.
    pub address: String,

    /// Optional MAC address for wake-on-LAN setups.
    pub mac: Option<String>,
}
