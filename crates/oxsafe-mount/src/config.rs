//! Mount settings persisted as JSON in the platform config directory.

use std::net::IpAddr;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::binder::{DEFAULT_PORT_RANGE, LOOPBACK};
use crate::recent::DEFAULT_MAX_ENTRIES;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Failed to find config directory")]
    NoConfigDir,
    #[error("Invalid port range {low}..={high}")]
    InvalidPortRange { low: u16, high: u16 },
}

/// Application directories (config, data) for oxsafe.
pub fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("com", "oxsafe", "oxsafe").ok_or(ConfigError::NoConfigDir)
}

/// Settings shared by every mount an [`Orchestrator`](crate::Orchestrator) makes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Address the server listens on. Only loopback addresses make sense.
    pub bind_address: IpAddr,
    /// Lowest port tried when searching for a free one
    pub port_low: u16,
    /// Highest port tried when searching for a free one
    pub port_high: u16,
    /// Always use this port instead of searching
    pub fixed_port: Option<u16>,
    /// Number of recently used containers remembered
    pub recent_paths_max: usize,
    /// How long an OS mount or unmount command may run before it is abandoned
    #[serde(with = "humantime_serde")]
    pub attach_timeout: Duration,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            bind_address: LOOPBACK,
            port_low: *DEFAULT_PORT_RANGE.start(),
            port_high: *DEFAULT_PORT_RANGE.end(),
            fixed_port: None,
            recent_paths_max: DEFAULT_MAX_ENTRIES,
            attach_timeout: Duration::from_secs(10),
        }
    }
}

impl MountConfig {
    pub fn port_range(&self) -> RangeInclusive<u16> {
        self.port_low..=self.port_high
    }

    /// Check values that deserialization alone cannot rule out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Port 0 asks the OS for an arbitrary port
        match self.fixed_port {
            Some(0) => return Err(ConfigError::InvalidPortRange { low: 0, high: 0 }),
            Some(_) => {}
            None if self.port_low == 0 || self.port_low > self.port_high => {
                return Err(ConfigError::InvalidPortRange {
                    low: self.port_low,
                    high: self.port_high,
                });
            }
            None => {}
        }
        if !self.bind_address.is_loopback() {
            tracing::warn!(
                address = %self.bind_address,
                "Server bind address is not loopback; the drive will be reachable from the network"
            );
        }
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(project_dirs()?.config_dir().join("config.json"))
    }

    /// Load from the default location, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load() -> Self {
        let path = match Self::config_path() {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("Could not determine config path: {}", e);
                return Self::default();
            }
        };
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(ConfigError::Read(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file found, using defaults");
                Self::default()
            }
            Err(e) => {
                tracing::error!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {}", path.display());

        Ok(())
    }
}
