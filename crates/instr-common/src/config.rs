//! Configuration structures for the instrument device.
//!
//! Supports TOML deserialization with sensible defaults for
//! development and explicit values for production deployment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DeviceError, DeviceResult};

/// Width of the device-name register in bytes.
pub const DEVICE_NAME_LEN: usize = 25;

/// Top-level device configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device identity reported through the common register bank.
    pub identity: IdentityConfig,

    /// Clock-synchronization line configuration.
    pub sync: SyncConfig,

    /// Host transport configuration for the daemon.
    pub transport: TransportConfig,
}

/// Identity constants exposed through the read-only registers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Device type identifier reported by the who-am-i register.
    pub who_am_i: u16,

    /// Hardware version, major part.
    pub hw_version_major: u8,
    /// Hardware version, minor part.
    pub hw_version_minor: u8,

    /// Assembly version.
    pub assembly_version: u8,

    /// Register protocol version, major part.
    pub protocol_version_major: u8,
    /// Register protocol version, minor part.
    pub protocol_version_minor: u8,

    /// Firmware version, major part.
    pub fw_version_major: u8,
    /// Firmware version, minor part.
    pub fw_version_minor: u8,

    /// Human-readable device name (at most 25 bytes).
    pub device_name: String,

    /// Device serial number.
    pub serial_number: u16,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            who_am_i: 1216,
            hw_version_major: 1,
            hw_version_minor: 0,
            assembly_version: 2,
            protocol_version_major: 2,
            protocol_version_minor: 0,
            fw_version_major: 3,
            fw_version_minor: 0,
            device_name: String::from("Virtual Instrument"),
            serial_number: 0,
        }
    }
}

/// Clock-synchronization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Whether the synchronizer is enabled.
    pub enabled: bool,

    /// Calibration offset subtracted from the broadcast time, in
    /// microseconds. The default is the transmission time of one 6-byte
    /// frame at 100 kbaud.
    pub offset_us: u64,

    /// UDP address the daemon listens on for sync-line bytes.
    pub listen_addr: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            offset_us: 600,
            listen_addr: String::from("127.0.0.1:9102"),
        }
    }
}

/// Host transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// TCP address the daemon listens on for host connections.
    pub listen_addr: String,

    /// Per-connection read timeout.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_addr: String::from("127.0.0.1:9101"),
            read_timeout: Duration::from_millis(100),
        }
    }
}

impl DeviceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate cross-field constraints that TOML parsing cannot express.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Config` if the device name does not fit the
    /// fixed-width name register.
    pub fn validate(&self) -> DeviceResult<()> {
        let name_len = self.identity.device_name.len();
        if name_len > DEVICE_NAME_LEN {
            return Err(DeviceError::Config(format!(
                "device name is {name_len} bytes, register holds at most {DEVICE_NAME_LEN}"
            )));
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
