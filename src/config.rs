//! Configuration loader and validator
//!
//! Loads controller settings and quick actions from TOML files in the
//! configs/ directory.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::protocol::constants::{
    DEFAULT_BUTTON_PUSH_MS, DEFAULT_FIRMWARE_VERSION, DEFAULT_HANDSHAKE_NUDGES,
};
use crate::protocol::{ControllerKind, FlashMemory, ProtocolError, ProtocolSettings};
use crate::quick_action::QuickAction;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub settings: Settings,

    /// Scripted input sequences
    #[serde(default)]
    pub quick_actions: Vec<QuickAction>,
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Emulated controller variant
    #[serde(default)]
    pub controller: ControllerKind,

    /// Cadence of the continuous input reports (milliseconds)
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,

    /// Empty reports sent when the channel opens
    #[serde(default = "default_handshake_nudges")]
    pub handshake_nudges: usize,

    #[serde(default = "default_firmware_version")]
    pub firmware_version: [u8; 2],

    /// Controller address ("AA:BB:CC:DD:EE:FF")
    #[serde(default = "default_mac_address")]
    pub mac_address: String,

    /// Optional SPI flash dump of a real controller
    #[serde(default)]
    pub flash_image: Option<PathBuf>,

    /// Hold time of a button push (milliseconds)
    #[serde(default = "default_button_push_ms")]
    pub button_push_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            controller: ControllerKind::default(),
            report_interval_ms: default_report_interval_ms(),
            handshake_nudges: default_handshake_nudges(),
            firmware_version: default_firmware_version(),
            mac_address: default_mac_address(),
            flash_image: None,
            button_push_ms: default_button_push_ms(),
        }
    }
}

fn default_report_interval_ms() -> u64 { 15 }
fn default_handshake_nudges() -> usize { DEFAULT_HANDSHAKE_NUDGES }
fn default_firmware_version() -> [u8; 2] { DEFAULT_FIRMWARE_VERSION }
fn default_mac_address() -> String { "98:B6:E9:00:00:01".to_string() }
fn default_button_push_ms() -> u64 { DEFAULT_BUTTON_PUSH_MS }

/// Parse "AA:BB:CC:DD:EE:FF" (or '-' separated) into six bytes
pub fn parse_mac(address: &str) -> Option<[u8; 6]> {
    let mut bytes = [0u8; 6];
    let mut parts = address.trim().split(|c| c == ':' || c == '-');
    for byte in bytes.iter_mut() {
        let part = parts.next()?;
        if part.len() != 2 || !part.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        *byte = u8::from_str_radix(part, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(bytes)
}

/// Canonical upper-case, colon separated form of an address
pub fn format_mac(bytes: &[u8; 6]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

impl Settings {
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn button_push_duration(&self) -> Duration {
        Duration::from_millis(self.button_push_ms)
    }

    /// Settings handed to the protocol engine
    pub fn protocol_settings(&self) -> Result<ProtocolSettings, ConfigError> {
        let mac_address = parse_mac(&self.mac_address).ok_or_else(|| {
            ConfigError::Invalid(format!("Invalid mac_address '{}'", self.mac_address))
        })?;
        Ok(ProtocolSettings {
            report_interval: self.report_interval(),
            handshake_nudges: self.handshake_nudges,
            firmware_version: self.firmware_version,
            mac_address,
        })
    }

    /// The configured flash image, or the default one
    pub fn load_flash(&self) -> Result<FlashMemory, ProtocolError> {
        match &self.flash_image {
            Some(path) => FlashMemory::load(path),
            None => Ok(FlashMemory::new()),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        info!("Loading configuration from: {}", path_ref.display());

        let content = std::fs::read_to_string(path_ref)?;
        Self::parse(&content)
    }

    /// Load default configuration from configs/default.toml
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load("configs/default.toml")
    }

    /// Parse and validate TOML content
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;

        info!("✓ Config parsed successfully");
        debug!("  - Controller: {}", config.settings.controller);
        debug!("  - Report interval: {} ms", config.settings.report_interval_ms);
        debug!("  - Quick actions: {}", config.quick_actions.len());

        config.validate()?;
        info!("✓ Config validation passed");

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let settings = &self.settings;

        if !(1..=1000).contains(&settings.report_interval_ms) {
            return Err(ConfigError::Invalid(
                "report_interval_ms must be between 1 and 1000".into()
            ));
        }

        if !(1..=100).contains(&settings.handshake_nudges) {
            return Err(ConfigError::Invalid(
                "handshake_nudges must be between 1 and 100".into()
            ));
        }

        if parse_mac(&settings.mac_address).is_none() {
            return Err(ConfigError::Invalid(
                format!("mac_address '{}' is not six hex octets", settings.mac_address)
            ));
        }

        for action in &self.quick_actions {
            action.validate(settings.controller)?;
        }

        Ok(())
    }

    /// Look up a quick action by name
    pub fn quick_action(&self, name: &str) -> Option<&QuickAction> {
        self.quick_actions.iter().find(|a| a.name == name)
    }
}
