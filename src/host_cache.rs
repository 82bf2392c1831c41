//! Known console cache for quick reconnection
//!
//! This module manages a local cache of consoles the controller has paired
//! with, storing their Bluetooth addresses so a front-end can offer
//! "reconnect to last console".

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{format_mac, parse_mac};

/// Cache file name
const CACHE_FILENAME: &str = "console_cache.json";

#[derive(Debug, Error)]
pub enum HostCacheError {
    #[error("Failed to write console cache: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode console cache: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid console address: {0}")]
    InvalidAddress(String),
}

/// Get the cache file path (in the same directory as the executable or current dir)
pub fn default_cache_path() -> PathBuf {
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            return exe_dir.join(CACHE_FILENAME);
        }
    }

    PathBuf::from(CACHE_FILENAME)
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A console seen on the interrupt channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownConsole {
    /// Address in "AA:BB:CC:DD:EE:FF" form
    pub address: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Last seen timestamp (Unix seconds)
    #[serde(default)]
    pub last_seen: u64,
}

/// Console cache storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostCache {
    /// Map of address -> console info
    pub consoles: HashMap<String, KnownConsole>,

    #[serde(skip)]
    path: Option<PathBuf>,
}

impl HostCache {
    /// Create a new empty, unsaved cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the cache stored next to the executable
    pub fn load() -> Self {
        Self::load_from(default_cache_path())
    }

    /// Load a cache file, starting empty if it is missing or unreadable
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let mut cache = match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<HostCache>(&content) {
                Ok(cache) => {
                    debug!("Loaded console cache from: {}", path.display());
                    cache
                }
                Err(e) => {
                    warn!("Failed to parse console cache: {}", e);
                    Self::new()
                }
            },
            Err(_) => {
                debug!("No existing console cache found at: {}", path.display());
                Self::new()
            }
        };
        cache.path = Some(path.to_path_buf());
        cache
    }

    /// Save the cache where it was loaded from (or next to the executable)
    pub fn save(&self) -> Result<(), HostCacheError> {
        let path = self.path.clone().unwrap_or_else(default_cache_path);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;

        info!("Saved console cache to: {}", path.display());
        Ok(())
    }

    /// Add or refresh a console
    pub fn remember(&mut self, address: &str, name: Option<String>) -> Result<(), HostCacheError> {
        let bytes = parse_mac(address).ok_or_else(|| HostCacheError::InvalidAddress(address.to_string()))?;
        let address = format_mac(&bytes);

        info!("Caching console: {}", address);
        let name = name.or_else(|| self.consoles.get(&address).and_then(|c| c.name.clone()));
        self.consoles.insert(
            address.clone(),
            KnownConsole {
                address,
                name,
                last_seen: now_secs(),
            },
        );
        Ok(())
    }

    pub fn get(&self, address: &str) -> Option<&KnownConsole> {
        let address = format_mac(&parse_mac(address)?);
        self.consoles.get(&address)
    }

    /// The console seen most recently
    pub fn most_recent(&self) -> Option<&KnownConsole> {
        self.consoles.values().max_by_key(|c| c.last_seen)
    }

    pub fn forget(&mut self, address: &str) -> Option<KnownConsole> {
        let address = format_mac(&parse_mac(address)?);
        self.consoles.remove(&address)
    }

    pub fn clear(&mut self) {
        self.consoles.clear();
    }

    pub fn len(&self) -> usize {
        self.consoles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consoles.is_empty()
    }

    /// All consoles, most recent first
    pub fn list_all(&self) -> Vec<&KnownConsole> {
        let mut consoles: Vec<_> = self.consoles.values().collect();
        consoles.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.address.cmp(&b.address)));
        consoles
    }
}
