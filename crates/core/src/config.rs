//! Server configuration, loaded from a TOML file.
//!
//! Everything except the blacklist is read-only after load and shared as
//! `Arc<Config>`. The blacklist can grow at runtime (a penalty trip with
//! the blacklist reaction configured appends the offender's IP) and each
//! append is persisted immediately by rewriting the config file. When no
//! file exists at the configured path, one is seeded with the defaults.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Listener and admission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Listener bind address.
    pub address: String,
    /// Listener bind port.
    pub port: u16,
    /// Hard cap on simultaneous clients.
    pub max_clients: usize,
    /// Cap on simultaneous connections from one IP; `-1` disables it.
    pub max_per_ip: i32,
    /// Worker thread count; absent means detected parallelism.
    pub workers: Option<usize>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            address: "127.0.0.1".to_string(),
            port: 10003,
            max_clients: 1024,
            max_per_ip: 10,
            workers: None,
        }
    }
}

/// Abuse-control settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyConfig {
    /// Master switch for the penalty system.
    pub enabled: bool,
    /// Trip threshold.
    pub max_points: u32,
    /// Sliding window length in seconds.
    pub window_seconds: u64,
    /// Close the connection on trip.
    pub disconnect_on_limit: bool,
    /// Drop the current command on trip.
    pub ignore_on_limit: bool,
    /// Add the IP to the persistent blacklist on trip.
    pub blacklist_on_limit: bool,
    /// Per-command costs.
    pub costs: PenaltyCosts,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        PenaltyConfig {
            enabled: true,
            max_points: 85,
            window_seconds: 10,
            disconnect_on_limit: true,
            ignore_on_limit: true,
            blacklist_on_limit: true,
            costs: PenaltyCosts::default(),
        }
    }
}

/// Cost charged per command, roughly proportional to how expensive each
/// one is to serve.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyCosts {
    pub version: u32,
    pub list: u32,
    pub register: u32,
    pub set_hostname: u32,
    pub set_mapname: u32,
    pub set_current_users: u32,
    pub set_max_users: u32,
    pub set_gametype: u32,
    pub client_count: u32,
    pub ping: u32,
    pub invite: u32,
}

impl Default for PenaltyCosts {
    fn default() -> Self {
        PenaltyCosts {
            version: 1,
            list: 3,
            register: 5,
            set_hostname: 3,
            set_mapname: 3,
            set_current_users: 3,
            set_max_users: 3,
            set_gametype: 3,
            client_count: 2,
            ping: 1,
            invite: 3,
        }
    }
}

/// Serialized form of the whole config file. The blacklist array comes
/// first so it is emitted before the `[network]` and `[penalty]` tables.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct ConfigFile {
    blacklist: Vec<String>,
    network: NetworkConfig,
    penalty: PenaltyConfig,
}

/// Runtime configuration.
///
/// Constructed via [`Config::load`] for a real deployment or
/// [`Config::default`] for an in-memory instance (no persistence), which
/// is what the tests use.
#[derive(Debug)]
pub struct Config {
    pub network: NetworkConfig,
    pub penalty: PenaltyConfig,
    blacklist: Mutex<HashSet<String>>,
    path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            network: NetworkConfig::default(),
            penalty: PenaltyConfig::default(),
            blacklist: Mutex::new(HashSet::new()),
            path: None,
        }
    }
}

impl Config {
    /// Load configuration from `path`, seeding the file with defaults if
    /// it does not exist yet.
    pub fn load(path: &Path) -> Result<Config> {
        let (file, seeded) = if path.exists() {
            let text = fs::read_to_string(path)?;
            (toml::from_str::<ConfigFile>(&text)?, false)
        } else {
            tracing::info!(path = %path.display(), "no config file found, writing defaults");
            (ConfigFile::default(), true)
        };

        let config = Config {
            network: file.network,
            penalty: file.penalty,
            blacklist: Mutex::new(file.blacklist.into_iter().collect()),
            path: Some(path.to_path_buf()),
        };
        if seeded {
            config.persist()?;
        }
        Ok(config)
    }

    /// Whether `ip` is on the persistent blacklist.
    pub fn is_blacklisted(&self, ip: &str) -> bool {
        self.blacklist.lock().contains(ip)
    }

    /// Add `ip` to the blacklist and persist immediately.
    ///
    /// Persistence failures are logged rather than propagated; the
    /// in-memory blacklist still applies for the life of the process.
    pub fn blacklist_ip(&self, ip: &str) {
        {
            let mut blacklist = self.blacklist.lock();
            if !blacklist.insert(ip.to_string()) {
                tracing::debug!(ip, "IP already blacklisted");
                return;
            }
        }
        tracing::info!(ip, "IP blacklisted");
        if let Err(e) = self.persist() {
            tracing::warn!(error = %e, "failed to persist blacklist");
        }
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut blacklist: Vec<String> = self.blacklist.lock().iter().cloned().collect();
        blacklist.sort();
        let file = ConfigFile {
            blacklist,
            network: self.network.clone(),
            penalty: self.penalty.clone(),
        };
        fs::write(path, toml::to_string_pretty(&file)?)?;
        Ok(())
    }
}
