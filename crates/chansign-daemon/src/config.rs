//! Configuration file management.

use std::path::PathBuf;
use std::time::Duration;

use bitcoin::Network;
use chansign_engine::broadcast::BroadcastConfig;
use chansign_engine::EngineConfig;
use chansign_guard::GuardPolicy;
use serde::{Deserialize, Serialize};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub bitcoin: BitcoinConfig,
    /// Channel policy.
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Double-spend guard windows.
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Broadcast retry.
    #[serde(default)]
    pub broadcast: BroadcastSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinConfig {
    /// `bitcoin`, `testnet`, `signet` or `regtest`.
    #[serde(default = "default_network")]
    pub network: Network,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_min_lock_time")]
    pub min_lock_time_secs: u64,
    #[serde(default = "default_max_lock_time_days")]
    pub max_lock_time_days: u64,
    /// Time-locked inputs this close to expiry are not instant.
    #[serde(default = "default_lock_time_threshold")]
    pub lock_time_threshold_secs: u64,
    #[serde(default = "default_fee")]
    pub refund_fee_sat: u64,
    #[serde(default = "default_fee")]
    pub payment_fee_sat: u64,
    #[serde(default = "default_dust_limit")]
    pub dust_limit_sat: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default = "default_day")]
    pub time_skew_secs: u64,
    #[serde(default = "default_day")]
    pub spent_retention_secs: u64,
    #[serde(default = "default_day")]
    pub burn_expiry_secs: u64,
    /// How often the maintenance task sweeps expired rows.
    #[serde(default = "default_day")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastSection {
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
    /// 0 = retry until shutdown.
    #[serde(default)]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions

fn default_network() -> Network {
    Network::Testnet
}

fn default_min_lock_time() -> u64 {
    3_600
}

fn default_max_lock_time_days() -> u64 {
    30
}

fn default_lock_time_threshold() -> u64 {
    4 * 3_600
}

fn default_fee() -> u64 {
    10_000
}

fn default_dust_limit() -> u64 {
    chansign_types::DUST_LIMIT_SAT
}

fn default_day() -> u64 {
    chansign_types::DAY_SECS
}

fn default_cache_capacity() -> usize {
    chansign_types::DEFAULT_CACHE_CAPACITY
}

fn default_retry_backoff() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BitcoinConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            min_lock_time_secs: default_min_lock_time(),
            max_lock_time_days: default_max_lock_time_days(),
            lock_time_threshold_secs: default_lock_time_threshold(),
            refund_fee_sat: default_fee(),
            payment_fee_sat: default_fee(),
            dust_limit_sat: default_dust_limit(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            time_skew_secs: default_day(),
            spent_retention_secs: default_day(),
            burn_expiry_secs: default_day(),
            sweep_interval_secs: default_day(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

impl Default for BroadcastSection {
    fn default() -> Self {
        Self {
            retry_backoff_secs: default_retry_backoff(),
            max_attempts: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Engine policy assembled from the channel, guard and cache sections.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            network: self.bitcoin.network,
            min_lock_time_secs: self.channel.min_lock_time_secs,
            max_lock_time_days: self.channel.max_lock_time_days,
            lock_time_threshold_secs: self.channel.lock_time_threshold_secs,
            refund_fee_sat: self.channel.refund_fee_sat,
            payment_fee_sat: self.channel.payment_fee_sat,
            dust_limit_sat: self.channel.dust_limit_sat,
            cache_capacity: self.cache.capacity,
            guard: GuardPolicy {
                time_skew_secs: self.guard.time_skew_secs,
                spent_retention_secs: self.guard.spent_retention_secs,
                burn_expiry_secs: self.guard.burn_expiry_secs,
            },
        }
    }

    pub fn broadcast_config(&self) -> BroadcastConfig {
        BroadcastConfig {
            retry_backoff: Duration::from_secs(self.broadcast.retry_backoff_secs),
            max_attempts: self.broadcast.max_attempts,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        // A zero interval would make tokio::time::interval panic.
        Duration::from_secs(self.guard.sweep_interval_secs.max(1))
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// `$CHANSIGN_DATA_DIR`, else `$HOME/.chansign`.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("CHANSIGN_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".chansign"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/chansign"))
    }
}
