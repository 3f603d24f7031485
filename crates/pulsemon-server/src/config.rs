use pulsemon_common::hash::DEFAULT_HASH_HEADER;
use pulsemon_storage::sync::SyncConfig;
use pulsemon_storage::StorageType;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default)]
    pub storage_type: StorageType,
    /// Used when `storage_type = "db"`.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Shared key for request verification and response signing.
    #[serde(default)]
    pub hash_key: Option<String>,
    #[serde(default = "default_hash_header")]
    pub hash_header: String,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Snapshot file settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// `0` writes the snapshot only on shutdown.
    #[serde(default = "default_store_interval")]
    pub store_interval_secs: i64,
    #[serde(default = "default_file_storage_path")]
    pub file_storage_path: String,
    #[serde(default = "default_true")]
    pub restore: bool,
    #[serde(default = "default_true")]
    pub flush_on_shutdown: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            store_interval_secs: default_store_interval(),
            file_storage_path: default_file_storage_path(),
            restore: true,
            flush_on_shutdown: true,
        }
    }
}

impl SyncSettings {
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig {
            interval_secs: self.store_interval_secs,
            path: PathBuf::from(&self.file_storage_path),
            restore: self.restore,
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_hash_header() -> String {
    DEFAULT_HASH_HEADER.to_string()
}

fn default_store_interval() -> i64 {
    300
}

fn default_file_storage_path() -> String {
    "tmp/metrics.tsv".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            storage_type: StorageType::default(),
            database_url: None,
            hash_key: None,
            hash_header: default_hash_header(),
            sync: SyncSettings::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage_type == StorageType::Database && self.database_url.is_none() {
            anyhow::bail!("database_url is required when storage_type = \"db\"");
        }
        if self.sync.store_interval_secs < 0 {
            anyhow::bail!("sync.store_interval_secs must not be negative");
        }
        Ok(())
    }

    /// Snapshot settings for the selected backend.
    ///
    /// The database already keeps every metric across restarts, and replaying
    /// a snapshot of running totals through the accumulating counter upsert
    /// would double them, so restore is only honoured for memory storage.
    pub fn sync_config(&self) -> SyncConfig {
        let mut sync = self.sync.to_sync_config();
        sync.restore &= self.storage_type == StorageType::Memory;
        sync
    }

    /// The verification key, ignoring an empty string.
    pub fn hash_key(&self) -> Option<&str> {
        self.hash_key.as_deref().filter(|k| !k.is_empty())
    }
}
