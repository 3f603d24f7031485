use crate::config::ServerConfig;
use pulsemon_common::hash::Hasher;
use pulsemon_storage::database::Database;
use pulsemon_storage::memory::MemoryStore;
use pulsemon_storage::sync::StoreHandle;
use pulsemon_storage::{StorageError, StorageType, Storager};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub gauges: Arc<dyn Storager<f64>>,
    pub counters: Arc<dyn Storager<i64>>,
    pub hasher: Option<Hasher>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        gauges: Arc<dyn Storager<f64>>,
        counters: Arc<dyn Storager<i64>>,
    ) -> anyhow::Result<Self> {
        let hasher = config.hash_key().map(Hasher::new).transpose()?;
        Ok(Self {
            gauges,
            counters,
            hasher,
            config: Arc::new(config),
        })
    }

    /// Builds the stores selected by `config.storage_type`.
    pub async fn from_config(config: ServerConfig) -> anyhow::Result<Self> {
        match config.storage_type {
            StorageType::Memory => {
                tracing::info!("Using in-memory metric storage");
                Self::new(
                    config,
                    Arc::new(MemoryStore::<f64>::new()),
                    Arc::new(MemoryStore::<i64>::new()),
                )
            }
            StorageType::Database => {
                let url = config
                    .database_url
                    .as_deref()
                    .ok_or_else(|| StorageError::InvalidConfig("database_url is not set".into()))?;
                let db = Database::connect(url).await?;
                Self::new(config, Arc::new(db.store::<f64>()), Arc::new(db.store::<i64>()))
            }
        }
    }

    /// Stores in the shape the snapshot sync expects.
    pub fn store_handles(&self) -> Vec<StoreHandle> {
        vec![
            StoreHandle::Gauge(self.gauges.clone()),
            StoreHandle::Counter(self.counters.clone()),
        ]
    }
}
