//! Metric storage for the pulsemon server and agent.
//!
//! Every store holds one metric kind and implements [`Storager`]. Two
//! backends exist: [`memory::MemoryStore`], a lock-guarded map, and
//! [`database::DbStore`], an upserting SQL table reached through sea-orm.
//! [`sync::FileSync`] mirrors any set of stores to a tab-separated file.

pub mod database;
pub mod error;
pub mod memory;
pub mod sync;
pub mod value;


use std::collections::HashMap;

use async_trait::async_trait;
use pulsemon_common::types::Value;
use serde::Deserialize;

pub use error::{Result, StorageError};
pub use value::MetricValue;

/// Contract shared by every metric store.
///
/// A batch passed to [`Storager::set`] is applied as a unit: readers never
/// observe part of it, and a failure leaves none of it applied.
#[async_trait]
pub trait Storager<T: MetricValue>: Send + Sync {
    /// Store name used in snapshot lines, e.g. `gauge` or `counter`.
    fn name(&self) -> &'static str {
        T::KIND.as_str()
    }

    /// Returns [`StorageError::NotFound`] when the key is absent.
    async fn get(&self, key: &str) -> Result<T>;

    async fn get_all(&self) -> Result<HashMap<String, T>>;

    /// Applies the kind's merge rule to every pair. Empty input is a no-op.
    async fn set(&self, values: &[Value<T>]) -> Result<()>;

    async fn get_string(&self, key: &str) -> Result<String> {
        self.get(key).await?.encode()
    }

    async fn get_all_string(&self) -> Result<HashMap<String, String>> {
        self.get_all()
            .await?
            .into_iter()
            .map(|(k, v)| v.encode().map(|s| (k, s)))
            .collect()
    }

    /// Parses every value first, then delegates to [`Storager::set`].
    async fn set_string(&self, values: &[Value<String>]) -> Result<()> {
        let parsed = values
            .iter()
            .map(|v| T::decode(&v.value).map(|value| Value::new(v.key.clone(), value)))
            .collect::<Result<Vec<_>>>()?;
        self.set(&parsed).await
    }

    /// Backend health check.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Which backend the server stores metrics in.
///
/// # Examples
///
/// ```
/// use pulsemon_storage::StorageType;
///
/// assert_eq!("db".parse::<StorageType>().unwrap(), StorageType::Database);
/// assert!("mysql".parse::<StorageType>().is_err());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum StorageType {
    #[default]
    Memory,
    Database,
}

impl std::str::FromStr for StorageType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StorageType::Memory),
            "db" | "database" => Ok(StorageType::Database),
            other => Err(StorageError::InvalidStorageType(other.to_string())),
        }
    }
}

impl TryFrom<String> for StorageType {
    type Error = StorageError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageType::Memory => f.write_str("memory"),
            StorageType::Database => f.write_str("db"),
        }
    }
}
