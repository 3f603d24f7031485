use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use pulsemon_common::types::Value;

use crate::error::{Result, StorageError};
use crate::value::MetricValue;
use crate::Storager;

/// In-process store guarded by one reader/writer lock.
///
/// A batch takes the write lock once, so it never interleaves with another
/// batch or with a reader. The lock is never held across an await point.
#[derive(Debug)]
pub struct MemoryStore<T> {
    values: RwLock<HashMap<String, T>>,
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: MetricValue> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, T>> {
        self.values.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, T>> {
        self.values.write().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl<T: MetricValue> Storager<T> for MemoryStore<T> {
    async fn get(&self, key: &str) -> Result<T> {
        self.read()
            .get(key)
            .copied()
            .ok_or_else(|| StorageError::NotFound {
                kind: T::KIND,
                key: key.to_string(),
            })
    }

    async fn get_all(&self) -> Result<HashMap<String, T>> {
        Ok(self.read().clone())
    }

    async fn set(&self, values: &[Value<T>]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut map = self.write();
        for v in values {
            let merged = T::merge(map.get(&v.key).copied(), v.value);
            map.insert(v.key.clone(), merged);
        }
        Ok(())
    }
}
