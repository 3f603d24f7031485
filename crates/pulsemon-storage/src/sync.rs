//! Snapshot stores to a flat file and restore them at startup.
//!
//! The file holds one `kind<TAB>key<TAB>value` line per metric. Every flush
//! rewrites it from scratch by truncating, seeking to the start and writing
//! the whole snapshot. That is not crash-atomic: a crash between the
//! truncate and the write leaves an empty or partial file.

use std::collections::{BTreeMap, HashMap};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pulsemon_common::types::Value;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StorageError};
use crate::Storager;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Seconds between flushes. `0` disables the background flush.
    pub interval_secs: i64,
    pub path: PathBuf,
    /// Replay the file into the stores before returning from `start`.
    pub restore: bool,
}

/// A store registered with the sync, tagged by kind.
#[derive(Clone)]
pub enum StoreHandle {
    Gauge(Arc<dyn Storager<f64>>),
    Counter(Arc<dyn Storager<i64>>),
}

impl StoreHandle {
    pub fn name(&self) -> &'static str {
        match self {
            StoreHandle::Gauge(s) => s.name(),
            StoreHandle::Counter(s) => s.name(),
        }
    }

    async fn get_all_string(&self) -> Result<HashMap<String, String>> {
        match self {
            StoreHandle::Gauge(s) => s.get_all_string().await,
            StoreHandle::Counter(s) => s.get_all_string().await,
        }
    }

    async fn set_string(&self, values: &[Value<String>]) -> Result<()> {
        match self {
            StoreHandle::Gauge(s) => s.set_string(values).await,
            StoreHandle::Counter(s) => s.set_string(values).await,
        }
    }
}

struct Inner {
    path: PathBuf,
    file: Mutex<File>,
    stores: Vec<StoreHandle>,
}

/// Handle to a running file sync.
///
/// [`FileSync::close`] stops the background flush without writing a final
/// snapshot; call [`FileSync::flush`] first when the latest state must
/// survive.
pub struct FileSync {
    inner: Arc<Inner>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl FileSync {
    /// Opens (creating if needed) the snapshot file, optionally restores it
    /// into `stores`, and starts the periodic flush.
    ///
    /// A malformed line, or a line naming an unregistered store, fails the
    /// whole start.
    pub async fn start(
        config: SyncConfig,
        cancel: &CancellationToken,
        stores: Vec<StoreHandle>,
    ) -> Result<Self> {
        if stores.is_empty() {
            return Err(StorageError::InvalidConfig("no stores to sync".into()));
        }
        if config.interval_secs < 0 {
            return Err(StorageError::InvalidConfig(format!(
                "negative flush interval: {}",
                config.interval_secs
            )));
        }
        for (i, s) in stores.iter().enumerate() {
            if stores[..i].iter().any(|o| o.name() == s.name()) {
                return Err(StorageError::InvalidConfig(format!(
                    "store '{}' registered twice",
                    s.name()
                )));
            }
        }

        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&config.path)
            .await?;

        let inner = Arc::new(Inner {
            path: config.path.clone(),
            file: Mutex::new(file),
            stores,
        });

        if config.restore {
            inner.restore().await?;
        }

        let cancel = cancel.child_token();
        let task = if config.interval_secs > 0 {
            let period = Duration::from_secs(config.interval_secs as u64);
            Some(tokio::spawn(flush_loop(inner.clone(), period, cancel.clone())))
        } else {
            tracing::info!(path = %config.path.display(), "Periodic snapshot flush disabled");
            None
        };

        Ok(Self {
            inner,
            cancel,
            task,
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Rewrites the snapshot file with the current content of every store.
    pub async fn flush(&self) -> Result<usize> {
        self.inner.flush().await
    }

    /// Stops the periodic flush and releases the file.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Snapshot flush task ended abnormally");
            }
        }
    }
}

impl Drop for FileSync {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn flush_loop(inner: Arc<Inner>, period: Duration, cancel: CancellationToken) {
    let mut tick = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                match inner.flush().await {
                    Ok(n) => tracing::debug!(records = n, "Snapshot flushed"),
                    Err(e) => tracing::error!(error = %e, path = %inner.path.display(), "Snapshot flush failed"),
                }
            }
        }
    }
}

impl Inner {
    async fn restore(&self) -> Result<()> {
        let mut content = String::new();
        {
            let mut file = self.file.lock().await;
            file.seek(SeekFrom::Start(0)).await?;
            file.read_to_string(&mut content).await?;
        }

        let mut groups: HashMap<&str, Vec<Value<String>>> = HashMap::new();
        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (kind, key, value) = parse_line(line).ok_or_else(|| {
                StorageError::MalformedSnapshot {
                    line: idx + 1,
                    content: line.to_string(),
                }
            })?;
            groups
                .entry(kind)
                .or_default()
                .push(Value::new(key, value.to_string()));
        }

        for (kind, values) in groups {
            let store = self
                .stores
                .iter()
                .find(|s| s.name() == kind)
                .ok_or_else(|| StorageError::UnknownStore(kind.to_string()))?;
            store.set_string(&values).await?;
            tracing::info!(store = kind, restored = values.len(), "Restored snapshot");
        }
        Ok(())
    }

    async fn flush(&self) -> Result<usize> {
        let mut records: BTreeMap<(&'static str, String), String> = BTreeMap::new();
        for store in &self.stores {
            for (key, value) in store.get_all_string().await? {
                if key.contains(['\t', '\n', '\r']) {
                    tracing::warn!(store = store.name(), key = %key.escape_debug(), "Skipping key that cannot be written to snapshot");
                    continue;
                }
                records.insert((store.name(), key), value);
            }
        }

        let mut out = String::new();
        for ((kind, key), value) in &records {
            out.push_str(kind);
            out.push('\t');
            out.push_str(key);
            out.push('\t');
            out.push_str(value);
            out.push('\n');
        }

        let mut file = self.file.lock().await;
        file.set_len(0).await?;
        file.seek(SeekFrom::Start(0)).await?;
        file.write_all(out.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(records.len())
    }
}

fn parse_line(line: &str) -> Option<(&str, &str, &str)> {
    let mut parts = line.splitn(3, '\t');
    let kind = parts.next().filter(|k| !k.is_empty())?;
    let key = parts.next().filter(|k| !k.is_empty())?;
    let value = parts.next()?;
    Some((kind, key, value))
}
