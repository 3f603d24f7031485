//! Poll and report loops of the agent.
//!
//! The poll loop merges collector output into two local stores. The report
//! loop drains those stores into one batch per tick and hands the delivery,
//! wrapped in the retry ladder, to the [`WorkerPool`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pulsemon_collector::Collector;
use pulsemon_common::retry::{retry, DEFAULT_DELAYS};
use pulsemon_common::types::{Metrics, Value};
use pulsemon_storage::memory::MemoryStore;
use pulsemon_storage::{MetricValue, Storager};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, Updater};
use crate::worker_pool::{Task, WorkerPool};

type Sources<T> = Arc<Mutex<Vec<Box<dyn Collector<Value = T>>>>>;

#[derive(Debug, Clone, Copy)]
pub struct Timer {
    pub poll_interval: Duration,
    pub report_interval: Duration,
}

pub struct Reporter {
    counters: MemoryStore<i64>,
    gauges: MemoryStore<f64>,
    counter_sources: Sources<i64>,
    gauge_sources: Sources<f64>,
    client: Arc<dyn Updater>,
    timer: Timer,
    retry_delays: Vec<Duration>,
    reset_counters: bool,
}

impl Reporter {
    pub fn new(client: Arc<dyn Updater>, timer: Timer) -> Self {
        Self {
            counters: MemoryStore::new(),
            gauges: MemoryStore::new(),
            counter_sources: Arc::new(Mutex::new(pulsemon_collector::default_counters())),
            gauge_sources: Arc::new(Mutex::new(pulsemon_collector::default_gauges())),
            client,
            timer,
            retry_delays: DEFAULT_DELAYS.to_vec(),
            reset_counters: false,
        }
    }

    pub fn with_collectors(
        mut self,
        counters: Vec<Box<dyn Collector<Value = i64>>>,
        gauges: Vec<Box<dyn Collector<Value = f64>>>,
    ) -> Self {
        self.counter_sources = Arc::new(Mutex::new(counters));
        self.gauge_sources = Arc::new(Mutex::new(gauges));
        self
    }

    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// After a confirmed delivery, subtract the delivered counter amounts
    /// from the local store. Off by default: totals are resent every tick.
    pub fn reset_counters_on_delivery(mut self, reset: bool) -> Self {
        self.reset_counters = reset;
        self
    }

    pub fn counters(&self) -> &MemoryStore<i64> {
        &self.counters
    }

    pub fn gauges(&self) -> &MemoryStore<f64> {
        &self.gauges
    }

    /// Runs both loops until `cancel` fires. The pool is left for the caller
    /// to shut down.
    pub async fn run(&self, pool: &mut WorkerPool, cancel: &CancellationToken) {
        tracing::info!(
            poll_secs = self.timer.poll_interval.as_secs_f64(),
            report_secs = self.timer.report_interval.as_secs_f64(),
            workers = pool.size(),
            "Reporter started"
        );
        tokio::join!(self.poll_loop(cancel), self.report_loop(pool, cancel));
        tracing::info!("Reporter stopped");
    }

    async fn poll_loop(&self, cancel: &CancellationToken) {
        let mut tick = ticker(Instant::now(), self.timer.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tick.tick() => self.poll_once().await,
            }
        }
    }

    async fn report_loop(&self, pool: &mut WorkerPool, cancel: &CancellationToken) {
        let start = Instant::now() + self.timer.report_interval;
        let mut tick = ticker(start, self.timer.report_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tick.tick() => self.report_once(pool, cancel).await,
            }
        }
    }

    /// Refreshes counter and gauge sources in parallel. Collectors block,
    /// so each group runs on the blocking pool.
    pub async fn poll_once(&self) {
        tokio::join!(
            poll_into(self.counter_sources.clone(), &self.counters),
            poll_into(self.gauge_sources.clone(), &self.gauges),
        );
    }

    /// Drains current values into one batch and waits for its delivery.
    pub async fn report_once(&self, pool: &mut WorkerPool, cancel: &CancellationToken) {
        let (counters, gauges) = match tokio::try_join!(self.counters.get_all(), self.gauges.get_all()) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read local stores");
                return;
            }
        };

        let batch: Vec<Metrics> = counters
            .iter()
            .map(|(k, v)| Metrics::from(v.into_record(k.clone())))
            .chain(gauges.iter().map(|(k, v)| Metrics::from(v.into_record(k.clone()))))
            .collect();
        if batch.is_empty() {
            tracing::debug!("Nothing to report");
            return;
        }

        let count = batch.len();
        let client = self.client.clone();
        let delays = self.retry_delays.clone();
        let task: Task = Box::pin(async move {
            retry(
                || client.update_metrics(&batch),
                ClientError::is_retryable,
                &delays,
            )
            .await?;
            Ok::<_, anyhow::Error>(())
        });

        if let Err(e) = pool.submit(task).await {
            tracing::warn!(error = %e, "Report dropped");
            return;
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return,
            outcome = pool.next_result() => outcome,
        };
        match outcome {
            Some(Ok(())) => {
                tracing::info!(count, "Metrics reported");
                if self.reset_counters {
                    self.subtract_delivered(counters.into_iter()).await;
                }
            }
            Some(Err(e)) => tracing::warn!(error = %e, count, "Metrics report failed"),
            None => tracing::warn!("Worker pool closed before reporting a result"),
        }
    }

    async fn subtract_delivered(&self, delivered: impl Iterator<Item = (String, i64)>) {
        let negated: Vec<Value<i64>> = delivered
            .map(|(k, v)| Value::new(k, v.wrapping_neg()))
            .collect();
        if let Err(e) = self.counters.set(&negated).await {
            tracing::error!(error = %e, "Failed to reset delivered counters");
        }
    }
}

/// A slow report or poll skips the ticks it overran instead of firing them
/// back to back.
fn ticker(start: Instant, period: Duration) -> Interval {
    let mut tick = tokio::time::interval_at(start, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tick
}

async fn poll_into<T: MetricValue>(sources: Sources<T>, store: &MemoryStore<T>) {
    let collected = tokio::task::spawn_blocking(move || {
        let mut sources = sources.lock().unwrap_or_else(|p| p.into_inner());
        let mut values = Vec::new();
        for source in sources.iter_mut() {
            match source.collect() {
                Ok(points) => values.extend(points),
                Err(e) => tracing::warn!(collector = source.name(), error = %e, "Collection failed"),
            }
        }
        values
    })
    .await;
    let values = match collected {
        Ok(values) => values,
        Err(e) => {
            tracing::error!(kind = %T::KIND, error = %e, "Collector task failed");
            return;
        }
    };
    tracing::debug!(kind = %T::KIND, count = values.len(), "Polled");
    if let Err(e) = store.set(&values).await {
        tracing::warn!(kind = %T::KIND, error = %e, "Failed to store polled metrics");
    }
}
