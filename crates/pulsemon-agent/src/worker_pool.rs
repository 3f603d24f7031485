//! Fixed-size executor bounding how many reports are in flight.
//!
//! Workers share one bounded task queue. Each finished task pushes exactly
//! one result, in completion order. [`WorkerPool::submit`] waits when the
//! queue is full, which stalls the caller instead of piling up work.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub type Task = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("worker pool is shut down")]
    Closed,
}

pub struct WorkerPool {
    tasks: Option<mpsc::Sender<Task>>,
    results: mpsc::Receiver<anyhow::Result<()>>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Spawns `max(size, 1)` workers that stop when `cancel` fires.
    pub fn new(size: usize, cancel: &CancellationToken) -> Self {
        let size = size.max(1);
        let (task_tx, task_rx) = mpsc::channel::<Task>(size);
        let (result_tx, result_rx) = mpsc::channel(size);
        let task_rx = Arc::new(Mutex::new(task_rx));

        let workers = (0..size)
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    task_rx.clone(),
                    result_tx.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        Self {
            tasks: Some(task_tx),
            results: result_rx,
            workers,
            cancel: cancel.clone(),
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues a task, waiting while the queue is full.
    pub async fn submit(&self, task: Task) -> Result<(), PoolError> {
        let tasks = self.tasks.as_ref().ok_or(PoolError::Closed)?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PoolError::Closed),
            sent = tasks.send(task) => sent.map_err(|_| PoolError::Closed),
        }
    }

    /// Next finished task's outcome. `None` once every worker has exited.
    pub async fn next_result(&mut self) -> Option<anyhow::Result<()>> {
        self.results.recv().await
    }

    /// Stops accepting tasks and waits for the workers to exit. Tasks still
    /// queued run to completion unless the pool was cancelled.
    pub async fn shutdown(mut self) {
        self.tasks.take();
        self.results.close();
        // Drain results pushed before close so no worker stays blocked.
        while self.results.try_recv().is_ok() {}
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Worker ended abnormally");
            }
        }
    }
}

async fn worker(
    id: usize,
    tasks: Arc<Mutex<mpsc::Receiver<Task>>>,
    results: mpsc::Sender<anyhow::Result<()>>,
    cancel: CancellationToken,
) {
    loop {
        let task = tokio::select! {
            _ = cancel.cancelled() => break,
            task = async { tasks.lock().await.recv().await } => task,
        };
        let Some(task) = task else {
            break;
        };

        tracing::debug!(worker = id, "Task started");
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(worker = id, "Task abandoned on cancellation");
                break;
            }
            outcome = task => outcome,
        };
        tracing::debug!(worker = id, ok = outcome.is_ok(), "Task finished");

        // The receiver is gone during shutdown; that is not an error.
        if results.send(outcome).await.is_err() {
            break;
        }
    }
    tracing::debug!(worker = id, "Worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn zero_size_still_has_one_worker() {
        let pool = WorkerPool::new(0, &CancellationToken::new());
        assert_eq!(pool.size(), 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn one_result_per_task() {
        let mut pool = WorkerPool::new(3, &CancellationToken::new());
        for i in 0..3 {
            pool.submit(Box::pin(async move {
                if i == 1 {
                    anyhow::bail!("task {i} failed");
                }
                Ok::<_, anyhow::Error>(())
            }))
            .await
            .unwrap();
        }

        let mut ok = 0;
        let mut failed = 0;
        for _ in 0..3 {
            match pool.next_result().await.unwrap() {
                Ok(()) => ok += 1,
                Err(_) => failed += 1,
            }
        }
        assert_eq!((ok, failed), (2, 1));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_size() {
        let mut pool = WorkerPool::new(2, &CancellationToken::new());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let running = running.clone();
            let peak = peak.clone();
            pool.submit(Box::pin(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            }))
            .await
            .unwrap();
        }
        for _ in 0..6 {
            pool.next_result().await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn cancelled_pool_rejects_submissions_and_exits() {
        let cancel = CancellationToken::new();
        let mut pool = WorkerPool::new(2, &cancel);
        cancel.cancel();

        let err = pool.submit(Box::pin(async { Ok::<_, anyhow::Error>(()) })).await.unwrap_err();
        assert!(matches!(err, PoolError::Closed));
        assert!(pool.next_result().await.is_none());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_with_unread_results_does_not_hang() {
        let pool = WorkerPool::new(1, &CancellationToken::new());
        for _ in 0..2 {
            pool.submit(Box::pin(async { Ok::<_, anyhow::Error>(()) })).await.unwrap();
        }
        tokio::time::timeout(Duration::from_secs(5), pool.shutdown())
            .await
            .unwrap();
    }
}
