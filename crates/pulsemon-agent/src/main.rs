use anyhow::Result;
use pulsemon_agent::client::HttpClient;
use pulsemon_agent::config::AgentConfig;
use pulsemon_agent::reporter::{Reporter, Timer};
use pulsemon_agent::worker_pool::WorkerPool;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pulsemon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = AgentConfig::load(&config_path)?;
    tracing::info!(server = %config.base_url(), "pulsemon-agent starting");

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        signal::ctrl_c().await.ok();
        tracing::info!("Shutting down gracefully");
        stopper.cancel();
    });

    let client = Arc::new(HttpClient::new(&config)?);
    let timer = Timer {
        poll_interval: config.poll_interval(),
        report_interval: config.report_interval(),
    };
    let reporter = Reporter::new(client, timer)
        .reset_counters_on_delivery(config.reset_counters_on_delivery);
    let mut pool = WorkerPool::new(config.rate_limit, &cancel);

    reporter.run(&mut pool, &cancel).await;
    pool.shutdown().await;

    tracing::info!("pulsemon-agent stopped");
    Ok(())
}
