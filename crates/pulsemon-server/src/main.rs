use anyhow::Result;
use pulsemon_server::app;
use pulsemon_server::config::ServerConfig;
use pulsemon_server::state::AppState;
use pulsemon_storage::sync::FileSync;
use std::net::SocketAddr;
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
        .unwrap_or_else(|| "config/server.toml".to_string());
    let config = ServerConfig::load(&config_path)?;
    tracing::info!(
        address = %config.address,
        storage = %config.storage_type,
        "pulsemon-server starting"
    );

    let cancel = CancellationToken::new();
    let state = AppState::from_config(config.clone()).await?;

    // Restore happens here, before the listener accepts traffic.
    let sync = if config.sync.enabled {
        let sync_config = config.sync_config();
        if config.sync.restore && !sync_config.restore {
            tracing::warn!("Snapshot restore skipped: the database already holds the metrics");
        }
        let sync = FileSync::start(sync_config, &cancel, state.store_handles()).await?;
        tracing::info!(
            path = %sync.path().display(),
            interval_secs = config.sync.store_interval_secs,
            "Snapshot sync started"
        );
        Some(sync)
    } else {
        tracing::info!("Snapshot sync disabled");
        None
    };

    let addr: SocketAddr = config.address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let http_app = app::build_http_app(state);

    let stopper = cancel.clone();
    tokio::spawn(async move {
        signal::ctrl_c().await.ok();
        tracing::info!("Shutting down gracefully");
        stopper.cancel();
    });

    tracing::info!(http = %addr, "Server started");
    let result = axum::serve(listener, http_app)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "HTTP server error");
    }
    cancel.cancel();

    if let Some(sync) = sync {
        if config.sync.flush_on_shutdown {
            match sync.flush().await {
                Ok(n) => tracing::info!(records = n, "Final snapshot written"),
                Err(e) => tracing::error!(error = %e, "Final snapshot failed"),
            }
        }
        sync.close().await;
    }

    tracing::info!("Server stopped");
    result.map_err(Into::into)
}
