//! HTTP transport from the agent to the server.

use std::io::Write;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use pulsemon_common::hash::{HashError, Hasher};
use pulsemon_common::types::Metrics;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};

use crate::config::AgentConfig;

/// Errors raised while delivering a batch.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Client: HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Client: failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Client: failed to compress batch: {0}")]
    Compress(#[from] std::io::Error),

    #[error("Client: failed to sign batch: {0}")]
    Sign(#[from] HashError),

    #[error("Client: server responded {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Client: response signature mismatch")]
    Signature,
}

impl ClientError {
    /// Timeouts and connection failures are worth another attempt; anything
    /// the server actively rejected is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Something that can deliver a metric batch to the server.
#[async_trait]
pub trait Updater: Send + Sync {
    async fn update_metrics(&self, batch: &[Metrics]) -> Result<(), ClientError>;
}

/// Posts gzip-compressed JSON batches to `/updates/`.
pub struct HttpClient {
    client: reqwest::Client,
    updates_url: String,
    hasher: Option<Hasher>,
    hash_header: String,
}

impl HttpClient {
    pub fn new(config: &AgentConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .gzip(true)
            .build()?;
        let hasher = config.hash_key().map(Hasher::new).transpose()?;
        Ok(Self {
            client,
            updates_url: format!("{}/updates/", config.base_url()),
            hasher,
            hash_header: config.hash_header.clone(),
        })
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[async_trait]
impl Updater for HttpClient {
    async fn update_metrics(&self, batch: &[Metrics]) -> Result<(), ClientError> {
        let body = serde_json::to_vec(batch)?;

        let mut request = self
            .client
            .post(&self.updates_url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip");
        // The signature covers the uncompressed body.
        if let Some(hasher) = &self.hasher {
            request = request.header(self.hash_header.as_str(), hasher.hash(&body)?);
        }

        let response = request.body(gzip(&body)?).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let signature = response
            .headers()
            .get(&self.hash_header)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let (Some(hasher), Some(sig)) = (&self.hasher, signature) {
            let reply = response.bytes().await?;
            if !hasher.check(&reply, &sig) {
                tracing::warn!(url = %self.updates_url, "Response signature mismatch");
                return Err(ClientError::Signature);
            }
        }

        tracing::debug!(count = batch.len(), url = %self.updates_url, "Batch delivered");
        Ok(())
    }
}
