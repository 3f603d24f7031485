use pulsemon_common::hash::DEFAULT_HASH_HEADER;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_server_address")]
    pub server_address: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Maximum number of reports in flight at once.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Shared key for signing request bodies. Unset disables signing.
    pub hash_key: Option<String>,
    #[serde(default = "default_hash_header")]
    pub hash_header: String,
    /// Subtract delivered counter amounts after a successful report instead
    /// of resending the running total.
    #[serde(default)]
    pub reset_counters_on_delivery: bool,
}

fn default_server_address() -> String {
    "localhost:8080".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_rate_limit() -> usize {
    1
}

fn default_request_timeout() -> u64 {
    5
}

fn default_hash_header() -> String {
    DEFAULT_HASH_HEADER.to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            poll_interval_secs: default_poll_interval(),
            report_interval_secs: default_report_interval(),
            rate_limit: default_rate_limit(),
            request_timeout_secs: default_request_timeout(),
            hash_key: None,
            hash_header: default_hash_header(),
            reset_counters_on_delivery: false,
        }
    }
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than 0");
        }
        if self.report_interval_secs == 0 {
            anyhow::bail!("report_interval_secs must be greater than 0");
        }
        Ok(())
    }

    /// Base URL of the server, with `http://` added when no scheme is given.
    pub fn base_url(&self) -> String {
        let addr = self.server_address.trim().trim_end_matches('/');
        if addr.contains("://") {
            return addr.to_string();
        }
        format!("http://{addr}")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The signing key, ignoring an empty string.
    pub fn hash_key(&self) -> Option<&str> {
        self.hash_key.as_deref().filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: AgentConfig = toml::from_str("").unwrap();
        assert_eq!(config.server_address, "localhost:8080");
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.report_interval_secs, 10);
        assert_eq!(config.rate_limit, 1);
        assert_eq!(config.hash_header, "HashSHA256");
        assert!(!config.reset_counters_on_delivery);
        assert!(config.hash_key().is_none());
    }

    #[test]
    fn base_url_adds_scheme_once() {
        let mut config = AgentConfig::default();
        assert_eq!(config.base_url(), "http://localhost:8080");
        config.server_address = "https://metrics.example.com/".into();
        assert_eq!(config.base_url(), "https://metrics.example.com");
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config: AgentConfig = toml::from_str("poll_interval_secs = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_hash_key_disables_signing() {
        let config: AgentConfig = toml::from_str("hash_key = \"\"").unwrap();
        assert!(config.hash_key().is_none());
    }
}
