// src/http/client.rs
//
// HTTP client construction with pass-through transport options

use reqwest::ClientBuilder;
use std::time::Duration;
use tracing::debug;

use crate::constants::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_POOL_IDLE_TIMEOUT_SECS};
use crate::error::SyncResult;

/// Transport configuration shared by the REST client and the transfer helpers.
///
/// The sync engine enforces no timeouts itself; whatever is set here is
/// handed straight to reqwest.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpClientConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout. `None` leaves requests unbounded.
    pub request_timeout: Option<Duration>,
    /// TCP keepalive settings
    pub tcp_keepalive: Option<Duration>,
    /// Pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections kept per host
    pub max_idle_per_host: usize,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: None,
            tcp_keepalive: Some(Duration::from_secs(60)),
            pool_idle_timeout: Some(Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT_SECS)),
            max_idle_per_host: 32,
            user_agent: format!("pollination-sync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    /// Same configuration with a whole-request timeout.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Build a reqwest client from this configuration.
    pub fn build(&self) -> SyncResult<reqwest::Client> {
        let mut builder = ClientBuilder::new()
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(self.max_idle_per_host)
            .user_agent(self.user_agent.clone())
            .tcp_nodelay(true);

        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(keepalive) = self.tcp_keepalive {
            builder = builder.tcp_keepalive(keepalive);
        }
        if let Some(idle_timeout) = self.pool_idle_timeout {
            builder = builder.pool_idle_timeout(idle_timeout);
        }

        debug!("building HTTP client: {:?}", self);
        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_request_timeout() {
        let config = HttpClientConfig::default();
        assert!(config.request_timeout.is_none());
        assert!(config.build().is_ok());
    }

    #[test]
    fn request_timeout_passes_through() {
        let config = HttpClientConfig::default().with_request_timeout(Some(Duration::from_secs(5)));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
        assert!(config.build().is_ok());
    }
}
