// src/config.rs
//
// Explicit client configuration. Built once per invocation from the
// environment (after `.env` has been loaded) and CLI overrides, then passed
// by value into client construction.

use std::fmt;
use std::time::Duration;
use tracing::warn;

use crate::constants::{
    DEFAULT_ENDPOINT, ENV_ACCESS_TOKEN, ENV_API_KEY_ID, ENV_API_KEY_SECRET, ENV_ENDPOINT,
    ENV_TIMEOUT_SECS,
};
use crate::http::HttpClientConfig;

/// API key pair exchanged for an access token at login.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    pub id: String,
    pub secret: String,
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey").field("id", &self.id).field("secret", &"<redacted>").finish()
    }
}

#[derive(Clone, PartialEq)]
pub struct Config {
    pub endpoint: String,
    pub api_key: Option<ApiKey>,
    pub access_token: Option<String>,
    pub http: HttpClientConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("http", &self.http)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            access_token: None,
            http: HttpClientConfig::default(),
        }
    }
}

impl Config {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(endpoint) = get(ENV_ENDPOINT) {
            config.endpoint = endpoint;
        }
        if let (Some(id), Some(secret)) = (get(ENV_API_KEY_ID), get(ENV_API_KEY_SECRET)) {
            config.api_key = Some(ApiKey { id, secret });
        }
        config.access_token = get(ENV_ACCESS_TOKEN);

        if let Some(raw) = get(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => {
                    config.http = config.http.with_request_timeout(Some(Duration::from_secs(secs)))
                }
                Err(_) => warn!("ignoring invalid {}={:?}", ENV_TIMEOUT_SECS, raw),
            }
        }
        config
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_api_key(mut self, id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.api_key = Some(ApiKey { id: id.into(), secret: secret.into() });
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.http = self.http.with_request_timeout(timeout);
        self
    }

    /// Absolute URL for an API path such as `/projects/owner`.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// `Authorization` header value, if a token is available.
    pub fn auth_header(&self) -> Option<String> {
        self.access_token.as_ref().map(|t| format!("Bearer {t}"))
    }
}
