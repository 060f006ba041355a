// src/auth.rs
//
// API-key login. Token refresh is a step from one `Config` to the next; no
// credential state is shared or written to disk.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{SyncError, SyncResult};

#[derive(Serialize)]
struct LoginRequest<'a> {
    id: &'a str,
    secret: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
}

/// Fold a login response into a configuration.
pub fn apply_login(config: Config, response: LoginResponse) -> Config {
    config.with_access_token(response.access_token)
}

/// Exchange the configured API key for an access token.
pub async fn login(client: &reqwest::Client, config: &Config) -> SyncResult<Config> {
    let key = config
        .api_key
        .as_ref()
        .ok_or_else(|| SyncError::Auth("no API key configured".to_string()))?;

    debug!("logging in to {} as key {}", config.endpoint, key.id);
    let response = client
        .post(config.api_url("/user/login"))
        .json(&LoginRequest { id: &key.id, secret: &key.secret })
        .send()
        .await?;

    match response.status() {
        s if s.is_success() => {
            let body: LoginResponse = response
                .json()
                .await
                .map_err(|e| SyncError::Decode(format!("login response: {e}")))?;
            info!("logged in to {}", config.endpoint);
            Ok(apply_login(config.clone(), body))
        }
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
            Err(SyncError::Auth("failed to log in".to_string()))
        }
        s => {
            let message = response.text().await.unwrap_or_default();
            Err(SyncError::Store { status: s.as_u16(), message })
        }
    }
}

/// Return a configuration that carries an access token, logging in only when
/// none is present.
pub async fn refresh(client: &reqwest::Client, config: Config) -> SyncResult<Config> {
    if config.access_token.is_some() {
        return Ok(config);
    }
    if config.api_key.is_none() {
        return Err(SyncError::Auth(
            "no access token or API key configured; set QB_POLLINATION_TOKEN or an API key".to_string(),
        ));
    }
    login(client, &config).await
}
