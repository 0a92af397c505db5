//! External identity provider behind a narrow trait.
//!
//! The server only ever needs four calls: start a device-code grant, poll
//! it, resolve the username, and check the star. Everything else about the
//! provider stays outside the system boundary.

use super::errors::{AuthError, AuthResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const DEVICE_CODE_URL: &str = "https://github.com/login/device/code";
const ACCESS_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const API_VERSION: &str = "2022-11-28";
const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// A started device-code grant.
#[derive(Clone, Debug)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    /// Seconds until the codes expire.
    pub expires_in: u64,
    /// Minimum seconds between polls.
    pub interval: u64,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn request_device_code(&self) -> AuthResult<DeviceAuthorization>;
    /// `Ok(None)` while the user has not finished authorizing.
    async fn poll_token(&self, device_code: &str) -> AuthResult<Option<String>>;
    async fn fetch_username(&self, token: &str) -> AuthResult<String>;
    async fn check_starred(&self, token: &str) -> AuthResult<bool>;
}

/// GitHub's device flow.
pub struct GithubProvider {
    client: reqwest::Client,
    client_id: String,
    /// `owner/repo` whose star earns the one-time bonus; `None` disables
    /// the check.
    starred_repo: Option<String>,
}

impl GithubProvider {
    pub fn new(client_id: impl Into<String>, starred_repo: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent("blackjack-server")
            .build()
            .expect("reqwest client builds");
        Self {
            client,
            client_id: client_id.into(),
            starred_repo,
        }
    }
}

#[derive(Deserialize)]
struct GhDeviceResponse {
    user_code: String,
    device_code: String,
    verification_uri: String,
    expires_in: u64,
    interval: u64,
}

#[derive(Deserialize)]
struct GhTokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    error: String,
}

#[derive(Deserialize)]
struct GhUserResponse {
    login: String,
}

#[async_trait]
impl IdentityProvider for GithubProvider {
    async fn request_device_code(&self) -> AuthResult<DeviceAuthorization> {
        let body = serde_json::json!({ "client_id": self.client_id });
        let resp: GhDeviceResponse = self
            .client
            .post(DEVICE_CODE_URL)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        log::info!("device flow started, verify at {}", resp.verification_uri);

        Ok(DeviceAuthorization {
            device_code: resp.device_code,
            user_code: resp.user_code,
            verification_uri: resp.verification_uri,
            expires_in: resp.expires_in,
            interval: resp.interval,
        })
    }

    async fn poll_token(&self, device_code: &str) -> AuthResult<Option<String>> {
        let body = serde_json::json!({
            "client_id": self.client_id,
            "device_code": device_code,
            "grant_type": "urn:ietf:params:oauth:grant-type:device_code",
        });
        let resp: GhTokenResponse = self
            .client
            .post(ACCESS_TOKEN_URL)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if resp.error.is_empty() && !resp.access_token.is_empty() {
            Ok(Some(resp.access_token))
        } else {
            log::debug!("device flow pending: {}", resp.error);
            Ok(None)
        }
    }

    async fn fetch_username(&self, token: &str) -> AuthResult<String> {
        let resp = self
            .client
            .get(USER_URL)
            .header("Accept", "application/json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .bearer_auth(token)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(AuthError::Provider(format!(
                "user lookup failed with status {}",
                resp.status()
            )));
        }
        let user: GhUserResponse = resp.json().await?;
        Ok(user.login)
    }

    async fn check_starred(&self, token: &str) -> AuthResult<bool> {
        let Some(repo) = &self.starred_repo else {
            return Ok(false);
        };
        let url = format!("{USER_URL}/starred/{repo}");
        let resp = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .bearer_auth(token)
            .send()
            .await?;
        // 204 means starred; 404 means not starred.
        Ok(resp.status().as_u16() == 204)
    }
}
