//! OAuth 2.0 device authorization grant
//!
//! Starts a handshake at the device authorization endpoint, then polls the
//! token endpoint until the user completes sign-in in their browser. The
//! endpoint's pacing instructions (`interval`, `slow_down`) are honored.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::time::{Duration, sleep};

use crate::constants::{device_code_endpoint, token_endpoint};

use super::credentials::{AccessToken, DeviceCodeInfo};
use super::error::AuthError;

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

#[derive(Debug)]
pub struct DeviceCodeFlow {
    tenant_id: String,
    client_id: String,
    http: reqwest::Client,
}

/// An in-flight handshake: the opaque device code we poll with, plus the
/// user-facing prompt.
#[derive(Debug)]
pub struct DeviceCodeSession {
    device_code: String,
    interval_secs: u64,
    pub info: DeviceCodeInfo,
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: i64,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenPollResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl DeviceCodeFlow {
    pub fn new(tenant_id: String, client_id: String) -> Self {
        Self {
            tenant_id,
            client_id,
            http: reqwest::Client::new(),
        }
    }

    /// Request a user code and verification URI from the authority.
    pub async fn start(&self, scopes: &[String]) -> Result<DeviceCodeSession, AuthError> {
        debug!("Starting device code flow for tenant {}", self.tenant_id);

        let response = self
            .http
            .post(device_code_endpoint(&self.tenant_id))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("scope", &scopes.join(" ")),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::AuthenticationFailed(format!(
                "Device code request failed ({}): {}",
                status, body
            )));
        }

        let body: DeviceCodeResponse = response.json().await?;
        let expires_on = Utc::now() + ChronoDuration::seconds(body.expires_in);
        let message = body.message.unwrap_or_else(|| {
            format!(
                "To sign in, use a web browser to open the page {} and enter the code {} to authenticate.",
                body.verification_uri, body.user_code
            )
        });

        Ok(DeviceCodeSession {
            device_code: body.device_code,
            interval_secs: body.interval.unwrap_or(5),
            info: DeviceCodeInfo {
                user_code: body.user_code,
                verification_uri: body.verification_uri,
                message,
                expires_on,
            },
        })
    }

    /// Poll the token endpoint until the user completes or abandons sign-in.
    pub async fn poll(&self, session: &DeviceCodeSession) -> Result<AccessToken, AuthError> {
        let mut interval = session.interval_secs;

        loop {
            if Utc::now() >= session.info.expires_on {
                return Err(AuthError::AuthenticationFailed(
                    "Device code expired before sign-in completed".to_string(),
                ));
            }
            sleep(Duration::from_secs(interval)).await;

            let response = self
                .http
                .post(token_endpoint(&self.tenant_id))
                .form(&[
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("client_id", &self.client_id),
                    ("device_code", &session.device_code),
                ])
                .send()
                .await?;

            let body: TokenPollResponse = response.json().await?;

            if let Some(access_token) = body.access_token {
                info!("Device code sign-in completed");
                let expires_in = body.expires_in.unwrap_or(3600);
                return Ok(AccessToken {
                    token: access_token,
                    expires_on: expires_on_from(expires_in),
                });
            }

            match body.error.as_deref() {
                Some("authorization_pending") => continue,
                Some("slow_down") => {
                    interval += 5;
                    warn!("Authority asked us to slow down, polling every {}s", interval);
                }
                Some("expired_token") => {
                    return Err(AuthError::AuthenticationFailed(
                        "Device code expired before sign-in completed".to_string(),
                    ));
                }
                Some("authorization_declined") => {
                    return Err(AuthError::AuthenticationFailed(
                        "Sign-in was declined by the user".to_string(),
                    ));
                }
                other => {
                    let detail = body
                        .error_description
                        .or_else(|| other.map(str::to_string))
                        .unwrap_or_else(|| "unknown error".to_string());
                    return Err(AuthError::AuthenticationFailed(format!(
                        "Device code sign-in failed: {}",
                        detail
                    )));
                }
            }
        }
    }
}

fn expires_on_from(expires_in: i64) -> DateTime<Utc> {
    Utc::now() + ChronoDuration::seconds(expires_in)
}
