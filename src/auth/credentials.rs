//! Credential variants
//!
//! Three interchangeable strategies for producing a bearer token, unified
//! behind a single `acquire_token` capability and dispatched by explicit
//! matching. The manager selects exactly one variant at initialization and
//! never swaps it; the provided-token variant is the only one mutated in
//! place afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::Deserialize;

use crate::constants::token_endpoint;

use super::cache::TokenCache;
use super::device_code::DeviceCodeFlow;
use super::error::AuthError;

const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Opaque bearer credential with its expiry.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        self.expires_on <= Utc::now()
    }
}

/// Side-channel value produced when a device-code handshake begins.
/// Surfaced verbatim to the end user so they can complete sign-in.
#[derive(Debug, Clone)]
pub struct DeviceCodeInfo {
    pub user_code: String,
    pub verification_uri: String,
    pub message: String,
    pub expires_on: DateTime<Utc>,
}

/// Single-slot shared cell linking the device-code handshake to status
/// polling. The flow publishes into it when a handshake begins and must not
/// block; readers may observe a transient mid-handshake state.
#[derive(Debug, Clone, Default)]
pub struct DeviceCodePrompt {
    info: Arc<Mutex<Option<DeviceCodeInfo>>>,
    authenticating: Arc<AtomicBool>,
}

impl DeviceCodePrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a started handshake. Invoked from inside token acquisition;
    /// returns immediately, polling continues in the caller.
    pub fn publish(&self, info: DeviceCodeInfo) {
        info!(
            "Device code authentication required: {} at {}",
            info.user_code, info.verification_uri
        );
        *self.info.lock().unwrap() = Some(info);
        self.authenticating.store(true, Ordering::SeqCst);
    }

    /// Successful authentication: drop the prompt entirely.
    pub fn clear(&self) {
        *self.info.lock().unwrap() = None;
        self.authenticating.store(false, Ordering::SeqCst);
    }

    /// Failed validation: the handshake flag comes down but the prompt stays
    /// visible, since the user may still be mid-sign-in.
    pub fn settle(&self) {
        self.authenticating.store(false, Ordering::SeqCst);
    }

    pub fn info(&self) -> Option<DeviceCodeInfo> {
        self.info.lock().unwrap().clone()
    }

    pub fn is_authenticating(&self) -> bool {
        self.authenticating.load(Ordering::SeqCst)
    }
}

/// The one capability all variants share.
#[derive(Debug)]
pub enum Credential {
    Confidential(ConfidentialCredential),
    Provided(ProvidedTokenCredential),
    Interactive(InteractiveCredential),
}

impl Credential {
    pub async fn acquire_token(&self, scopes: &[String]) -> Result<AccessToken, AuthError> {
        match self {
            Credential::Confidential(c) => c.acquire_token(scopes).await,
            Credential::Provided(c) => c.acquire_token(),
            Credential::Interactive(c) => c.acquire_token(scopes).await,
        }
    }

    pub fn as_provided(&self) -> Option<&ProvidedTokenCredential> {
        match self {
            Credential::Provided(c) => Some(c),
            _ => None,
        }
    }
}

/// Application-only identity: tenant + client id + client secret, exchanged
/// for tokens via the client-credentials grant. No local mutable state.
#[derive(Debug)]
pub struct ConfidentialCredential {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl ConfidentialCredential {
    pub fn new(tenant_id: String, client_id: String, client_secret: String) -> Self {
        Self {
            tenant_id,
            client_id,
            client_secret,
            http: reqwest::Client::new(),
        }
    }

    pub async fn acquire_token(&self, scopes: &[String]) -> Result<AccessToken, AuthError> {
        debug!(
            "Requesting app-only token for client {} in tenant {}",
            self.client_id, self.tenant_id
        );

        let response = self
            .http
            .post(token_endpoint(&self.tenant_id))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("scope", &scopes.join(" ")),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::AuthenticationFailed(format!(
                "Token request failed ({}): {}",
                status, body
            )));
        }

        let token: TokenEndpointResponse = response.json().await?;
        let expires_in = token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        Ok(AccessToken {
            token: token.access_token,
            expires_on: Utc::now() + Duration::seconds(expires_in),
        })
    }
}

#[derive(Debug)]
struct ProvidedState {
    token: Option<String>,
    expires_on: DateTime<Utc>,
}

/// Externally supplied, rotatable token. Starting without a token forces the
/// expiry to the epoch so the variant reports itself as always expired until
/// an update arrives.
#[derive(Debug)]
pub struct ProvidedTokenCredential {
    state: RwLock<ProvidedState>,
}

impl ProvidedTokenCredential {
    pub fn new(token: Option<String>, expires_on: Option<DateTime<Utc>>) -> Self {
        let state = match token {
            Some(token) => ProvidedState {
                token: Some(token),
                expires_on: expires_on
                    .unwrap_or_else(|| Utc::now() + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS)),
            },
            None => ProvidedState {
                token: None,
                expires_on: DateTime::UNIX_EPOCH,
            },
        };
        Self {
            state: RwLock::new(state),
        }
    }

    pub fn acquire_token(&self) -> Result<AccessToken, AuthError> {
        let state = self.state.read().unwrap();
        match &state.token {
            Some(token) if state.expires_on > Utc::now() => Ok(AccessToken {
                token: token.clone(),
                expires_on: state.expires_on,
            }),
            _ => Err(AuthError::AuthenticationFailed(
                "Access token is not available or has expired".to_string(),
            )),
        }
    }

    pub fn update_token(&self, token: String, expires_on: Option<DateTime<Utc>>) {
        let mut state = self.state.write().unwrap();
        state.token = Some(token);
        state.expires_on = expires_on
            .unwrap_or_else(|| Utc::now() + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));
        info!("Access token updated");
    }

    pub fn is_expired(&self) -> bool {
        self.state.read().unwrap().expires_on <= Utc::now()
    }

    pub fn expiration_time(&self) -> DateTime<Utc> {
        self.state.read().unwrap().expires_on
    }

    pub fn current_token(&self) -> Option<String> {
        self.state.read().unwrap().token.clone()
    }
}

/// User sign-in via the device authorization grant. The browser-assisted
/// constructor additionally opens the verification page; construction fails
/// in headless environments so the manager can fall back to the plain
/// device-code form.
#[derive(Debug)]
pub struct InteractiveCredential {
    flow: DeviceCodeFlow,
    prompt: DeviceCodePrompt,
    cache: Option<TokenCache>,
    open_browser: bool,
}

impl InteractiveCredential {
    /// Browser-assisted sign-in. Fails when no usable display is detected.
    pub fn browser(
        tenant_id: String,
        client_id: String,
        redirect_uri: String,
        prompt: DeviceCodePrompt,
        cache: Option<TokenCache>,
    ) -> Result<Self, AuthError> {
        Self::browser_with_probe(
            tenant_id,
            client_id,
            redirect_uri,
            prompt,
            cache,
            browser_available(),
        )
    }

    fn browser_with_probe(
        tenant_id: String,
        client_id: String,
        redirect_uri: String,
        prompt: DeviceCodePrompt,
        cache: Option<TokenCache>,
        available: bool,
    ) -> Result<Self, AuthError> {
        if !available {
            return Err(AuthError::AuthenticationFailed(
                "Browser-based sign-in is not available in this environment".to_string(),
            ));
        }
        debug!("Browser sign-in enabled, redirect URI {}", redirect_uri);
        Ok(Self {
            flow: DeviceCodeFlow::new(tenant_id, client_id),
            prompt,
            cache,
            open_browser: true,
        })
    }

    /// Device-code sign-in for headless sessions.
    pub fn device_code(
        tenant_id: String,
        client_id: String,
        prompt: DeviceCodePrompt,
        cache: Option<TokenCache>,
    ) -> Self {
        Self {
            flow: DeviceCodeFlow::new(tenant_id, client_id),
            prompt,
            cache,
            open_browser: false,
        }
    }

    pub async fn acquire_token(&self, scopes: &[String]) -> Result<AccessToken, AuthError> {
        // A second caller during an in-flight handshake gets the pending
        // prompt instead of starting a competing device-code session.
        if self.prompt.is_authenticating() {
            if let Some(info) = self.prompt.info() {
                return Err(AuthError::PendingUserAction(info));
            }
        }

        if let Some(cache) = &self.cache {
            if let Some(token) = cache.load() {
                debug!("Using cached token, expires {}", token.expires_on);
                return Ok(token);
            }
        }

        let session = self.flow.start(scopes).await?;

        // The prompt callback must not block: it records the handshake for
        // status polling and returns while we keep polling the endpoint.
        self.prompt.publish(session.info.clone());
        if self.open_browser {
            if let Err(err) = webbrowser::open(&session.info.verification_uri) {
                warn!("Failed to open browser for sign-in: {}", err);
            }
        }

        let token = self.flow.poll(&session).await?;
        if let Some(cache) = &self.cache {
            cache.store(&token);
        }
        Ok(token)
    }
}

/// Best-effort probe for a browser-capable session, in the spirit of the
/// usual WSL/SSH/container checks. Remote and headless sessions get the
/// device-code prompt instead.
fn browser_available() -> bool {
    if std::env::var_os("SSH_CONNECTION").is_some() || std::env::var_os("SSH_TTY").is_some() {
        return false;
    }
    if cfg!(target_os = "linux") {
        return std::env::var_os("DISPLAY").is_some()
            || std::env::var_os("WAYLAND_DISPLAY").is_some();
    }
    true
}
