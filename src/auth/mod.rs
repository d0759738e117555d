//! Authentication core
//!
//! Environment variables select one of three modes, each backed by exactly
//! one credential variant chosen at initialization:
//!
//! - `client_credentials`: app-only access via tenant/client/secret
//! - `client_provided_token`: the caller supplies (and rotates) the token
//! - `interactive`: user sign-in, browser-assisted when possible
//!
//! When AUTH_MODE is unset the mode is inferred from which credentials are
//! present: a secret wins, then a provided token, then interactive.

pub mod cache;
pub mod claims;
pub mod credentials;
pub mod device_code;
pub mod error;
pub mod provider;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::constants::{
    DEFAULT_CLIENT_ID, DEFAULT_REDIRECT_URI, DEFAULT_TENANT_ID, GRAPH_DEFAULT_SCOPE,
    GRAPH_DELEGATED_SCOPES,
};

use cache::TokenCache;
use claims::parse_token_scopes;
use credentials::{
    ConfidentialCredential, Credential, DeviceCodeInfo, DeviceCodePrompt, InteractiveCredential,
    ProvidedTokenCredential,
};
use error::AuthError;
use provider::TokenProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    ClientCredentials,
    ClientProvidedToken,
    Interactive,
}

impl AuthMode {
    pub fn parse(value: &str) -> Result<Self, AuthError> {
        match value {
            "client_credentials" => Ok(AuthMode::ClientCredentials),
            "client_provided_token" => Ok(AuthMode::ClientProvidedToken),
            "interactive" => Ok(AuthMode::Interactive),
            other => Err(AuthError::UnsupportedMode(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::ClientCredentials => "client_credentials",
            AuthMode::ClientProvidedToken => "client_provided_token",
            AuthMode::Interactive => "interactive",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw configuration, normally read from the environment but constructible
/// directly for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub mode: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub access_token: Option<String>,
    pub token_expires_on: Option<DateTime<Utc>>,
    pub redirect_uri: Option<String>,
    pub user_email: Option<String>,
}

impl AuthConfig {
    pub fn from_env() -> Self {
        Self {
            mode: std::env::var("AUTH_MODE").ok().filter(|s| !s.is_empty()),
            tenant_id: std::env::var("TENANT_ID").ok().filter(|s| !s.is_empty()),
            client_id: std::env::var("CLIENT_ID").ok().filter(|s| !s.is_empty()),
            client_secret: std::env::var("CLIENT_SECRET").ok().filter(|s| !s.is_empty()),
            access_token: std::env::var("ACCESS_TOKEN").ok().filter(|s| !s.is_empty()),
            token_expires_on: std::env::var("TOKEN_EXPIRES_ON")
                .ok()
                .filter(|s| !s.is_empty())
                .and_then(|s| parse_token_expiry(&s)),
            redirect_uri: std::env::var("REDIRECT_URI").ok().filter(|s| !s.is_empty()),
            user_email: std::env::var("USER_EMAIL").ok().filter(|s| !s.is_empty()),
        }
    }

    /// Explicit AUTH_MODE wins; otherwise infer from which credentials exist.
    pub fn resolve_mode(&self) -> Result<AuthMode, AuthError> {
        if let Some(mode) = &self.mode {
            return AuthMode::parse(mode);
        }
        Ok(infer_mode(
            self.client_secret.is_some(),
            self.access_token.is_some(),
        ))
    }
}

/// TOKEN_EXPIRES_ON is RFC 3339. An unparseable value degrades to the
/// credential's default lifetime instead of failing startup.
fn parse_token_expiry(value: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(err) => {
            warn!("Ignoring unparseable TOKEN_EXPIRES_ON '{}': {}", value, err);
            None
        }
    }
}

fn infer_mode(has_secret: bool, has_token: bool) -> AuthMode {
    if has_secret {
        AuthMode::ClientCredentials
    } else if has_token {
        AuthMode::ClientProvidedToken
    } else {
        AuthMode::Interactive
    }
}

/// Snapshot of token health for the status tool. Queries degrade rather
/// than fail: when a live check cannot complete, the token is reported as
/// not expired with no further detail.
#[derive(Debug, Clone, Serialize)]
pub struct TokenStatus {
    pub mode: String,
    pub is_expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct AuthManager {
    config: AuthConfig,
    mode: AuthMode,
    credential: Option<Arc<Credential>>,
    prompt: DeviceCodePrompt,
}

impl AuthManager {
    pub fn new(config: AuthConfig) -> Result<Self, AuthError> {
        Self::with_prompt(config, DeviceCodePrompt::new())
    }

    /// Share an externally owned prompt slot, so callers can observe a
    /// device-code handshake while initialization is still in flight.
    pub fn with_prompt(config: AuthConfig, prompt: DeviceCodePrompt) -> Result<Self, AuthError> {
        let mode = config.resolve_mode()?;
        Ok(Self {
            config,
            mode,
            credential: None,
            prompt,
        })
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Build the credential for the resolved mode and validate it with a
    /// token fetch. Validation is skipped only for provided-token mode with
    /// no token yet, since the caller is expected to push one later.
    pub async fn initialize(&mut self) -> Result<(), AuthError> {
        info!("Initializing authentication in {} mode", self.mode);
        let credential = Arc::new(self.build_credential()?);
        self.credential = Some(credential.clone());

        if self.mode == AuthMode::ClientProvidedToken && self.config.access_token.is_none() {
            debug!("No token provided yet, skipping credential validation");
            return Ok(());
        }

        match credential
            .acquire_token(&[GRAPH_DEFAULT_SCOPE.to_string()])
            .await
        {
            Ok(token) => {
                info!("Credential validated, token expires {}", token.expires_on);
                self.prompt.clear();
                Ok(())
            }
            Err(err) => {
                // A device-code handshake may still be completable by the
                // user, so the prompt stays published.
                self.prompt.settle();
                Err(self.remediate(err))
            }
        }
    }

    fn build_credential(&self) -> Result<Credential, AuthError> {
        match self.mode {
            AuthMode::ClientCredentials => {
                let (Some(tenant), Some(client), Some(secret)) = (
                    self.config.tenant_id.clone(),
                    self.config.client_id.clone(),
                    self.config.client_secret.clone(),
                ) else {
                    return Err(AuthError::Configuration(
                        "Client credentials mode requires TENANT_ID, CLIENT_ID, and CLIENT_SECRET"
                            .to_string(),
                    ));
                };
                Ok(Credential::Confidential(ConfidentialCredential::new(
                    tenant, client, secret,
                )))
            }
            AuthMode::ClientProvidedToken => Ok(Credential::Provided(ProvidedTokenCredential::new(
                self.config.access_token.clone(),
                self.config.token_expires_on,
            ))),
            AuthMode::Interactive => {
                let tenant = self
                    .config
                    .tenant_id
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TENANT_ID.to_string());
                let client = self
                    .config
                    .client_id
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());
                let redirect = self
                    .config
                    .redirect_uri
                    .clone()
                    .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());

                let cache = TokenCache::for_identity(&tenant, &client);
                if cache.is_none() {
                    warn!("No platform cache directory, tokens will not be persisted");
                }
                let credential = match InteractiveCredential::browser(
                    tenant.clone(),
                    client.clone(),
                    redirect,
                    self.prompt.clone(),
                    cache.clone(),
                ) {
                    Ok(credential) => credential,
                    Err(err) => {
                        warn!("Browser sign-in unavailable ({}), using device code", err);
                        InteractiveCredential::device_code(tenant, client, self.prompt.clone(), cache)
                    }
                };
                Ok(Credential::Interactive(credential))
            }
        }
    }

    /// Interactive app registrations sometimes reject public-client grants;
    /// the raw authority error is unactionable, so rewrite it.
    fn remediate(&self, err: AuthError) -> AuthError {
        if self.mode != AuthMode::Interactive {
            return err;
        }
        match err {
            AuthError::AuthenticationFailed(msg)
                if msg.contains("client_secret") || msg.contains("client_assertion") =>
            {
                AuthError::AuthenticationFailed(format!(
                    "The application is not configured for interactive sign-in. \
                     Enable 'Allow public client flows' on the app registration, \
                     or set CLIENT_SECRET to use client credentials mode. ({})",
                    msg
                ))
            }
            other => other,
        }
    }

    /// Push a fresh token into the provided-token credential.
    pub fn update_access_token(
        &self,
        token: String,
        expires_on: Option<DateTime<Utc>>,
    ) -> Result<(), AuthError> {
        let credential = self.credential.as_ref().ok_or(AuthError::NotInitialized)?;
        match credential.as_provided() {
            Some(provided) => {
                provided.update_token(token, expires_on);
                Ok(())
            }
            None => Err(AuthError::UnsupportedOperation(format!(
                "Cannot update the access token in {} mode",
                self.mode
            ))),
        }
    }

    /// Adapter handed to the Graph client: the active credential plus the
    /// scope list appropriate for the mode.
    pub fn token_provider(&self) -> Result<TokenProvider, AuthError> {
        let credential = self.credential.as_ref().ok_or(AuthError::NotInitialized)?;
        Ok(TokenProvider::new(credential.clone(), self.scopes()))
    }

    fn scopes(&self) -> Vec<String> {
        match self.mode {
            AuthMode::Interactive => GRAPH_DELEGATED_SCOPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            _ => vec![GRAPH_DEFAULT_SCOPE.to_string()],
        }
    }

    /// Current token health. Never fails: provided-token mode answers from
    /// local state, the other modes attempt a live fetch and fall back to a
    /// bare "not expired" answer when it cannot complete.
    pub async fn token_status(&self) -> TokenStatus {
        let mode = self.mode.to_string();
        let Some(credential) = self.credential.as_ref() else {
            return TokenStatus {
                mode,
                is_expired: true,
                expires_on: None,
                scopes: None,
            };
        };

        if let Some(provided) = credential.as_provided() {
            let is_expired = provided.is_expired();
            return TokenStatus {
                mode,
                is_expired,
                expires_on: Some(provided.expiration_time()),
                scopes: (!is_expired)
                    .then(|| provided.current_token())
                    .flatten()
                    .map(|token| parse_token_scopes(&token)),
            };
        }

        match credential.acquire_token(&self.scopes()).await {
            Ok(token) => TokenStatus {
                mode,
                is_expired: false,
                expires_on: Some(token.expires_on),
                scopes: Some(parse_token_scopes(&token.token)),
            },
            Err(err) => {
                debug!("Token status check could not fetch a token: {}", err);
                TokenStatus {
                    mode,
                    is_expired: false,
                    expires_on: None,
                    scopes: None,
                }
            }
        }
    }

    pub fn is_authenticating(&self) -> bool {
        self.prompt.is_authenticating()
    }

    pub fn device_code_info(&self) -> Option<DeviceCodeInfo> {
        self.prompt.info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn config(mode: Option<&str>, secret: Option<&str>, token: Option<&str>) -> AuthConfig {
        AuthConfig {
            mode: mode.map(str::to_string),
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            client_secret: secret.map(str::to_string),
            access_token: token.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_mode_inference_precedence() {
        assert_eq!(infer_mode(true, true), AuthMode::ClientCredentials);
        assert_eq!(infer_mode(true, false), AuthMode::ClientCredentials);
        assert_eq!(infer_mode(false, true), AuthMode::ClientProvidedToken);
        assert_eq!(infer_mode(false, false), AuthMode::Interactive);
    }

    #[test]
    fn test_explicit_mode_overrides_inference() {
        let cfg = config(Some("interactive"), Some("secret"), None);
        assert_eq!(cfg.resolve_mode().unwrap(), AuthMode::Interactive);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let cfg = config(Some("managed_identity"), None, None);
        assert!(matches!(
            cfg.resolve_mode(),
            Err(AuthError::UnsupportedMode(_))
        ));
    }

    #[test]
    fn test_token_expiry_parsing() {
        let parsed = parse_token_expiry("2026-09-01T12:00:00Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-09-01T12:00:00+00:00");

        let parsed = parse_token_expiry("2026-09-01T14:00:00+02:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-09-01T12:00:00+00:00");

        assert!(parse_token_expiry("next tuesday").is_none());
        assert!(parse_token_expiry("1756728000").is_none());
    }

    #[test]
    fn test_mode_round_trip() {
        for mode in [
            AuthMode::ClientCredentials,
            AuthMode::ClientProvidedToken,
            AuthMode::Interactive,
        ] {
            assert_eq!(AuthMode::parse(mode.as_str()).unwrap(), mode);
        }
    }

    #[tokio::test]
    async fn test_client_credentials_requires_full_config() {
        let mut cfg = config(Some("client_credentials"), Some("secret"), None);
        cfg.client_secret = None;
        let mut manager = AuthManager::new(cfg).unwrap();
        assert!(matches!(
            manager.initialize().await,
            Err(AuthError::Configuration(_))
        ));
        // Failed initialization leaves no usable provider behind.
        assert!(manager.token_provider().is_err());
    }

    #[tokio::test]
    async fn test_provided_token_mode_skips_validation_without_token() {
        let mut manager =
            AuthManager::new(config(Some("client_provided_token"), None, None)).unwrap();
        manager.initialize().await.unwrap();

        let status = manager.token_status().await;
        assert_eq!(status.mode, "client_provided_token");
        assert!(status.is_expired);
        assert_eq!(status.expires_on, Some(DateTime::UNIX_EPOCH));
        assert!(status.scopes.is_none());
    }

    #[tokio::test]
    async fn test_configured_expiry_overrides_default_lifetime() {
        let mut cfg = config(Some("client_provided_token"), None, Some("tok"));
        let expires = Utc::now() + Duration::hours(8);
        cfg.token_expires_on = Some(expires);

        let mut manager = AuthManager::new(cfg).unwrap();
        manager.initialize().await.unwrap();

        let status = manager.token_status().await;
        assert!(!status.is_expired);
        assert_eq!(status.expires_on, Some(expires));
    }

    #[tokio::test]
    async fn test_update_access_token_in_provided_mode() {
        let mut manager =
            AuthManager::new(config(Some("client_provided_token"), None, None)).unwrap();
        manager.initialize().await.unwrap();

        let expires = Utc::now() + Duration::minutes(45);
        manager
            .update_access_token("fresh-token".to_string(), Some(expires))
            .unwrap();

        let status = manager.token_status().await;
        assert!(!status.is_expired);
        assert_eq!(status.expires_on, Some(expires));

        let provider = manager.token_provider().unwrap();
        assert_eq!(provider.access_token().await.unwrap(), "fresh-token");
    }

    #[tokio::test]
    async fn test_update_access_token_rejected_outside_provided_mode() {
        let manager = AuthManager::new(config(None, Some("secret"), None)).unwrap();
        // Before initialization there is no credential at all.
        assert!(matches!(
            manager.update_access_token("tok".to_string(), None),
            Err(AuthError::NotInitialized)
        ));

        let mut manager = manager;
        manager.credential = Some(Arc::new(manager.build_credential().unwrap()));
        assert!(matches!(
            manager.update_access_token("tok".to_string(), None),
            Err(AuthError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_interactive_scopes_are_delegated() {
        let manager = AuthManager::new(config(Some("interactive"), None, None)).unwrap();
        let scopes = manager.scopes();
        assert_eq!(scopes.len(), 3);
        assert!(scopes.iter().all(|s| !s.ends_with(".default")));

        let manager = AuthManager::new(config(None, Some("secret"), None)).unwrap();
        assert_eq!(manager.scopes(), vec![GRAPH_DEFAULT_SCOPE.to_string()]);
    }

    #[tokio::test]
    async fn test_provided_status_reports_scopes_from_claims() {
        use base64::Engine;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"scp":"Calendars.ReadWrite People.Read"}"#);
        let token = format!("{}.{}.sig", header, payload);

        let mut manager =
            AuthManager::new(config(Some("client_provided_token"), None, None)).unwrap();
        manager.initialize().await.unwrap();
        manager.update_access_token(token, None).unwrap();

        let status = manager.token_status().await;
        assert_eq!(
            status.scopes,
            Some(vec![
                "Calendars.ReadWrite".to_string(),
                "People.Read".to_string()
            ])
        );
    }
}
