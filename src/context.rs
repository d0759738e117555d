//! Lazy, process-wide Graph session
//!
//! Nothing touches the network at startup; the first tool call triggers
//! authentication. Concurrent first calls are single-flighted: one caller
//! initializes while the rest await the same outcome. A failed attempt is
//! not cached, so the next call retries — which is exactly what a user
//! completing a device-code sign-in needs.

use std::sync::Arc;

use log::{info, warn};
use tokio::sync::OnceCell;

use crate::auth::credentials::{DeviceCodeInfo, DeviceCodePrompt};
use crate::auth::{AuthConfig, AuthManager, AuthMode};
use crate::graph::GraphClient;

/// Why a session could not be established, with enough detail for the user
/// to act on it.
#[derive(Debug, Clone)]
pub struct AuthFailure {
    pub message: String,
    pub device_code: Option<DeviceCodeInfo>,
}

impl AuthFailure {
    /// Tool-facing text: the failure plus sign-in instructions when a
    /// device-code handshake is waiting on the user.
    pub fn render(&self) -> String {
        let mut text = format!("🔐 Authentication Required\n\n{}", self.message);
        if let Some(info) = &self.device_code {
            text.push_str("\n\n");
            text.push_str(&info.message);
        }
        text.push_str("\n\nPlease complete the authentication and try again.");
        text
    }
}

/// An authenticated session: the manager that owns the credential, a Graph
/// client bound to it, and the mailbox all calendar operations target.
#[derive(Debug)]
pub struct GraphSession {
    pub auth: Arc<AuthManager>,
    pub graph: GraphClient,
    pub user_email: String,
}

pub struct GraphContext {
    config: Option<AuthConfig>,
    session: OnceCell<Arc<GraphSession>>,
    prompt: DeviceCodePrompt,
}

impl GraphContext {
    /// Configuration is read from the environment at first use.
    pub fn new() -> Self {
        Self {
            config: None,
            session: OnceCell::new(),
            prompt: DeviceCodePrompt::new(),
        }
    }

    /// Explicit configuration, for embedding and tests.
    pub fn with_config(config: AuthConfig) -> Self {
        Self {
            config: Some(config),
            session: OnceCell::new(),
            prompt: DeviceCodePrompt::new(),
        }
    }

    /// Shared handle to the device-code prompt slot. The slot is owned here
    /// rather than by the session so a handshake published while the first
    /// initialization is still polling can be observed concurrently.
    pub fn device_code_prompt(&self) -> DeviceCodePrompt {
        self.prompt.clone()
    }

    /// The session, initializing it on first call.
    pub async fn session(&self) -> Result<Arc<GraphSession>, AuthFailure> {
        self.session
            .get_or_try_init(|| self.build_session())
            .await
            .cloned()
    }

    /// The session if it has already been established.
    pub fn try_session(&self) -> Option<Arc<GraphSession>> {
        self.session.get().cloned()
    }

    async fn build_session(&self) -> Result<Arc<GraphSession>, AuthFailure> {
        let config = self.config.clone().unwrap_or_else(AuthConfig::from_env);

        let mut auth =
            AuthManager::with_prompt(config, self.prompt.clone()).map_err(|err| AuthFailure {
            message: err.to_string(),
            device_code: None,
        })?;

        if let Err(err) = auth.initialize().await {
            warn!("Authentication failed: {}", err);
            return Err(AuthFailure {
                message: err.to_string(),
                device_code: auth.device_code_info(),
            });
        }

        let provider = auth.token_provider().map_err(|err| AuthFailure {
            message: err.to_string(),
            device_code: None,
        })?;
        let graph = GraphClient::new(provider).map_err(|err| AuthFailure {
            message: err.to_string(),
            device_code: None,
        })?;

        let user_email = match auth.config().user_email.clone() {
            Some(email) => email,
            None if auth.mode() == AuthMode::ClientCredentials => {
                // App-only tokens have no signed-in user to fall back to.
                return Err(AuthFailure {
                    message: "USER_EMAIL is required in client_credentials mode".to_string(),
                    device_code: None,
                });
            }
            None => match self.resolve_me(&graph).await {
                Some(email) => email,
                None => {
                    return Err(AuthFailure {
                        message: "Unable to determine the target mailbox; set USER_EMAIL"
                            .to_string(),
                        device_code: auth.device_code_info(),
                    });
                }
            },
        };

        info!("Graph session established for {}", user_email);
        Ok(Arc::new(GraphSession {
            auth: Arc::new(auth),
            graph,
            user_email,
        }))
    }

    async fn resolve_me(&self, graph: &GraphClient) -> Option<String> {
        match graph.get_me().await {
            Ok(me) => me.effective_email().map(str::to_string),
            Err(err) => {
                warn!("Could not resolve signed-in user: {}", err);
                None
            }
        }
    }
}

impl Default for GraphContext {
    fn default() -> Self {
        Self::new()
    }
}
