//! Error taxonomy for the authentication core
//!
//! Configuration and unsupported-mode errors abort the current call only;
//! the process never exits from inside this module. Token-status queries do
//! not use these at all — they degrade instead of raising.

use super::credentials::DeviceCodeInfo;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A field required by the selected auth mode is missing.
    #[error("{0}")]
    Configuration(String),

    /// The AUTH_MODE value is not one of the known modes.
    #[error("Unsupported authentication mode: {0}")]
    UnsupportedMode(String),

    /// The requested operation is not valid for the active auth mode.
    #[error("{0}")]
    UnsupportedOperation(String),

    /// A credential-consuming operation was called before `initialize()`.
    #[error("Authentication not initialized")]
    NotInitialized,

    /// Token acquisition or validation failed.
    #[error("{0}")]
    AuthenticationFailed(String),

    /// A device-code handshake has started and needs the user to act.
    /// Error-shaped so callers surface the prompt and retry later.
    #[error("Sign-in pending: enter code {} at {}", .0.user_code, .0.verification_uri)]
    PendingUserAction(DeviceCodeInfo),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::AuthenticationFailed(format!("Token request failed: {}", err))
    }
}
