//! Token provider handed to the Graph client
//!
//! A thin, cloneable adapter: it pins the credential and the scope list
//! chosen at initialization and produces a raw bearer string per request.

use std::sync::Arc;

use super::credentials::Credential;
use super::error::AuthError;

#[derive(Debug, Clone)]
pub struct TokenProvider {
    credential: Arc<Credential>,
    scopes: Vec<String>,
}

impl TokenProvider {
    pub fn new(credential: Arc<Credential>, scopes: Vec<String>) -> Self {
        Self { credential, scopes }
    }

    /// Fetch a bearer token for the configured scopes.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let token = self.credential.acquire_token(&self.scopes).await?;
        Ok(token.token)
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}
