//! Best-effort on-disk token cache for interactive sign-in
//!
//! Lets a restarted server reuse a still-valid token instead of forcing a
//! fresh device-code handshake. Entries are keyed by tenant and client id so
//! switching identities never serves a stale token. Every failure here is
//! logged and swallowed; the cache is an optimization, not a requirement.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::credentials::AccessToken;

#[derive(Debug, Serialize, Deserialize, Default)]
struct CacheFile {
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    token: String,
    expires_on: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
    key: String,
}

impl TokenCache {
    /// Cache under the platform cache directory. Returns `None` when no
    /// cache directory is available.
    pub fn for_identity(tenant_id: &str, client_id: &str) -> Option<Self> {
        let path = dirs::cache_dir()?.join("outlook-mcp").join("token-cache.json");
        Some(Self::at(path, tenant_id, client_id))
    }

    fn at(path: PathBuf, tenant_id: &str, client_id: &str) -> Self {
        Self {
            path,
            key: format!("{}/{}", tenant_id, client_id),
        }
    }

    /// Load an unexpired token for this identity, if any.
    pub fn load(&self) -> Option<AccessToken> {
        let bytes = fs::read(&self.path).ok()?;
        let file: CacheFile = serde_json::from_slice(&bytes).ok()?;
        let entry = file.entries.get(&self.key)?;
        let token = AccessToken {
            token: entry.token.clone(),
            expires_on: entry.expires_on,
        };
        if token.is_expired() {
            debug!("Cached token for {} is expired", self.key);
            return None;
        }
        Some(token)
    }

    /// Persist a token for this identity, keeping other identities' entries.
    pub fn store(&self, token: &AccessToken) {
        let mut file = fs::read(&self.path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<CacheFile>(&bytes).ok())
            .unwrap_or_default();

        file.entries.insert(
            self.key.clone(),
            CacheEntry {
                token: token.token.clone(),
                expires_on: token.expires_on,
            },
        );

        if let Some(parent) = self.path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!("Failed to create token cache directory: {}", err);
                return;
            }
        }
        match serde_json::to_vec_pretty(&file) {
            Ok(bytes) => {
                if let Err(err) = fs::write(&self.path, bytes) {
                    warn!("Failed to write token cache: {}", err);
                }
            }
            Err(err) => warn!("Failed to serialize token cache: {}", err),
        }
    }
}
