//! Access/refresh token ownership.

use crate::{KeyValueStorage, StorageKeys, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Sole owner of the persisted session credentials.
///
/// Readers never see an error: a storage failure while reading a token is
/// logged and reported as "no token", which callers already treat as
/// unauthenticated. Mutations report storage failures to the caller.
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// The underlying storage, shared with other persisted client state.
    pub fn storage(&self) -> Arc<dyn KeyValueStorage> {
        Arc::clone(&self.storage)
    }

    // ==========================================
    // Tokens
    // ==========================================

    pub fn access_token(&self) -> Option<String> {
        self.read(StorageKeys::ACCESS_TOKEN)
    }

    /// Persist the access token, or purge it with `None`.
    pub fn set_access_token(&self, token: Option<&str>) -> StorageResult<()> {
        self.write(StorageKeys::ACCESS_TOKEN, token)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(StorageKeys::REFRESH_TOKEN)
    }

    /// Persist the refresh token, or purge it with `None`.
    pub fn set_refresh_token(&self, token: Option<&str>) -> StorageResult<()> {
        self.write(StorageKeys::REFRESH_TOKEN, token)
    }

    /// Persist a freshly issued token pair. A missing refresh token keeps
    /// the stored one.
    pub fn store_tokens(&self, access_token: &str, refresh_token: Option<&str>) -> StorageResult<()> {
        self.set_access_token(Some(access_token))?;
        if let Some(refresh_token) = refresh_token {
            self.set_refresh_token(Some(refresh_token))?;
        }
        Ok(())
    }

    /// Purge both tokens. Both deletes are attempted even if the first fails.
    pub fn clear_tokens(&self) -> StorageResult<()> {
        let access = self.set_access_token(None);
        let refresh = self.set_refresh_token(None);
        access.and(refresh)
    }

    /// Purge both tokens and the persisted session summary.
    pub fn clear_session(&self) -> StorageResult<()> {
        let tokens = self.clear_tokens();
        let summary = self.remove(StorageKeys::SESSION_SUMMARY);
        tokens.and(summary)
    }

    // ==========================================
    // JSON blobs
    // ==========================================

    pub fn load_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.storage.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn save_json<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let raw = serde_json::to_string(value)?;
        self.storage.set(key, &raw)
    }

    pub fn remove(&self, key: &str) -> StorageResult<()> {
        self.storage.delete(key).map(|_| ())
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(key, error = %e, "Failed to read token");
                None
            }
        }
    }

    fn write(&self, key: &str, token: Option<&str>) -> StorageResult<()> {
        match token {
            Some(token) => self.storage.set(key, token),
            None => self.storage.delete(key).map(|_| ()),
        }
    }
}
