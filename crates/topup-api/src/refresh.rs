//! Single-flight access token refresh.
//!
//! One [`RefreshCoordinator`] is shared by the HTTP client and the refresh
//! scheduler. While a refresh is in flight every other caller waits for its
//! outcome instead of issuing a second call, and all of them observe that
//! same outcome.

use crate::paths;
use crate::{ApiError, ApiResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;
use topup_storage::TokenStore;
use topup_types::{AuthPayload, RefreshRequest};
use tracing::{debug, info, warn};

/// Result of a refresh, shared by the caller that issued it and every
/// caller that waited on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The new access token.
    Refreshed(String),
    Failed,
}

impl RefreshOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed(_))
    }
}

/// Tokens issued by the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> ApiResult<RefreshedTokens>;
}

/// `POST /auth/refresh` against the REST API.
pub struct HttpTokenRefresher {
    http: Client,
    base_url: String,
}

impl HttpTokenRefresher {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> ApiResult<RefreshedTokens> {
        let url = format!("{}{}", self.base_url, paths::REFRESH);
        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(&RefreshRequest {
                refresh_token: refresh_token.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::RefreshRejected(format!("HTTP {}", status)));
        }

        let body: Value = response.json().await?;
        let payload = match body.get("data").filter(|data| data.is_object()) {
            Some(data) => data.clone(),
            None => body,
        };

        let payload: AuthPayload = serde_json::from_value(payload)
            .map_err(|e| ApiError::RefreshRejected(format!("unexpected payload: {e}")))?;
        if payload.access_token.is_empty() {
            return Err(ApiError::RefreshRejected("empty access token".to_string()));
        }

        Ok(RefreshedTokens {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token.filter(|t| !t.is_empty()),
        })
    }
}

#[derive(Default)]
struct FlightState {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// Serializes concurrent refresh attempts into exactly one network call.
pub struct RefreshCoordinator {
    tokens: Arc<TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    state: Mutex<FlightState>,
}

impl RefreshCoordinator {
    pub fn new(tokens: Arc<TokenStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            tokens,
            refresher,
            state: Mutex::new(FlightState::default()),
        }
    }

    /// Whether a refresh call is currently outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().in_flight
    }

    /// Refresh the access token, or join the refresh already in flight.
    ///
    /// Fails immediately, without a network call, when no refresh token is
    /// stored. On failure both tokens are purged.
    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(refresh_token) = self.tokens.refresh_token() else {
            debug!("No refresh token stored, refresh impossible");
            return RefreshOutcome::Failed;
        };

        let waiter = {
            let mut state = self.state.lock();
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Some(rx)
            } else {
                state.in_flight = true;
                None
            }
        };

        if let Some(rx) = waiter {
            debug!("Refresh already in flight, waiting for its outcome");
            return rx.await.unwrap_or(RefreshOutcome::Failed);
        }

        let mut flight = Flight {
            coordinator: self,
            settled: false,
        };

        let outcome = match self.refresher.refresh(&refresh_token).await {
            Ok(tokens) => self.persist(tokens),
            Err(e) => {
                warn!(error = %e, "Token refresh failed, clearing tokens");
                self.purge();
                RefreshOutcome::Failed
            }
        };

        flight.settle(outcome.clone());
        outcome
    }

    fn persist(&self, tokens: RefreshedTokens) -> RefreshOutcome {
        match self
            .tokens
            .store_tokens(&tokens.access_token, tokens.refresh_token.as_deref())
        {
            Ok(()) => {
                info!(
                    rotated_refresh_token = tokens.refresh_token.is_some(),
                    "Access token refreshed"
                );
                RefreshOutcome::Refreshed(tokens.access_token)
            }
            Err(e) => {
                warn!(error = %e, "Could not persist refreshed tokens");
                self.purge();
                RefreshOutcome::Failed
            }
        }
    }

    fn purge(&self) {
        if let Err(e) = self.tokens.clear_tokens() {
            warn!(error = %e, "Failed to clear tokens");
        }
    }

    /// Resolve every waiter and clear the in-flight flag under one lock.
    fn settle(&self, outcome: RefreshOutcome) {
        let waiters = {
            let mut state = self.state.lock();
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };
        debug!(waiters = waiters.len(), refreshed = outcome.is_refreshed(), "Refresh settled");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    #[cfg(test)]
    fn waiter_count(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

/// Guarantees waiters are resolved even if the refreshing task is dropped
/// mid-call.
struct Flight<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl Flight<'_> {
    fn settle(&mut self, outcome: RefreshOutcome) {
        self.settled = true;
        self.coordinator.settle(outcome);
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Refresh abandoned before completion");
            self.coordinator.settle(RefreshOutcome::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;
    use topup_storage::MemoryStorage;

    struct GatedRefresher {
        calls: AtomicUsize,
        gate: Semaphore,
        result: Option<RefreshedTokens>,
    }

    impl GatedRefresher {
        fn new(result: Option<RefreshedTokens>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(0),
                result,
            })
        }

        fn open(&self) {
            self.gate.add_permits(1);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for GatedRefresher {
        async fn refresh(&self, _refresh_token: &str) -> ApiResult<RefreshedTokens> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.unwrap();
            self.result
                .clone()
                .ok_or_else(|| ApiError::RefreshRejected("revoked".to_string()))
        }
    }

    fn tokens_with(refresh: Option<&str>) -> Arc<TokenStore> {
        let tokens = Arc::new(TokenStore::new(Arc::new(MemoryStorage::new())));
        tokens.set_access_token(Some("old-access")).unwrap();
        tokens.set_refresh_token(refresh).unwrap();
        tokens
    }

    fn new_tokens() -> Option<RefreshedTokens> {
        Some(RefreshedTokens {
            access_token: "new-access".to_string(),
            refresh_token: Some("new-refresh".to_string()),
        })
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..1000 {
            if condition() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_call() {
        let tokens = tokens_with(Some("refresh-1"));
        let refresher = GatedRefresher::new(new_tokens());
        let coordinator = Arc::new(RefreshCoordinator::new(tokens.clone(), refresher.clone()));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.refresh().await })
            })
            .collect();

        wait_until(|| refresher.calls() == 1 && coordinator.waiter_count() == 4).await;
        assert!(coordinator.is_refreshing());
        refresher.open();

        for handle in handles {
            assert_eq!(
                handle.await.unwrap(),
                RefreshOutcome::Refreshed("new-access".to_string())
            );
        }
        assert_eq!(refresher.calls(), 1);
        assert!(!coordinator.is_refreshing());
        assert_eq!(tokens.access_token(), Some("new-access".to_string()));
        assert_eq!(tokens.refresh_token(), Some("new-refresh".to_string()));
    }

    #[tokio::test]
    async fn test_failure_purges_tokens_and_fails_all_waiters() {
        let tokens = tokens_with(Some("refresh-1"));
        let refresher = GatedRefresher::new(None);
        let coordinator = Arc::new(RefreshCoordinator::new(tokens.clone(), refresher.clone()));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.refresh().await })
            })
            .collect();

        wait_until(|| coordinator.waiter_count() == 2).await;
        refresher.open();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), RefreshOutcome::Failed);
        }
        assert_eq!(refresher.calls(), 1);
        assert_eq!(tokens.access_token(), None);
        assert_eq!(tokens.refresh_token(), None);
    }

    #[tokio::test]
    async fn test_no_refresh_token_fails_without_call() {
        let tokens = tokens_with(None);
        let refresher = GatedRefresher::new(new_tokens());
        let coordinator = RefreshCoordinator::new(tokens.clone(), refresher.clone());

        assert_eq!(coordinator.refresh().await, RefreshOutcome::Failed);
        assert_eq!(refresher.calls(), 0);
        assert_eq!(tokens.access_token(), Some("old-access".to_string()));
    }

    #[tokio::test]
    async fn test_abandoned_leader_releases_waiters() {
        let tokens = tokens_with(Some("refresh-1"));
        let refresher = GatedRefresher::new(new_tokens());
        let coordinator = Arc::new(RefreshCoordinator::new(tokens, refresher.clone()));

        let leader = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.refresh().await })
        };
        wait_until(|| refresher.calls() == 1).await;

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.refresh().await })
        };
        wait_until(|| coordinator.waiter_count() == 1).await;

        leader.abort();
        assert_eq!(waiter.await.unwrap(), RefreshOutcome::Failed);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_sequential_refreshes_issue_separate_calls() {
        let tokens = tokens_with(Some("refresh-1"));
        let refresher = GatedRefresher::new(new_tokens());
        let coordinator = RefreshCoordinator::new(tokens, refresher.clone());

        refresher.open();
        assert!(coordinator.refresh().await.is_refreshed());
        refresher.open();
        assert!(coordinator.refresh().await.is_refreshed());
        assert_eq!(refresher.calls(), 2);
    }

    #[tokio::test]
    async fn test_http_refresher_reads_wrapped_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/auth/refresh")
            .match_body(mockito::Matcher::Json(
                serde_json::json!({"refresh_token": "refresh-1"}),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"data":{"access_token":"fresh","refresh_token":"rotated"}}"#)
            .create_async()
            .await;

        let refresher = HttpTokenRefresher::new(Client::new(), server.url());
        let tokens = refresher.refresh("refresh-1").await.unwrap();
        assert_eq!(tokens.access_token, "fresh");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rotated"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_refresher_reads_bare_payload() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_body(r#"{"access_token":"fresh"}"#)
            .create_async()
            .await;

        let refresher = HttpTokenRefresher::new(Client::new(), server.url());
        let tokens = refresher.refresh("refresh-1").await.unwrap();
        assert_eq!(tokens.access_token, "fresh");
        assert!(tokens.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_http_refresher_rejects_missing_token_and_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_body(r#"{"success":true,"data":{"user":null}}"#)
            .create_async()
            .await;

        let refresher = HttpTokenRefresher::new(Client::new(), server.url());
        assert!(matches!(
            refresher.refresh("refresh-1").await,
            Err(ApiError::RefreshRejected(_))
        ));

        server.reset_async().await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(401)
            .with_body(r#"{"success":false,"message":"revoked"}"#)
            .create_async()
            .await;
        assert!(matches!(
            refresher.refresh("refresh-1").await,
            Err(ApiError::RefreshRejected(_))
        ));
    }
}
