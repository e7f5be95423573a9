//! HTTP client with bearer injection and refresh-and-retry on `401`.

use crate::envelope::normalize;
use crate::refresh::{HttpTokenRefresher, RefreshCoordinator, RefreshOutcome};
use crate::request::{ApiRequest, RequestBody};
use crate::{codes, ApiResponse};
use parking_lot::RwLock;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use topup_storage::TokenStore;
use tracing::{debug, info, warn};

/// Session-level events raised by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    /// A `401` could not be recovered; the session must be dropped.
    Invalidated,
}

/// Invoked on a final `401`. When none is bound the client clears the
/// stored tokens itself.
pub type UnauthorizedHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retry,
}

/// REST client for the storefront API.
pub struct ApiClient {
    base_url: String,
    http: Client,
    tokens: Arc<TokenStore>,
    refresh: Arc<RefreshCoordinator>,
    signals: broadcast::Sender<SessionSignal>,
    unauthorized: RwLock<Option<UnauthorizedHandler>>,
}

impl ApiClient {
    /// Create a client whose refresh calls go to the same base address.
    pub fn new(base_url: impl Into<String>, tokens: Arc<TokenStore>) -> Self {
        let base_url = trim_base(base_url.into());
        let http = Client::new();
        let refresher = Arc::new(HttpTokenRefresher::new(http.clone(), base_url.clone()));
        let refresh = Arc::new(RefreshCoordinator::new(tokens.clone(), refresher));
        Self::build(base_url, http, tokens, refresh)
    }

    /// Create a client that shares an existing refresh coordinator.
    pub fn with_coordinator(
        base_url: impl Into<String>,
        tokens: Arc<TokenStore>,
        refresh: Arc<RefreshCoordinator>,
    ) -> Self {
        Self::build(trim_base(base_url.into()), Client::new(), tokens, refresh)
    }

    fn build(
        base_url: String,
        http: Client,
        tokens: Arc<TokenStore>,
        refresh: Arc<RefreshCoordinator>,
    ) -> Self {
        let (signals, _) = broadcast::channel(16);
        Self {
            base_url,
            http,
            tokens,
            refresh,
            signals,
            unauthorized: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn refresh_coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.refresh
    }

    /// Subscribe to [`SessionSignal`]s.
    pub fn subscribe_session_signals(&self) -> broadcast::Receiver<SessionSignal> {
        self.signals.subscribe()
    }

    pub fn bind_unauthorized_handler(&self, handler: UnauthorizedHandler) {
        *self.unauthorized.write() = Some(handler);
    }

    pub fn clear_unauthorized_handler(&self) {
        *self.unauthorized.write() = None;
    }

    /// Perform a request and normalize the response.
    ///
    /// A `401` on the first attempt of any endpoint other than login or
    /// refresh triggers one shared refresh. If it succeeds the request is
    /// re-issued once with the new token; otherwise the session is
    /// invalidated and `SESSION_EXPIRED` is returned.
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResponse<T> {
        let mut attempt = Attempt::First;
        loop {
            let response = match self.dispatch(&request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(endpoint = %request.endpoint(), error = %e, "Request failed");
                    return ApiResponse::network_error(e.to_string());
                }
            };
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED
                && attempt == Attempt::First
                && request.allows_refresh()
            {
                debug!(endpoint = %request.endpoint(), "Unauthorized, attempting token refresh");
                match self.refresh.refresh().await {
                    RefreshOutcome::Refreshed(_) => {
                        attempt = Attempt::Retry;
                        continue;
                    }
                    RefreshOutcome::Failed => {
                        info!(endpoint = %request.endpoint(), "Session could not be refreshed");
                        let _ = self.signals.send(SessionSignal::Invalidated);
                        return ApiResponse::session_expired();
                    }
                }
            }

            let body = match response.bytes().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(endpoint = %request.endpoint(), error = %e, "Failed to read response body");
                    return ApiResponse::network_error(e.to_string());
                }
            };

            if status == StatusCode::UNAUTHORIZED {
                self.on_unauthorized();
            }

            return normalize(status, &body);
        }
    }

    /// Serialize `body` as JSON and send it.
    pub async fn send_json<T, B>(&self, method: Method, endpoint: &str, body: &B) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        match ApiRequest::new(method, endpoint).with_json(body) {
            Ok(request) => self.send(request).await,
            Err(e) => ApiResponse::failure(
                format!("Failed to encode request: {e}"),
                codes::UNKNOWN_ERROR,
            ),
        }
    }

    async fn dispatch(&self, request: &ApiRequest) -> reqwest::Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, request.endpoint());
        let mut builder = self.http.request(request.method().clone(), &url);

        if let Some(token) = self.tokens.access_token() {
            builder = builder.bearer_auth(token);
        }

        builder = match request.body() {
            RequestBody::Empty => builder.header(CONTENT_TYPE, "application/json"),
            RequestBody::Json(bytes) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(bytes.clone()),
            RequestBody::Multipart(form) => builder.multipart(form.to_form()),
        };

        builder.send().await
    }

    fn on_unauthorized(&self) {
        let handler = self.unauthorized.read().clone();
        match handler {
            Some(handler) => handler(),
            None => {
                if let Err(e) = self.tokens.clear_tokens() {
                    warn!(error = %e, "Failed to clear tokens after 401");
                }
            }
        }
    }
}

fn trim_base(mut base_url: String) -> String {
    while base_url.ends_with('/') {
        base_url.pop();
    }
    base_url
}
