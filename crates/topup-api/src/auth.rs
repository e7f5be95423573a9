//! Authentication endpoints.

use crate::request::paths;
use crate::{ApiClient, ApiRequest, ApiResponse};
use reqwest::Method;
use topup_types::{
    AuthPayload, LoginRequest, LogoutRequest, ProfileUpdate, RegisterRequest, User, UserRole,
};
use tracing::{debug, warn};

impl ApiClient {
    /// `POST /auth/login`. Persists the issued tokens on success.
    pub async fn login(&self, email: &str, password: &str) -> ApiResponse<AuthPayload> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.send_json(Method::POST, paths::LOGIN, &body).await;
        self.keep_tokens(&response);
        response
    }

    /// `POST /auth/register`. Persists the issued tokens on success.
    pub async fn register(&self, request: &RegisterRequest) -> ApiResponse<AuthPayload> {
        let response = self.send_json(Method::POST, paths::REGISTER, request).await;
        self.keep_tokens(&response);
        response
    }

    /// Revoke the refresh token server-side, then clear both tokens.
    ///
    /// The server call is best effort; local tokens are always cleared.
    pub async fn logout(&self) -> ApiResponse<()> {
        if let Some(refresh_token) = self.tokens().refresh_token() {
            let body = LogoutRequest { refresh_token };
            let response: ApiResponse<serde_json::Value> =
                self.send_json(Method::POST, paths::LOGOUT, &body).await;
            if !response.success {
                debug!(error = ?response.error, "Server-side logout failed");
            }
        }

        if let Err(e) = self.tokens().clear_tokens() {
            warn!(error = %e, "Failed to clear tokens on logout");
        }
        ApiResponse::success(None, None)
    }

    pub async fn profile(&self) -> ApiResponse<User> {
        self.send(ApiRequest::get(paths::PROFILE)).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> ApiResponse<User> {
        self.send_json(Method::PUT, paths::PROFILE, update).await
    }

    pub async fn user_role(&self) -> ApiResponse<UserRole> {
        self.send(ApiRequest::get("/auth/role")).await
    }

    fn keep_tokens(&self, response: &ApiResponse<AuthPayload>) {
        let Some(payload) = response.data.as_ref().filter(|_| response.success) else {
            return;
        };
        if let Err(e) = self
            .tokens()
            .store_tokens(&payload.access_token, payload.refresh_token.as_deref())
        {
            warn!(error = %e, "Failed to persist issued tokens");
        }
    }
}
