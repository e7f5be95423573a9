//! Session management with FSM-based state tracking.
//!
//! The FSM tracks transient states (logging in, refreshing, logging out)
//! that aren't persisted. Tokens live in the [`TokenStore`] and a small
//! summary of the signed-in user is persisted next to them so a restarted
//! client can show who was signed in before the session is revalidated.

use crate::auth_fsm::{AuthMachine, AuthMachineInput, AuthState, AuthStateChangedPayload};
use crate::scheduler::RefreshDriver;
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use topup_api::{ApiClient, ApiResponse, SessionSignal};
use topup_storage::{StorageKeys, TokenStore};
use topup_types::{AuthPayload, ProfileUpdate, RegisterRequest, User};
use tracing::{debug, info, warn};

/// Callback type for auth state change notifications.
pub type AuthStateCallback = Box<dyn Fn(AuthStateChangedPayload) + Send + Sync>;

/// Persisted view of the session, stored under the `auth-storage` key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub is_authenticated: bool,
}

/// Owns the authentication lifecycle of one client.
pub struct SessionManager {
    api: Arc<ApiClient>,
    fsm: Mutex<AuthMachine>,
    user: RwLock<Option<User>>,
    last_error: Mutex<Option<String>>,
    authenticated: watch::Sender<bool>,
    state_callback: Mutex<Option<AuthStateCallback>>,
}

impl SessionManager {
    /// Create a session manager and rehydrate the persisted summary.
    ///
    /// A stored access token moves the FSM to `PendingValidation`; call
    /// [`check_auth`](Self::check_auth) to confirm it with the server.
    pub fn new(api: Arc<ApiClient>) -> Self {
        let tokens = api.tokens().clone();
        let mut fsm = AuthMachine::new();
        let mut user = None;

        if tokens.access_token().is_some() {
            // SessionDetected is always valid from the initial state
            let _ = fsm.consume(&AuthMachineInput::SessionDetected);
            user = load_summary(&tokens).and_then(|summary| summary.user);
            debug!(has_user = user.is_some(), "Stored session detected");
        }

        let (authenticated, _) = watch::channel(false);
        Self {
            api,
            fsm: Mutex::new(fsm),
            user: RwLock::new(user),
            last_error: Mutex::new(None),
            authenticated,
            state_callback: Mutex::new(None),
        }
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    fn tokens(&self) -> &Arc<TokenStore> {
        self.api.tokens()
    }

    /// Set a callback to be notified of auth state changes.
    pub fn set_state_callback(&self, callback: AuthStateCallback) {
        *self.state_callback.lock() = Some(callback);
    }

    /// Get the current FSM state.
    pub fn fsm_state(&self) -> AuthState {
        AuthState::from(self.fsm.lock().state())
    }

    pub fn is_authenticated(&self) -> bool {
        self.fsm_state().is_authenticated()
    }

    /// Follows [`is_authenticated`](Self::is_authenticated). The scheduler
    /// and the realtime client bind their lifecycles to it.
    pub fn authenticated(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }

    pub fn user(&self) -> Option<User> {
        self.user.read().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn clear_error(&self) {
        *self.last_error.lock() = None;
    }

    /// Transition the FSM and notify observers if the state changed.
    fn transition(&self, input: &AuthMachineInput) -> AuthResult<AuthState> {
        let mut fsm = self.fsm.lock();
        let old_state = AuthState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = AuthState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                "Auth state transition"
            );
            let authenticated = new_state.is_authenticated();
            self.authenticated.send_if_modified(|current| {
                let changed = *current != authenticated;
                *current = authenticated;
                changed
            });
            self.notify_state_change(new_state);
        }

        Ok(new_state)
    }

    fn notify_state_change(&self, state: AuthState) {
        let cb = self.state_callback.lock();
        if let Some(callback) = cb.as_ref() {
            let user = self.user.read();
            callback(AuthStateChangedPayload {
                state,
                user_id: user.as_ref().map(|u| u.id.clone()),
                email: user.as_ref().map(|u| u.email.clone()),
            });
        }
    }

    /// Validate a stored session with the server.
    ///
    /// Returns `Ok(true)` when the profile fetch succeeds. When it fails
    /// the stored access token is dropped and `Ok(false)` is returned.
    pub async fn check_auth(&self) -> AuthResult<bool> {
        let state = self.fsm_state();
        if state.is_authenticated() {
            return Ok(true);
        }

        if self.tokens().access_token().is_none() {
            if state == AuthState::PendingValidation {
                self.transition(&AuthMachineInput::NoSession)?;
            }
            return Ok(false);
        }

        self.transition(&AuthMachineInput::ValidateSession)?;
        match self.api.profile().await.into_result() {
            Ok(user) => {
                self.set_user(Some(user), true);
                self.transition(&AuthMachineInput::ServerVerified)?;
                info!("Stored session verified");
                Ok(true)
            }
            Err(e) => {
                info!(error = %e, "Stored session rejected");
                if let Err(e) = self.tokens().set_access_token(None) {
                    warn!(error = %e, "Failed to clear rejected access token");
                }
                self.set_user(None, false);
                self.transition(&AuthMachineInput::ServerRejected)?;
                Ok(false)
            }
        }
    }

    /// Sign in with email and password.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<User> {
        self.clear_error();
        self.transition(&AuthMachineInput::LoginAttempt)?;
        let response = self.api.login(email, password).await;
        self.complete_login(response, "Login failed").await
    }

    /// Create an account and sign in with it.
    pub async fn register(&self, request: &RegisterRequest) -> AuthResult<User> {
        self.clear_error();
        self.transition(&AuthMachineInput::LoginAttempt)?;
        let response = self.api.register(request).await;
        self.complete_login(response, "Registration failed").await
    }

    async fn complete_login(
        &self,
        response: ApiResponse<AuthPayload>,
        fallback: &str,
    ) -> AuthResult<User> {
        let error = response.error.clone();
        let payload = match response.into_result() {
            Ok(payload) => payload,
            Err(e) => {
                *self.last_error.lock() = Some(error.unwrap_or_else(|| fallback.to_string()));
                self.transition(&AuthMachineInput::LoginFailed)?;
                return Err(e.into());
            }
        };

        // Registration responses may omit the user
        let user = match payload.user {
            Some(user) => user,
            None => match self.api.profile().await.into_result() {
                Ok(user) => user,
                Err(e) => {
                    *self.last_error.lock() = Some(e.to_string());
                    if let Err(e) = self.tokens().clear_tokens() {
                        warn!(error = %e, "Failed to clear tokens");
                    }
                    self.transition(&AuthMachineInput::LoginFailed)?;
                    return Err(e.into());
                }
            },
        };

        self.set_user(Some(user.clone()), true);
        self.transition(&AuthMachineInput::LoginSuccess)?;
        info!(user_id = %user.id, "Signed in");
        Ok(user)
    }

    /// Sign out. Safe to call when already signed out.
    pub async fn logout(&self) -> AuthResult<()> {
        let state = self.fsm_state();
        if state.is_authenticated() {
            self.transition(&AuthMachineInput::LogoutRequested)?;
        }

        let _ = self.api.logout().await;
        self.clear_local();

        match state {
            AuthState::LoggedIn | AuthState::Refreshing => {
                self.transition(&AuthMachineInput::LogoutComplete)?;
                info!("Signed out");
            }
            AuthState::PendingValidation => {
                self.transition(&AuthMachineInput::NoSession)?;
            }
            _ => debug!(state = ?state, "Logout without an active session"),
        }
        Ok(())
    }

    /// Tear the local session down without contacting the server.
    ///
    /// Used when the session can no longer be recovered.
    pub fn force_logout(&self) {
        if let Err(e) = self.tokens().clear_session() {
            warn!(error = %e, "Failed to clear session storage");
        }
        *self.user.write() = None;

        let state = self.fsm_state();
        if matches!(
            state,
            AuthState::LoggedIn | AuthState::Refreshing | AuthState::PendingValidation
        ) {
            if let Err(e) = self.transition(&AuthMachineInput::SessionInvalidated) {
                warn!(error = %e, "Could not invalidate session state");
            }
            info!(previous = ?state, "Session invalidated");
        }
    }

    /// Re-read the signed-in user's profile. Returns `None` without a
    /// stored access token.
    pub async fn fetch_profile(&self) -> AuthResult<Option<User>> {
        if self.tokens().access_token().is_none() {
            return Ok(None);
        }
        let user = self.api.profile().await.into_result()?;
        self.set_user(Some(user.clone()), true);
        Ok(Some(user))
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> AuthResult<User> {
        self.clear_error();
        let response = self.api.update_profile(update).await;
        let error = response.error.clone();
        match response.into_result() {
            Ok(user) => {
                self.set_user(Some(user.clone()), self.is_authenticated());
                Ok(user)
            }
            Err(e) => {
                *self.last_error.lock() = Some(error.unwrap_or_else(|| "Update failed".to_string()));
                Err(e.into())
            }
        }
    }

    /// Renew the access token through the shared refresh coordinator.
    pub async fn refresh(&self) -> bool {
        let tracked = self.fsm_state() == AuthState::LoggedIn
            && self.transition(&AuthMachineInput::RefreshStarted).is_ok();

        let refreshed = self
            .api
            .refresh_coordinator()
            .refresh()
            .await
            .is_refreshed();

        if tracked && self.fsm_state() == AuthState::Refreshing {
            let input = if refreshed {
                AuthMachineInput::RefreshSucceeded
            } else {
                AuthMachineInput::RefreshFailed
            };
            if let Err(e) = self.transition(&input) {
                warn!(error = %e, "Could not record refresh outcome");
            }
        }
        refreshed
    }

    /// Force a logout whenever the API client reports an unrecoverable 401.
    pub fn spawn_invalidation_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut signals = self.api.subscribe_session_signals();
        let session = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match signals.recv().await {
                    Ok(SessionSignal::Invalidated) => {
                        let Some(session) = session.upgrade() else {
                            break;
                        };
                        session.force_logout();
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Session signals lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn set_user(&self, user: Option<User>, is_authenticated: bool) {
        *self.user.write() = user.clone();
        let summary = SessionSummary {
            user,
            is_authenticated,
        };
        if let Err(e) = self.tokens().save_json(StorageKeys::SESSION_SUMMARY, &summary) {
            warn!(error = %e, "Failed to persist session summary");
        }
    }

    fn clear_local(&self) {
        *self.user.write() = None;
        if let Err(e) = self.tokens().remove(StorageKeys::SESSION_SUMMARY) {
            warn!(error = %e, "Failed to remove session summary");
        }
    }
}

fn load_summary(tokens: &TokenStore) -> Option<SessionSummary> {
    match tokens.load_json(StorageKeys::SESSION_SUMMARY) {
        Ok(summary) => summary,
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable session summary");
            None
        }
    }
}

#[async_trait]
impl RefreshDriver for SessionManager {
    fn access_token(&self) -> Option<String> {
        self.tokens().access_token()
    }

    async fn refresh(&self) -> bool {
        SessionManager::refresh(self).await
    }

    async fn force_logout(&self) {
        SessionManager::force_logout(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use topup_storage::MemoryStorage;

    const USER_BODY: &str = r#"{"id":"u1","email":"ana@example.com","name":"Ana","role":"user"}"#;

    fn session(url: String) -> (Arc<SessionManager>, Arc<TokenStore>) {
        let tokens = Arc::new(TokenStore::new(Arc::new(MemoryStorage::new())));
        let api = Arc::new(ApiClient::new(url, tokens.clone()));
        (Arc::new(SessionManager::new(api)), tokens)
    }

    fn session_with(url: String, tokens: Arc<TokenStore>) -> Arc<SessionManager> {
        let api = Arc::new(ApiClient::new(url, tokens));
        Arc::new(SessionManager::new(api))
    }

    #[tokio::test]
    async fn test_login_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/login")
            .with_status(200)
            .with_body(format!(
                r#"{{"success":true,"data":{{"access_token":"a1","refresh_token":"r1","user":{USER_BODY}}}}}"#
            ))
            .create_async()
            .await;

        let (session, tokens) = session(server.url());
        let authenticated = session.authenticated();
        let user = session.login("ana@example.com", "secret").await.unwrap();

        assert_eq!(user.id, "u1");
        assert_eq!(session.fsm_state(), AuthState::LoggedIn);
        assert!(*authenticated.borrow());
        assert_eq!(tokens.access_token(), Some("a1".to_string()));

        let summary: SessionSummary = tokens
            .load_json(StorageKeys::SESSION_SUMMARY)
            .unwrap()
            .unwrap();
        assert!(summary.is_authenticated);
        assert_eq!(summary.user.unwrap().email, "ana@example.com");
    }

    #[tokio::test]
    async fn test_login_failure_records_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/login")
            .with_status(401)
            .with_body(r#"{"success":false,"message":"Invalid email or password"}"#)
            .create_async()
            .await;

        let (session, _) = session(server.url());
        let result = session.login("ana@example.com", "wrong").await;

        assert!(matches!(result, Err(AuthError::Api(_))));
        assert_eq!(session.fsm_state(), AuthState::NotLoggedIn);
        assert_eq!(session.last_error().as_deref(), Some("Invalid email or password"));

        session.clear_error();
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn test_register_fetches_profile_when_user_missing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/register")
            .with_status(201)
            .with_body(r#"{"success":true,"data":{"access_token":"a1","refresh_token":"r1"}}"#)
            .create_async()
            .await;
        let profile = server
            .mock("GET", "/auth/profile")
            .match_header("authorization", "Bearer a1")
            .with_status(200)
            .with_body(format!(r#"{{"success":true,"data":{USER_BODY}}}"#))
            .create_async()
            .await;

        let (session, _) = session(server.url());
        let user = session
            .register(&RegisterRequest {
                email: "ana@example.com".into(),
                phone: "0812".into(),
                password: "secret".into(),
                full_name: "Ana".into(),
            })
            .await
            .unwrap();

        assert_eq!(user.name, "Ana");
        assert!(session.is_authenticated());
        profile.assert_async().await;
    }

    #[tokio::test]
    async fn test_check_auth_verifies_stored_session() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/profile")
            .with_status(200)
            .with_body(format!(r#"{{"success":true,"data":{USER_BODY}}}"#))
            .create_async()
            .await;

        let tokens = Arc::new(TokenStore::new(Arc::new(MemoryStorage::new())));
        tokens.store_tokens("a1", Some("r1")).unwrap();
        let session = session_with(server.url(), tokens);
        assert_eq!(session.fsm_state(), AuthState::PendingValidation);

        assert!(session.check_auth().await.unwrap());
        assert_eq!(session.fsm_state(), AuthState::LoggedIn);
        assert_eq!(session.user().unwrap().id, "u1");
    }

    #[tokio::test]
    async fn test_check_auth_rejection_drops_access_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/profile")
            .with_status(403)
            .with_body(r#"{"success":false,"message":"Account disabled"}"#)
            .create_async()
            .await;

        let tokens = Arc::new(TokenStore::new(Arc::new(MemoryStorage::new())));
        tokens.store_tokens("a1", Some("r1")).unwrap();
        let session = session_with(server.url(), tokens.clone());

        assert!(!session.check_auth().await.unwrap());
        assert_eq!(session.fsm_state(), AuthState::NotLoggedIn);
        assert_eq!(tokens.access_token(), None);
        assert!(session.user().is_none());
    }

    #[tokio::test]
    async fn test_check_auth_without_token() {
        let (session, _) = session("http://127.0.0.1:1".to_string());
        assert!(!session.check_auth().await.unwrap());
        assert_eq!(session.fsm_state(), AuthState::NotLoggedIn);
    }

    #[tokio::test]
    async fn test_rehydrates_user_from_summary() {
        let tokens = Arc::new(TokenStore::new(Arc::new(MemoryStorage::new())));
        tokens.store_tokens("a1", Some("r1")).unwrap();
        tokens
            .save_json(
                StorageKeys::SESSION_SUMMARY,
                &serde_json::json!({"user": serde_json::from_str::<serde_json::Value>(USER_BODY).unwrap(), "isAuthenticated": true}),
            )
            .unwrap();

        let session = session_with("http://127.0.0.1:1".to_string(), tokens);
        assert_eq!(session.user().unwrap().id, "u1");
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/login")
            .with_status(200)
            .with_body(format!(
                r#"{{"success":true,"data":{{"access_token":"a1","refresh_token":"r1","user":{USER_BODY}}}}}"#
            ))
            .create_async()
            .await;
        let logout = server
            .mock("POST", "/auth/logout")
            .with_status(200)
            .with_body(r#"{"success":true}"#)
            .expect(1)
            .create_async()
            .await;

        let (session, tokens) = session(server.url());
        session.login("ana@example.com", "secret").await.unwrap();

        session.logout().await.unwrap();
        session.logout().await.unwrap();

        assert_eq!(session.fsm_state(), AuthState::NotLoggedIn);
        assert_eq!(tokens.refresh_token(), None);
        assert!(session.user().is_none());
        logout.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_updates_token_and_state() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/login")
            .with_status(200)
            .with_body(format!(
                r#"{{"success":true,"data":{{"access_token":"a1","refresh_token":"r1","user":{USER_BODY}}}}}"#
            ))
            .create_async()
            .await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_body(r#"{"success":true,"data":{"access_token":"a2"}}"#)
            .create_async()
            .await;

        let (session, tokens) = session(server.url());
        session.login("ana@example.com", "secret").await.unwrap();

        let states = Arc::new(Mutex::new(Vec::new()));
        let seen = states.clone();
        session.set_state_callback(Box::new(move |payload| seen.lock().push(payload.state)));

        assert!(session.refresh().await);
        assert_eq!(tokens.access_token(), Some("a2".to_string()));
        assert_eq!(session.fsm_state(), AuthState::LoggedIn);
        assert_eq!(
            *states.lock(),
            vec![AuthState::Refreshing, AuthState::LoggedIn]
        );
    }

    #[tokio::test]
    async fn test_invalidation_signal_forces_logout() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/login")
            .with_status(200)
            .with_body(format!(
                r#"{{"success":true,"data":{{"access_token":"a1","user":{USER_BODY}}}}}"#
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/transactions")
            .with_status(401)
            .create_async()
            .await;

        let (session, tokens) = session(server.url());
        let listener = session.spawn_invalidation_listener();
        session.login("ana@example.com", "secret").await.unwrap();

        let mut authenticated = session.authenticated();
        assert!(*authenticated.borrow_and_update());

        // No refresh token, so the 401 cannot be recovered
        let response = session.api().transactions().await;
        assert!(!response.success);

        authenticated.changed().await.unwrap();
        assert!(!*authenticated.borrow());
        assert_eq!(session.fsm_state(), AuthState::NotLoggedIn);
        assert_eq!(tokens.access_token(), None);
        listener.abort();
    }

    #[tokio::test]
    async fn test_state_callback_sees_user() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/login")
            .with_status(200)
            .with_body(format!(
                r#"{{"success":true,"data":{{"access_token":"a1","user":{USER_BODY}}}}}"#
            ))
            .create_async()
            .await;

        let (session, _) = session(server.url());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        session.set_state_callback(Box::new(move |payload| {
            if payload.state == AuthState::LoggedIn {
                assert_eq!(payload.user_id.as_deref(), Some("u1"));
            }
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        session.login("ana@example.com", "secret").await.unwrap();
        // LoggingIn, then LoggedIn
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_profile_requires_token() {
        let (session, _) = session("http://127.0.0.1:1".to_string());
        assert!(session.fetch_profile().await.unwrap().is_none());
    }
}
