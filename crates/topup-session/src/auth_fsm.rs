//! Session lifecycle of the storefront client as a `rust-fsm` machine.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐  SessionDetected   ┌───────────────────┐
//! │   NotLoggedIn   │ ─────────────────► │ PendingValidation │
//! └────────┬────────┘                    └─────────┬─────────┘
//!          │ LoginAttempt                          │ ValidateSession
//!          ▼                                       ▼
//! ┌─────────────────┐                    ┌───────────────────┐
//! │    LoggingIn    │                    │    Validating     │
//! └────────┬────────┘                    └─────────┬─────────┘
//!          │ LoginSuccess                          │ ServerVerified
//!          ▼                                       ▼
//! ┌─────────────────┐  RefreshStarted    ┌───────────────────┐
//! │    LoggedIn     │ ─────────────────► │    Refreshing     │
//! │                 │ ◄───────────────── │                   │
//! └────────┬────────┘  RefreshSucceeded  └───────────────────┘
//!          │           / RefreshFailed
//!          │ LogoutRequested
//!          ▼
//! ┌─────────────────┐
//! │   LoggingOut    │ ── LogoutComplete ──► NotLoggedIn
//! └─────────────────┘
//! ```
//!
//! `SessionInvalidated` drops any authenticated state straight back to
//! `NotLoggedIn`.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(NotLoggedIn)

    NotLoggedIn => {
        SessionDetected => PendingValidation,
        LoginAttempt => LoggingIn,
        ValidateSession => Validating
    },
    PendingValidation => {
        ValidateSession => Validating,
        LoginAttempt => LoggingIn,
        NoSession => NotLoggedIn,
        SessionInvalidated => NotLoggedIn
    },
    Validating => {
        ServerVerified => LoggedIn,
        ServerRejected => NotLoggedIn,
        NoSession => NotLoggedIn
    },
    LoggingIn => {
        LoginSuccess => LoggedIn,
        LoginFailed => NotLoggedIn
    },
    LoggedIn => {
        RefreshStarted => Refreshing,
        LogoutRequested => LoggingOut,
        SessionInvalidated => NotLoggedIn
    },
    Refreshing => {
        RefreshSucceeded => LoggedIn,
        // The scheduler decides whether a failed refresh ends the session
        RefreshFailed => LoggedIn,
        SessionInvalidated => NotLoggedIn,
        LogoutRequested => LoggingOut
    },
    LoggingOut => {
        LogoutComplete => NotLoggedIn
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// Simplified view of the FSM state for callers and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// Not logged in.
    NotLoggedIn,
    /// A token was found in storage; the server has not confirmed it yet.
    PendingValidation,
    /// Checking the stored session against the server.
    Validating,
    /// Currently logging in or registering.
    LoggingIn,
    /// Logged in with a usable session.
    LoggedIn,
    /// Logged in, access token being renewed.
    Refreshing,
    /// Revoking the refresh token with the server.
    LoggingOut,
}

impl AuthState {
    /// A refresh in progress does not interrupt the session.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::LoggedIn | AuthState::Refreshing)
    }

    /// Waiting on the server or on a local step to finish.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthState::PendingValidation
                | AuthState::Validating
                | AuthState::LoggingIn
                | AuthState::Refreshing
                | AuthState::LoggingOut
        )
    }
}

impl From<&AuthMachineState> for AuthState {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::NotLoggedIn => AuthState::NotLoggedIn,
            AuthMachineState::PendingValidation => AuthState::PendingValidation,
            AuthMachineState::Validating => AuthState::Validating,
            AuthMachineState::LoggingIn => AuthState::LoggingIn,
            AuthMachineState::LoggedIn => AuthState::LoggedIn,
            AuthMachineState::Refreshing => AuthState::Refreshing,
            AuthMachineState::LoggingOut => AuthState::LoggingOut,
        }
    }
}

/// Delivered to the state-change callback after every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStateChangedPayload {
    pub state: AuthState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}
