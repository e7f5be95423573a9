//! Session lifecycle for the top-up storefront client.
//!
//! This crate provides:
//! - Unverified access token claim decoding, used only for scheduling
//! - An explicit FSM for authentication state
//! - [`SessionManager`]: login, registration, logout and startup validation
//! - [`TokenRefreshScheduler`]: periodic proactive refresh and forced logout

mod auth_fsm;
mod claims;
mod error;
mod scheduler;
mod session;

pub use auth_fsm::auth_machine;
pub use auth_fsm::{
    AuthMachine, AuthMachineInput, AuthMachineState, AuthState, AuthStateChangedPayload,
};
pub use claims::{decode_claims, now_millis, DecodedClaims};
pub use error::{AuthError, AuthResult};
pub use scheduler::{RefreshDriver, SchedulerConfig, TickOutcome, TokenRefreshScheduler};
pub use session::{AuthStateCallback, SessionManager, SessionSummary};
