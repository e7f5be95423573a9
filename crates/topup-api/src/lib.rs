//! REST client for the top-up storefront.
//!
//! This crate provides:
//! - [`ApiClient`]: bearer-token injection, response normalization into
//!   [`ApiResponse`], and transparent refresh-and-retry on `401`
//! - [`RefreshCoordinator`]: single-flight token refresh shared by every
//!   caller in the process
//! - the full endpoint catalogue (auth, catalog, transactions, payment,
//!   uploads, admin)

mod admin;
mod auth;
mod catalog;
mod client;
mod commerce;
mod envelope;
mod error;
mod refresh;
mod request;

pub use client::{ApiClient, SessionSignal, UnauthorizedHandler};
pub use envelope::{codes, ApiResponse, SESSION_EXPIRED_MESSAGE};
pub use error::{ApiError, ApiResult};
pub use refresh::{
    HttpTokenRefresher, RefreshCoordinator, RefreshOutcome, RefreshedTokens, TokenRefresher,
};
pub use request::{paths, ApiRequest, MultipartForm, RequestBody};
