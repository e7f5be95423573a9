//! Wire types of the top-up storefront REST API.
//!
//! Timestamps stay as the server-formatted strings; the client only
//! displays them.

mod auth;
mod catalog;
mod payment;
mod transaction;

pub use auth::{
    AuthPayload, LoginRequest, LogoutRequest, ProfileUpdate, RefreshRequest, RegisterRequest,
    User, UserRole,
};
pub use catalog::{Category, Game, GameInputField, InputFieldOption, Product};
pub use payment::{
    AdminStats, FeeCalculation, FeeCalculationRequest, PaymentChannel, PaymentChannelGroup,
    PaymentChannelUpdate,
};
pub use transaction::{
    CreateTransactionRequest, Transaction, TransactionStatus, TransactionStatusUpdate,
    TransactionStatusView, UploadedImage,
};

use serde::{Deserialize, Serialize};

/// Pagination block carried in the `meta` field of list responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub current_page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}
