//! Realtime notification channel for the top-up storefront.
//!
//! This crate provides:
//! - A WebSocket connection keyed by the current access token
//! - Automatic reconnection after abnormal closes
//! - Per-user channel subscription
//! - Typed inbound messages

mod client;
mod connection;
mod error;
mod messages;

pub use client::{ChannelClient, ChannelConfig, ChannelEvent, ConnectionState};
pub use connection::{Connector, Outbound, SocketEvent, SocketHandle, TungsteniteConnector};
pub use error::{RealtimeError, RealtimeResult};
pub use messages::{
    IncomingMessage, NoticeLevel, OutboundMessage, RealtimeMessage, SystemNotice,
    TransactionEvent,
};
