//! Realtime protocol messages.
//!
//! Every frame is a JSON object `{type, data, timestamp}`. Inbound frames
//! are decoded into [`RealtimeMessage`] by their `type`; unrecognized types
//! are kept as [`RealtimeMessage::Unknown`] so callers can ignore them.

use crate::RealtimeResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use topup_types::{Transaction, TransactionStatus};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Payload of the transaction message types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub transaction: Transaction,
    #[serde(
        default,
        rename = "previousStatus",
        alias = "previous_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub previous_status: Option<TransactionStatus>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    #[default]
    Info,
    Warning,
    Error,
}

/// Broadcast announcement from the operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemNotice {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub level: NoticeLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeMessage {
    TransactionCreated(TransactionEvent),
    TransactionUpdated(TransactionEvent),
    TransactionStatusChanged(TransactionEvent),
    SystemNotification(SystemNotice),
    Unknown { kind: String, data: Value },
}

impl RealtimeMessage {
    /// Wire name of the message type.
    pub fn kind(&self) -> &str {
        match self {
            RealtimeMessage::TransactionCreated(_) => "transaction_created",
            RealtimeMessage::TransactionUpdated(_) => "transaction_updated",
            RealtimeMessage::TransactionStatusChanged(_) => "transaction_status_changed",
            RealtimeMessage::SystemNotification(_) => "system_notification",
            RealtimeMessage::Unknown { kind, .. } => kind,
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub timestamp: Option<String>,
    pub payload: RealtimeMessage,
}

impl IncomingMessage {
    pub fn parse(text: &str) -> RealtimeResult<Self> {
        let Envelope {
            kind,
            data,
            timestamp,
        } = serde_json::from_str(text)?;

        let payload = match kind.as_str() {
            "transaction_created" => RealtimeMessage::TransactionCreated(serde_json::from_value(data)?),
            "transaction_updated" => RealtimeMessage::TransactionUpdated(serde_json::from_value(data)?),
            "transaction_status_changed" => {
                RealtimeMessage::TransactionStatusChanged(serde_json::from_value(data)?)
            }
            "system_notification" => RealtimeMessage::SystemNotification(serde_json::from_value(data)?),
            _ => RealtimeMessage::Unknown { kind, data },
        };

        Ok(Self { timestamp, payload })
    }
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Subscribe { channel: String },
}

impl OutboundMessage {
    /// Subscription to the per-user channel `user:<id>`.
    pub fn subscribe_user(user_id: &str) -> Self {
        OutboundMessage::Subscribe {
            channel: format!("user:{user_id}"),
        }
    }
}
