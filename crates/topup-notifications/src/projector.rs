//! Projection of realtime messages into notifications and toasts.

use crate::store::{NotificationDraft, NotificationKind, NotificationStore, TransactionChange};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use topup_realtime::{ChannelEvent, NoticeLevel, RealtimeMessage, TransactionEvent};
use topup_types::TransactionStatus;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Transient alert shown next to the stored notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub title: String,
    pub description: String,
}

impl Toast {
    fn new(level: ToastLevel, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            description: description.into(),
        }
    }
}

pub struct NotificationProjector {
    store: Arc<NotificationStore>,
}

impl NotificationProjector {
    pub fn new(store: Arc<NotificationStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    /// Record a notification for `message` and return the toast to show.
    ///
    /// Unknown message types produce neither.
    pub fn project(&self, message: &RealtimeMessage) -> Option<Toast> {
        match message {
            RealtimeMessage::TransactionCreated(event) => {
                self.record_transaction(event, TransactionChange::Created);
                Some(Toast::new(
                    ToastLevel::Info,
                    "Transaksi Baru",
                    format!(
                        "Transaksi #{} telah dibuat",
                        event.transaction.invoice_number
                    ),
                ))
            }
            RealtimeMessage::TransactionUpdated(event)
            | RealtimeMessage::TransactionStatusChanged(event) => {
                self.record_transaction(event, TransactionChange::Updated);
                Some(status_toast(event))
            }
            RealtimeMessage::SystemNotification(notice) => {
                let (kind, level) = match notice.level {
                    NoticeLevel::Info => (NotificationKind::Info, ToastLevel::Info),
                    NoticeLevel::Warning => (NotificationKind::Warning, ToastLevel::Warning),
                    NoticeLevel::Error => (NotificationKind::Error, ToastLevel::Error),
                };
                let draft = NotificationDraft {
                    kind,
                    title: notice.title.clone(),
                    message: notice.message.clone(),
                    data: None,
                };
                if let Err(e) = self.store.add(draft) {
                    warn!(error = %e, "Failed to store system notification");
                }
                Some(Toast::new(level, &notice.title, &notice.message))
            }
            RealtimeMessage::Unknown { kind, .. } => {
                debug!(kind = %kind, "Ignoring unknown realtime message type");
                None
            }
        }
    }

    /// Project every channel message until the channel closes or the
    /// toast receiver is dropped.
    pub async fn run(
        &self,
        mut events: broadcast::Receiver<ChannelEvent>,
        toasts: mpsc::UnboundedSender<Toast>,
    ) {
        loop {
            match events.recv().await {
                Ok(ChannelEvent::Message(message)) => {
                    if let Some(toast) = self.project(&message.payload) {
                        if toasts.send(toast).is_err() {
                            debug!("Toast receiver dropped, stopping projector");
                            break;
                        }
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification projector lagged behind channel events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Channel closed, stopping projector");
                    break;
                }
            }
        }
    }

    fn record_transaction(&self, event: &TransactionEvent, change: TransactionChange) {
        if let Err(e) = self
            .store
            .add_transaction_notification(&event.transaction, change)
        {
            warn!(
                error = %e,
                invoice = %event.transaction.invoice_number,
                "Failed to store transaction notification"
            );
        }
    }
}

fn status_toast(event: &TransactionEvent) -> Toast {
    let invoice = &event.transaction.invoice_number;
    match event.transaction.status {
        TransactionStatus::Success => Toast::new(
            ToastLevel::Success,
            "Transaksi Berhasil",
            format!("Transaksi #{invoice} berhasil diproses"),
        ),
        TransactionStatus::Failed => Toast::new(
            ToastLevel::Error,
            "Transaksi Gagal",
            format!("Transaksi #{invoice} gagal diproses"),
        ),
        TransactionStatus::Expired => Toast::new(
            ToastLevel::Error,
            "Transaksi Kadaluarsa",
            format!("Transaksi #{invoice} telah kadaluarsa"),
        ),
        TransactionStatus::Processing => Toast::new(
            ToastLevel::Info,
            "Transaksi Diproses",
            format!("Transaksi #{invoice} sedang diproses"),
        ),
        TransactionStatus::Pending => Toast::new(
            ToastLevel::Info,
            "Update Transaksi",
            format!("Transaksi #{invoice} sedang diproses"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NotificationKind;
    use serde_json::json;
    use topup_realtime::{IncomingMessage, SystemNotice};
    use topup_storage::MemoryStorage;

    fn projector() -> NotificationProjector {
        let store = NotificationStore::open(Arc::new(MemoryStorage::new())).unwrap();
        NotificationProjector::new(Arc::new(store))
    }

    fn transaction_frame(kind: &str, status: &str) -> RealtimeMessage {
        let frame = json!({
            "type": kind,
            "data": {
                "transaction": {
                    "id": "t1",
                    "invoice_number": "INV-9",
                    "amount": 5000.0,
                    "total_amount": 5500.0,
                    "status": status,
                },
                "previousStatus": "pending",
            },
        });
        IncomingMessage::parse(&frame.to_string()).unwrap().payload
    }

    #[test]
    fn test_transaction_created() {
        let projector = projector();
        let toast = projector
            .project(&transaction_frame("transaction_created", "pending"))
            .unwrap();
        assert_eq!(toast.level, ToastLevel::Info);
        assert_eq!(toast.title, "Transaksi Baru");
        assert_eq!(toast.description, "Transaksi #INV-9 telah dibuat");

        let stored = projector.store().notifications();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].kind, NotificationKind::Transaction);
    }

    #[test]
    fn test_status_toasts() {
        let projector = projector();
        let cases = [
            ("success", ToastLevel::Success, "Transaksi Berhasil"),
            ("failed", ToastLevel::Error, "Transaksi Gagal"),
            ("expired", ToastLevel::Error, "Transaksi Kadaluarsa"),
            ("processing", ToastLevel::Info, "Transaksi Diproses"),
            ("pending", ToastLevel::Info, "Update Transaksi"),
        ];
        for (status, level, title) in cases {
            let toast = projector
                .project(&transaction_frame("transaction_status_changed", status))
                .unwrap();
            assert_eq!(toast.level, level, "{status}");
            assert_eq!(toast.title, title, "{status}");
        }

        let toast = projector
            .project(&transaction_frame("transaction_updated", "expired"))
            .unwrap();
        assert_eq!(toast.description, "Transaksi #INV-9 telah kadaluarsa");
        assert_eq!(projector.store().unread_count(), 6);
    }

    #[test]
    fn test_system_notification_levels() {
        let projector = projector();
        let toast = projector
            .project(&RealtimeMessage::SystemNotification(SystemNotice {
                title: "Maintenance".into(),
                message: "Tonight".into(),
                level: NoticeLevel::Warning,
            }))
            .unwrap();
        assert_eq!(toast.level, ToastLevel::Warning);
        assert_eq!(toast.description, "Tonight");

        let stored = projector.store().notifications();
        assert_eq!(stored[0].kind, NotificationKind::Warning);
        assert_eq!(stored[0].title, "Maintenance");
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let projector = projector();
        let message = RealtimeMessage::Unknown {
            kind: "promo".into(),
            data: json!({}),
        };
        assert!(projector.project(&message).is_none());
        assert!(projector.store().notifications().is_empty());
    }

    #[tokio::test]
    async fn test_run_forwards_toasts_until_channel_closes() {
        let projector = projector();
        let (events_tx, events_rx) = broadcast::channel(16);
        let (toasts_tx, mut toasts_rx) = mpsc::unbounded_channel();

        events_tx
            .send(ChannelEvent::Connected)
            .unwrap();
        events_tx
            .send(ChannelEvent::Message(IncomingMessage {
                timestamp: None,
                payload: transaction_frame("transaction_status_changed", "success"),
            }))
            .unwrap();
        drop(events_tx);

        projector.run(events_rx, toasts_tx).await;

        let toast = toasts_rx.recv().await.unwrap();
        assert_eq!(toast.title, "Transaksi Berhasil");
        assert!(toasts_rx.recv().await.is_none());
    }
}
