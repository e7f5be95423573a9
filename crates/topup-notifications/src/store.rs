//! Capped notification list persisted under `notification-storage`.

use crate::NotificationResult;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use topup_storage::{KeyValueStorage, StorageKeys};
use topup_types::{Transaction, TransactionStatus};
use tracing::{debug, warn};
use uuid::Uuid;

/// Notifications kept in memory; older entries are evicted.
pub const MAX_NOTIFICATIONS: usize = 50;

/// Notifications written to storage.
pub const PERSISTED_NOTIFICATIONS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Transaction,
    System,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub read: bool,
    pub created_at: String,
}

/// Content of a notification before the store assigns its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: Option<Value>,
}

/// Which transaction event a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionChange {
    Created,
    Updated,
}

/// Display label of a transaction status.
pub fn status_label(status: TransactionStatus) -> &'static str {
    match status {
        TransactionStatus::Pending => "Menunggu Pembayaran",
        TransactionStatus::Processing => "Diproses",
        TransactionStatus::Success => "Berhasil",
        TransactionStatus::Failed => "Gagal",
        TransactionStatus::Expired => "Kadaluarsa",
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationState {
    notifications: Vec<Notification>,
    unread_count: usize,
}

#[derive(Serialize, Deserialize)]
struct PersistedBlob {
    state: NotificationState,
    #[serde(default)]
    version: u32,
}

pub struct NotificationStore {
    storage: Arc<dyn KeyValueStorage>,
    state: Mutex<NotificationState>,
}

impl NotificationStore {
    /// Load the persisted list. An unreadable blob starts an empty list.
    pub fn open(storage: Arc<dyn KeyValueStorage>) -> NotificationResult<Self> {
        let mut state = match storage.get(StorageKeys::NOTIFICATIONS)? {
            Some(raw) => match serde_json::from_str::<PersistedBlob>(&raw) {
                Ok(blob) => blob.state,
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable notification storage");
                    NotificationState::default()
                }
            },
            None => NotificationState::default(),
        };
        state.unread_count = count_unread(&state.notifications);

        Ok(Self {
            storage,
            state: Mutex::new(state),
        })
    }

    /// Newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.state.lock().notifications.clone()
    }

    pub fn unread_count(&self) -> usize {
        self.state.lock().unread_count
    }

    pub fn add(&self, draft: NotificationDraft) -> NotificationResult<Notification> {
        let notification = Notification {
            id: format!("notif-{}", Uuid::new_v4()),
            kind: draft.kind,
            title: draft.title,
            message: draft.message,
            data: draft.data,
            read: false,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let mut state = self.state.lock();
        state.notifications.insert(0, notification.clone());
        state.notifications.truncate(MAX_NOTIFICATIONS);
        state.unread_count = count_unread(&state.notifications);
        debug!(id = %notification.id, kind = ?notification.kind, "Notification added");
        self.persist(&state)?;
        Ok(notification)
    }

    pub fn add_transaction_notification(
        &self,
        transaction: &Transaction,
        change: TransactionChange,
    ) -> NotificationResult<Notification> {
        let label = status_label(transaction.status);
        let (title, message) = match change {
            TransactionChange::Created => (
                "Transaksi Baru",
                format!(
                    "Transaksi #{} telah dibuat. Status: {label}",
                    transaction.invoice_number
                ),
            ),
            TransactionChange::Updated => (
                "Update Transaksi",
                format!(
                    "Transaksi #{} diperbarui ke status: {label}",
                    transaction.invoice_number
                ),
            ),
        };

        self.add(NotificationDraft {
            kind: NotificationKind::Transaction,
            title: title.to_string(),
            message,
            data: serde_json::to_value(transaction).ok(),
        })
    }

    /// Returns false when the id is unknown or already read.
    pub fn mark_as_read(&self, id: &str) -> NotificationResult<bool> {
        let mut state = self.state.lock();
        let Some(notification) = state
            .notifications
            .iter_mut()
            .find(|notification| notification.id == id && !notification.read)
        else {
            return Ok(false);
        };
        notification.read = true;
        state.unread_count = state.unread_count.saturating_sub(1);
        self.persist(&state)?;
        Ok(true)
    }

    pub fn mark_all_as_read(&self) -> NotificationResult<()> {
        let mut state = self.state.lock();
        for notification in &mut state.notifications {
            notification.read = true;
        }
        state.unread_count = 0;
        self.persist(&state)
    }

    /// Returns whether a notification was removed.
    pub fn remove(&self, id: &str) -> NotificationResult<bool> {
        let mut state = self.state.lock();
        let Some(index) = state
            .notifications
            .iter()
            .position(|notification| notification.id == id)
        else {
            return Ok(false);
        };
        let removed = state.notifications.remove(index);
        if !removed.read {
            state.unread_count = state.unread_count.saturating_sub(1);
        }
        self.persist(&state)?;
        Ok(true)
    }

    pub fn clear_all(&self) -> NotificationResult<()> {
        let mut state = self.state.lock();
        state.notifications.clear();
        state.unread_count = 0;
        self.persist(&state)
    }

    fn persist(&self, state: &NotificationState) -> NotificationResult<()> {
        let notifications: Vec<Notification> = state
            .notifications
            .iter()
            .take(PERSISTED_NOTIFICATIONS)
            .cloned()
            .collect();
        let blob = PersistedBlob {
            state: NotificationState {
                unread_count: count_unread(&notifications),
                notifications,
            },
            version: 0,
        };
        self.storage
            .set(StorageKeys::NOTIFICATIONS, &serde_json::to_string(&blob)?)?;
        Ok(())
    }
}

/// The unread count always matches the list it describes.
fn count_unread(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.read).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use topup_storage::MemoryStorage;

    fn draft(title: &str) -> NotificationDraft {
        NotificationDraft {
            kind: NotificationKind::Info,
            title: title.into(),
            message: "body".into(),
            data: None,
        }
    }

    fn transaction(status: &str) -> Transaction {
        serde_json::from_value(json!({
            "id": "t1",
            "invoice_number": "INV-001",
            "amount": 10000.0,
            "total_amount": 11000.0,
            "status": status,
        }))
        .unwrap()
    }

    fn store() -> (NotificationStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (NotificationStore::open(storage.clone()).unwrap(), storage)
    }

    #[test]
    fn test_add_is_newest_first_and_unread() {
        let (store, _) = store();
        store.add(draft("first")).unwrap();
        let second = store.add(draft("second")).unwrap();

        let list = store.notifications();
        assert_eq!(list[0].id, second.id);
        assert_eq!(list[1].title, "first");
        assert!(list.iter().all(|n| !n.read));
        assert!(second.id.starts_with("notif-"));
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn test_capped_in_memory_and_persisted() {
        let (store, storage) = store();
        for i in 0..60 {
            store.add(draft(&format!("n{i}"))).unwrap();
        }
        let list = store.notifications();
        assert_eq!(list.len(), MAX_NOTIFICATIONS);
        assert_eq!(list[0].title, "n59");
        assert_eq!(store.unread_count(), MAX_NOTIFICATIONS);

        let raw = storage.get(StorageKeys::NOTIFICATIONS).unwrap().unwrap();
        let blob: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            blob["state"]["notifications"].as_array().unwrap().len(),
            PERSISTED_NOTIFICATIONS
        );
        assert_eq!(blob["state"]["unreadCount"], PERSISTED_NOTIFICATIONS);
        assert_eq!(blob["state"]["notifications"][0]["type"], "info");
        assert!(blob["state"]["notifications"][0]["createdAt"].is_string());
    }

    #[test]
    fn test_reopen_restores_persisted_list() {
        let (store, storage) = store();
        let added = store.add(draft("kept")).unwrap();

        let reopened = NotificationStore::open(storage).unwrap();
        assert_eq!(reopened.notifications(), vec![added]);
        assert_eq!(reopened.unread_count(), 1);
    }

    #[test]
    fn test_evicted_unread_entries_leave_the_count() {
        let (store, storage) = store();
        for i in 0..60 {
            store.add(draft(&format!("n{i}"))).unwrap();
        }
        let first = store.notifications()[0].id.clone();
        store.mark_as_read(&first).unwrap();
        assert_eq!(store.unread_count(), MAX_NOTIFICATIONS - 1);

        let reopened = NotificationStore::open(storage).unwrap();
        assert_eq!(reopened.unread_count(), PERSISTED_NOTIFICATIONS - 1);
        for notification in reopened.notifications() {
            reopened.mark_as_read(&notification.id).unwrap();
        }
        assert_eq!(reopened.unread_count(), 0);
    }

    #[test]
    fn test_blob_with_stale_count_is_recounted() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set(
                StorageKeys::NOTIFICATIONS,
                r#"{"state":{"notifications":[{"id":"notif-1","type":"info","title":"t","message":"m","read":false,"createdAt":"2026-01-01T00:00:00.000Z"}],"unreadCount":7},"version":0}"#,
            )
            .unwrap();
        let store = NotificationStore::open(storage).unwrap();
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_corrupt_blob_starts_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(StorageKeys::NOTIFICATIONS, "{broken").unwrap();
        let store = NotificationStore::open(storage).unwrap();
        assert!(store.notifications().is_empty());
    }

    #[test]
    fn test_mark_as_read_counts_once() {
        let (store, _) = store();
        let a = store.add(draft("a")).unwrap();
        store.add(draft("b")).unwrap();

        assert!(store.mark_as_read(&a.id).unwrap());
        assert!(!store.mark_as_read(&a.id).unwrap());
        assert!(!store.mark_as_read("missing").unwrap());
        assert_eq!(store.unread_count(), 1);

        store.mark_all_as_read().unwrap();
        assert_eq!(store.unread_count(), 0);
        assert!(store.notifications().iter().all(|n| n.read));
    }

    #[test]
    fn test_remove_adjusts_unread() {
        let (store, _) = store();
        let a = store.add(draft("a")).unwrap();
        let b = store.add(draft("b")).unwrap();
        store.mark_as_read(&b.id).unwrap();

        assert!(store.remove(&b.id).unwrap());
        assert_eq!(store.unread_count(), 1);
        assert!(store.remove(&a.id).unwrap());
        assert_eq!(store.unread_count(), 0);
        assert!(!store.remove(&a.id).unwrap());
    }

    #[test]
    fn test_clear_all() {
        let (store, storage) = store();
        store.add(draft("a")).unwrap();
        store.clear_all().unwrap();
        assert!(store.notifications().is_empty());
        assert_eq!(store.unread_count(), 0);

        let reopened = NotificationStore::open(storage).unwrap();
        assert!(reopened.notifications().is_empty());
    }

    #[test]
    fn test_transaction_notification_text() {
        let (store, _) = store();
        let created = store
            .add_transaction_notification(&transaction("pending"), TransactionChange::Created)
            .unwrap();
        assert_eq!(created.kind, NotificationKind::Transaction);
        assert_eq!(created.title, "Transaksi Baru");
        assert_eq!(
            created.message,
            "Transaksi #INV-001 telah dibuat. Status: Menunggu Pembayaran"
        );
        assert_eq!(created.data.unwrap()["invoice_number"], "INV-001");

        let updated = store
            .add_transaction_notification(&transaction("expired"), TransactionChange::Updated)
            .unwrap();
        assert_eq!(updated.title, "Update Transaksi");
        assert_eq!(
            updated.message,
            "Transaksi #INV-001 diperbarui ke status: Kadaluarsa"
        );
    }
}
