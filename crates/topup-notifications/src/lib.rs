//! User-facing notifications projected from the realtime channel.
//!
//! [`NotificationStore`] keeps a capped, newest-first list that survives
//! restarts through the key-value storage. [`NotificationProjector`] turns
//! realtime messages into stored notifications plus a transient [`Toast`].

mod error;
mod projector;
mod store;

pub use error::{NotificationError, NotificationResult};
pub use projector::{NotificationProjector, Toast, ToastLevel};
pub use store::{
    status_label, Notification, NotificationDraft, NotificationKind, NotificationStore,
    TransactionChange, MAX_NOTIFICATIONS, PERSISTED_NOTIFICATIONS,
};
