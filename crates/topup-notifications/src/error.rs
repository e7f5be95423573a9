use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Storage error: {0}")]
    Storage(#[from] topup_storage::StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type NotificationResult<T> = Result<T, NotificationError>;
