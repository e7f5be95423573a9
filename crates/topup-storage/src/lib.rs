//! Durable client-side storage for the top-up client.
//!
//! This crate provides:
//! - the [`KeyValueStorage`] port and two adapters: [`MemoryStorage`] for
//!   tests and [`FileStorage`], a write-through JSON file
//! - [`TokenStore`], the only owner of the access and refresh tokens
//! - fixed storage keys shared by every component ([`StorageKeys`])

mod file;
mod keys;
mod memory;
mod tokens;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use tokens::TokenStore;
pub use traits::KeyValueStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Stored blob could not be encoded or decoded
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
