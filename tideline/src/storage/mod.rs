//! Persistent key-value storage.
//!
//! The cache store and the offline action queue both survive restarts by
//! writing through a [`Storage`] backend. The interface is deliberately
//! minimal and domain-agnostic: string keys, raw byte values, no
//! serialization opinions. What a value means is the caller's business.
//!
//! # Design Principles
//!
//! - **String keys**: Human-readable for debugging, flexible for any domain
//! - **Vec<u8> values**: Raw bytes, callers bring their own encoding
//! - **Dyn-compatible**: Uses `Pin<Box<dyn Future>>` for trait object support
//! - **No enumeration**: Callers keep their own indexes; backends never need
//!   to list keys, which keeps hashed-filename layouts possible
//!
//! Two backends ship with the crate: [`MemoryStorage`] for tests and
//! ephemeral embedders, [`FileStorage`] for anything that should survive a
//! process restart.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error while touching the backing medium.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for crate::error::SyncError {
    fn from(e: StorageError) -> Self {
        crate::error::SyncError::Storage(e.to_string())
    }
}

/// Generic persistent key-value store.
///
/// Implementations must be `Send + Sync`; the runtime shares one backend
/// between the cache store and the action queue under different key
/// prefixes.
///
/// # Missing Keys
///
/// `get` on an absent key is `Ok(None)`, never an error. `delete` on an
/// absent key is `Ok(false)`.
pub trait Storage: Send + Sync {
    /// Store a value, replacing any previous value for the key.
    fn set(&self, key: &str, value: Vec<u8>) -> BoxFuture<'_, Result<(), StorageError>>;

    /// Retrieve a value by key.
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, StorageError>>;

    /// Delete a value by key, reporting whether it existed.
    fn delete(&self, key: &str) -> BoxFuture<'_, Result<bool, StorageError>>;
}
