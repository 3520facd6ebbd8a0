//! Device store: durable, synchronous key-value storage scoped to one device.
//!
//! The device store is the fast path for every cart read and the first
//! commit target for every cart write. Two adapters are provided:
//!
//! - [`MemoryDeviceStore`] - an in-process origin shared by several
//!   contexts (tabs), broadcasting [`StorageEvent`]s to the other contexts
//!   on every write
//! - [`FileDeviceStore`] - one file per key under a directory, used by the
//!   CLI

mod file;
mod memory;

pub use file::FileDeviceStore;
pub use memory::{MemoryDeviceStore, StorageEvents};

use thiserror::Error;

/// Errors raised by a device store.
#[derive(Debug, Error)]
pub enum DeviceStoreError {
    /// Filesystem operation failed.
    #[error("device store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage is disabled or otherwise unusable.
    #[error("device store unavailable: {0}")]
    Unavailable(String),
}

/// Synchronous key-value storage scoped to one device.
///
/// Mirrors the browser `localStorage` contract: string keys, string values,
/// no suspension points.
pub trait DeviceStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, DeviceStoreError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), DeviceStoreError>;

    /// Delete the value stored under `key`. Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn remove(&self, key: &str) -> Result<(), DeviceStoreError>;
}

/// Notification that another context changed the shared device store.
///
/// `key` is `None` when the whole store was cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: Option<String>,
}

impl StorageEvent {
    /// Whether this event may have changed the value under `key`.
    #[must_use]
    pub fn affects(&self, key: &str) -> bool {
        self.key.as_deref().is_none_or(|changed| changed == key)
    }
}
