//! Storehouse cart synchronization.
//!
//! Keeps a shopper's cart coherent across an in-memory cache, durable
//! per-device storage and an optional per-user remote store:
//!
//! - Reads are served from the [`LocalCartCache`], falling back to the
//!   [`DeviceStore`].
//! - Writes commit to cache and device synchronously and push to the
//!   [`RemoteCartStore`] in the background.
//! - Sign-in and page activation reconcile the device copy with the remote
//!   copy through a pluggable [`ReconcilePolicy`], using the last synced
//!   cart ([`BaselineStore`]) as the common ancestor.
//! - Storage events from other contexts invalidate the cache.
//!
//! No operation surfaces an error to the caller: every remote or device
//! failure degrades to the best cart available and is reported through the
//! configured [`FailureHook`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use storehouse_cart::{CartSynchronizer, MemoryDeviceStore};
//! use storehouse_core::ProductId;
//!
//! let sync = CartSynchronizer::builder(Arc::new(MemoryDeviceStore::new())).build();
//! sync.add_to_cart(ProductId::new("pineapple-chips"), 1);
//! assert_eq!(sync.cart_count(), 1);
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod baseline;
pub mod cache;
pub mod config;
pub mod device;
pub mod identity;
pub mod reconcile;
pub mod remote;
pub mod sync;
pub mod tasks;

pub use baseline::{BaselineStore, SyncBaseline};
pub use cache::LocalCartCache;
pub use config::{CartSyncConfig, ConfigError};
pub use device::{
    DeviceStore, DeviceStoreError, FileDeviceStore, MemoryDeviceStore, StorageEvent, StorageEvents,
};
pub use identity::{CurrentUser, IdentityProvider, SessionIdentity};
pub use reconcile::{AdditiveMerge, LastWriterWins, PolicyKind, ReconcilePolicy};
pub use remote::{
    MemoryProvisioner, MemoryRemoteCartStore, PgProvisioner, PgRemoteCartStore, Provisioner,
    RemoteCartRecord, RemoteCartStore, RemoteError,
};
pub use sync::{CartSynchronizer, CartSynchronizerBuilder, DEFAULT_STORAGE_KEY};
pub use tasks::{FailureHook, SyncFailure, SyncOperation};
