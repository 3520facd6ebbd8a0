//! Local cart cache over the device store.
//!
//! Holds the decoded cart for one device-store key so repeated reads within
//! a page lifetime skip the device store. There is no expiry: the cache is
//! invalidated only by events (storage changes from other contexts, page
//! activation). Writes go through to the device store and refresh the cache
//! in place.
//!
//! When a device write fails, the cache keeps the cart in memory and stops
//! honouring invalidation, since the cached value is then the only copy. A
//! failed read loses nothing: it caches the empty cart but the next
//! invalidation retries the device store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use moka::sync::Cache;
use tracing::{debug, warn};

use storehouse_core::Cart;

use crate::device::DeviceStore;

/// Read-through, write-through cache of one cart.
pub struct LocalCartCache {
    key: String,
    device: Arc<dyn DeviceStore>,
    entries: Cache<String, Cart>,
    degraded: AtomicBool,
}

impl LocalCartCache {
    /// Create a cold cache for `key` in `device`.
    #[must_use]
    pub fn new(device: Arc<dyn DeviceStore>, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            device,
            entries: Cache::new(4),
            degraded: AtomicBool::new(false),
        }
    }

    /// Device-store key of the cart payload.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Return the cached cart, loading it from the device store when cold.
    ///
    /// Absent, empty and malformed payloads all load as the empty cart. A
    /// device-store failure also yields the empty cart.
    pub fn read(&self) -> Cart {
        if let Some(cart) = self.entries.get(&self.key) {
            debug!(key = %self.key, "Cart cache hit");
            return cart;
        }

        debug!(key = %self.key, "Cart cache miss, reading device store");
        let cart = match self.device.get(&self.key) {
            Ok(Some(payload)) => Cart::from_json(&payload).unwrap_or_else(|e| {
                warn!(key = %self.key, error = %e, "Discarding malformed device cart");
                Cart::new()
            }),
            Ok(None) => Cart::new(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Device store unreadable, using empty cart");
                Cart::new()
            }
        };

        self.entries.insert(self.key.clone(), cart.clone());
        cart
    }

    /// Persist `cart` to the device store and refresh the cache.
    ///
    /// The cache is updated even if the device write fails.
    pub fn write(&self, cart: &Cart) {
        let persisted = cart
            .to_json()
            .map_err(|e| e.to_string())
            .and_then(|payload| {
                self.device
                    .set(&self.key, &payload)
                    .map_err(|e| e.to_string())
            });

        match persisted {
            Ok(()) => self.degraded.store(false, Ordering::SeqCst),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Device store unwritable, keeping cart in memory");
                self.degraded.store(true, Ordering::SeqCst);
            }
        }

        self.entries.insert(self.key.clone(), cart.clone());
    }

    /// Drop the cached cart so the next read goes to the device store.
    ///
    /// Ignored while degraded.
    pub fn invalidate(&self) {
        if self.is_degraded() {
            debug!(key = %self.key, "Cache degraded, keeping in-memory cart");
            return;
        }
        self.entries.invalidate(&self.key);
    }

    /// Whether a cart is currently cached.
    #[must_use]
    pub fn is_warm(&self) -> bool {
        self.entries.contains_key(&self.key)
    }

    /// Whether a device write has failed and the cache holds the only copy.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }
}
