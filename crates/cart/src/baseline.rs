//! Last synced cart per device.
//!
//! Records the cart the device and the remote store last agreed on, and for
//! which user. Reconciliation uses it as the common ancestor so that only
//! edits made since that point are merged; reconciling twice without edits
//! leaves the cart unchanged.
//!
//! Stored in the device store next to the cart, under `<cart key>.synced`.
//! If the device store is unusable the baseline lives in memory instead.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use storehouse_core::{Cart, UserId};

use crate::device::DeviceStore;

const KEY_SUFFIX: &str = ".synced";

/// Cart both copies held after the last successful sync with `user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBaseline {
    pub user: UserId,
    pub cart: Cart,
}

/// Device-store backed [`SyncBaseline`] slot.
pub struct BaselineStore {
    key: String,
    device: Arc<dyn DeviceStore>,
    fallback: Mutex<Option<SyncBaseline>>,
}

impl BaselineStore {
    /// Baseline slot for the cart stored under `cart_key`.
    #[must_use]
    pub fn new(device: Arc<dyn DeviceStore>, cart_key: &str) -> Self {
        Self {
            key: format!("{cart_key}{KEY_SUFFIX}"),
            device,
            fallback: Mutex::new(None),
        }
    }

    /// Device-store key of the baseline payload.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The baseline cart, if the device was last synced with `user`.
    pub fn for_user(&self, user: &UserId) -> Option<Cart> {
        let stored = match self.device.get(&self.key) {
            Ok(Some(payload)) => serde_json::from_str::<SyncBaseline>(&payload)
                .map_err(|e| warn!(key = %self.key, error = %e, "Discarding malformed sync baseline"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                debug!(key = %self.key, error = %e, "Device store unreadable, using in-memory baseline");
                self.fallback().clone()
            }
        };
        stored
            .filter(|baseline| &baseline.user == user)
            .map(|baseline| baseline.cart)
    }

    /// Record `cart` as synced with `user`.
    pub fn record(&self, user: &UserId, cart: &Cart) {
        let baseline = SyncBaseline {
            user: user.clone(),
            cart: cart.clone(),
        };
        let persisted = serde_json::to_string(&baseline)
            .map_err(|e| e.to_string())
            .and_then(|payload| {
                self.device
                    .set(&self.key, &payload)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = persisted {
            debug!(key = %self.key, error = %e, "Sync baseline kept in memory only");
        }
        *self.fallback() = Some(baseline);
    }

    fn fallback(&self) -> MutexGuard<'_, Option<SyncBaseline>> {
        self.fallback.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
