//! Remote cart store: per-user cart persistence reachable over the network.
//!
//! The remote copy is a replica reconciled opportunistically. It may be
//! unreachable at any time, and its backing table may not exist yet; the
//! latter is reported as [`RemoteError::TableMissing`] so the caller can run
//! a [`Provisioner`] and retry.
//!
//! Adapters:
//!
//! - [`PgRemoteCartStore`] - `PostgreSQL` table `cart_sync.user_cart`
//! - [`MemoryRemoteCartStore`] - in-process store with failure injection

mod memory;
mod postgres;

pub use memory::{MemoryProvisioner, MemoryRemoteCartStore};
pub use postgres::{PgProvisioner, PgRemoteCartStore, create_pool};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use storehouse_core::{Cart, CartParseError, UserId};

/// Errors raised by a remote cart store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The backing table does not exist (relation not found).
    #[error("remote cart table missing: {0}")]
    TableMissing(String),

    /// The store could not be reached or the query failed.
    #[error("remote cart store unavailable: {0}")]
    Unavailable(String),

    /// Provisioning the backing table failed.
    #[error("provisioning failed: {0}")]
    Provisioning(String),
}

impl RemoteError {
    /// Whether this error means the backing table is absent.
    #[must_use]
    pub const fn is_table_missing(&self) -> bool {
        matches!(self, Self::TableMissing(_))
    }
}

/// A user's row in the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCartRecord {
    /// Owner of the cart.
    pub user_id: UserId,
    /// Raw cart payload. `Null` when the row exists without cart data.
    pub cart_data: serde_json::Value,
    /// Last time the row was written.
    pub updated_at: DateTime<Utc>,
}

impl RemoteCartRecord {
    /// Decode the stored cart data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is null or not a cart object.
    pub fn cart(&self) -> Result<Cart, CartParseError> {
        Cart::try_from(self.cart_data.clone())
    }
}

/// Per-user cart persistence.
#[async_trait]
pub trait RemoteCartStore: Send + Sync {
    /// Check connectivity and that the backing table exists.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::TableMissing`] or [`RemoteError::Unavailable`].
    async fn probe(&self) -> Result<(), RemoteError>;

    /// Fetch the user's record, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    async fn fetch_by_user(&self, user: &UserId) -> Result<Option<RemoteCartRecord>, RemoteError>;

    /// Insert or replace the user's cart. At most one row exists per user.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    async fn upsert_by_user(&self, user: &UserId, cart: &Cart) -> Result<(), RemoteError>;
}

/// Idempotent provisioning of the remote store's backing table.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create whatever the remote store needs. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Provisioning`] if provisioning fails.
    async fn provision(&self) -> Result<(), RemoteError>;
}
