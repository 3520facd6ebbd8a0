//! In-process remote cart store with failure injection.
//!
//! Used by tests and local demos. The store can be taken offline, or start
//! without its backing table so that writes fail with
//! [`RemoteError::TableMissing`] until the paired [`MemoryProvisioner`]
//! runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use storehouse_core::{Cart, UserId};

use super::{Provisioner, RemoteCartRecord, RemoteCartStore, RemoteError};

/// In-memory [`RemoteCartStore`].
///
/// Cloning yields another handle on the same rows.
#[derive(Clone, Default)]
pub struct MemoryRemoteCartStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: Mutex<HashMap<UserId, RemoteCartRecord>>,
    offline: AtomicBool,
    table_missing: AtomicBool,
    fetches: AtomicUsize,
    upserts: AtomicUsize,
    provisions: AtomicUsize,
}

impl MemoryRemoteCartStore {
    /// Create an online store with its table present.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an online store whose table has not been provisioned.
    #[must_use]
    pub fn without_table() -> Self {
        let store = Self::new();
        store.inner.table_missing.store(true, Ordering::SeqCst);
        store
    }

    /// Make every call fail with [`RemoteError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Drop or restore the backing table.
    pub fn set_table_missing(&self, missing: bool) {
        self.inner.table_missing.store(missing, Ordering::SeqCst);
    }

    /// Store a raw payload for a user, bypassing failure injection.
    pub fn insert_raw(&self, user: &UserId, cart_data: serde_json::Value) {
        self.rows().insert(
            user.clone(),
            RemoteCartRecord {
                user_id: user.clone(),
                cart_data,
                updated_at: Utc::now(),
            },
        );
    }

    /// Store a cart for a user, bypassing failure injection.
    pub fn insert_cart(&self, user: &UserId, cart: &Cart) {
        self.insert_raw(user, serde_json::to_value(cart).unwrap_or_default());
    }

    /// The user's row, if any.
    #[must_use]
    pub fn record(&self, user: &UserId) -> Option<RemoteCartRecord> {
        self.rows().get(user).cloned()
    }

    /// The user's decoded cart, if the row exists and decodes.
    #[must_use]
    pub fn cart_for(&self, user: &UserId) -> Option<Cart> {
        self.record(user).and_then(|r| r.cart().ok())
    }

    /// Number of fetch calls received, including failed ones.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    /// Number of upsert calls received, including failed ones.
    #[must_use]
    pub fn upsert_count(&self) -> usize {
        self.inner.upserts.load(Ordering::SeqCst)
    }

    /// Number of times the paired provisioner ran.
    #[must_use]
    pub fn provision_count(&self) -> usize {
        self.inner.provisions.load(Ordering::SeqCst)
    }

    /// Provisioner that creates this store's table.
    #[must_use]
    pub fn provisioner(&self) -> MemoryProvisioner {
        MemoryProvisioner {
            store: self.clone(),
        }
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<UserId, RemoteCartRecord>> {
        self.inner
            .rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<(), RemoteError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("connection refused".to_string()));
        }
        if self.inner.table_missing.load(Ordering::SeqCst) {
            return Err(RemoteError::TableMissing(
                "relation \"cart_sync.user_cart\" does not exist".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteCartStore for MemoryRemoteCartStore {
    async fn probe(&self) -> Result<(), RemoteError> {
        self.check()
    }

    async fn fetch_by_user(&self, user: &UserId) -> Result<Option<RemoteCartRecord>, RemoteError> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.record(user))
    }

    async fn upsert_by_user(&self, user: &UserId, cart: &Cart) -> Result<(), RemoteError> {
        self.inner.upserts.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let cart_data =
            serde_json::to_value(cart).map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        self.insert_raw(user, cart_data);
        Ok(())
    }
}

/// Provisioner paired with a [`MemoryRemoteCartStore`].
#[derive(Clone)]
pub struct MemoryProvisioner {
    store: MemoryRemoteCartStore,
}

#[async_trait]
impl Provisioner for MemoryProvisioner {
    async fn provision(&self) -> Result<(), RemoteError> {
        self.store.inner.provisions.fetch_add(1, Ordering::SeqCst);
        if self.store.inner.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Provisioning("connection refused".to_string()));
        }
        self.store.set_table_missing(false);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use storehouse_core::ProductId;

    #[tokio::test]
    async fn test_upsert_then_fetch() {
        let store = MemoryRemoteCartStore::new();
        let user = UserId::new("u1");
        let cart: Cart = [(ProductId::new("a"), 2)].into_iter().collect();

        store.upsert_by_user(&user, &cart).await.unwrap();
        let record = store.fetch_by_user(&user).await.unwrap().unwrap();

        assert_eq!(record.cart().unwrap(), cart);
        assert_eq!(store.upsert_count(), 1);
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_row() {
        let store = MemoryRemoteCartStore::new();
        let user = UserId::new("u1");

        store
            .upsert_by_user(&user, &[(ProductId::new("a"), 1)].into_iter().collect())
            .await
            .unwrap();
        store.upsert_by_user(&user, &Cart::new()).await.unwrap();

        assert_eq!(store.cart_for(&user), Some(Cart::new()));
    }

    #[tokio::test]
    async fn test_offline_store_fails() {
        let store = MemoryRemoteCartStore::new();
        store.set_offline(true);

        assert!(matches!(
            store.probe().await,
            Err(RemoteError::Unavailable(_))
        ));
        assert!(store.fetch_by_user(&UserId::new("u1")).await.is_err());
    }

    #[tokio::test]
    async fn test_provisioner_creates_table() {
        let store = MemoryRemoteCartStore::without_table();
        let user = UserId::new("u1");

        let err = store.upsert_by_user(&user, &Cart::new()).await.unwrap_err();
        assert!(err.is_table_missing());

        store.provisioner().provision().await.unwrap();
        store.upsert_by_user(&user, &Cart::new()).await.unwrap();
        assert_eq!(store.provision_count(), 1);
    }
}
