//! Integration tests for Storehouse cart sync.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p storehouse-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_properties` - Mutation semantics through the synchronizer
//! - `remote_reconciliation` - Sign-in reconciliation and remote failures
//! - `cross_context` - Storage events, tabs and identity transitions
//!
//! Everything runs against the in-memory adapters; no database is needed.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use storehouse_cart::{
    CartSynchronizer, CurrentUser, DEFAULT_STORAGE_KEY, DeviceStore, DeviceStoreError,
    FailureHook, IdentityProvider, MemoryDeviceStore, MemoryRemoteCartStore, ReconcilePolicy,
    SessionIdentity, SyncFailure,
};
use storehouse_core::{Cart, ProductId, UserId};

/// How long [`eventually`] waits before giving up.
const EVENTUALLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared fixtures for one simulated shopper: a device origin, a remote
/// store, a session and a record of every absorbed failure.
pub struct TestContext {
    pub device: MemoryDeviceStore,
    pub remote: MemoryRemoteCartStore,
    pub identity: Arc<SessionIdentity>,
    failures: Arc<Mutex<Vec<SyncFailure>>>,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    /// Anonymous session with an empty device and remote store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            device: MemoryDeviceStore::new(),
            remote: MemoryRemoteCartStore::new(),
            identity: Arc::new(SessionIdentity::anonymous()),
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Session already signed in as `user`.
    #[must_use]
    pub fn signed_in(user: &str) -> Self {
        let ctx = Self::new();
        ctx.identity.sign_in(CurrentUser::new(user));
        ctx
    }

    /// Another device of the same shopper: its own device origin and
    /// session, signed in as the same user, sharing the remote store.
    #[must_use]
    pub fn another_device(&self) -> Self {
        let ctx = Self {
            remote: self.remote.clone(),
            ..Self::new()
        };
        if let Some(user) = self.identity.current_user() {
            ctx.identity.sign_in(user);
        }
        ctx
    }

    /// Synchronizer on the first context with the default policy.
    #[must_use]
    pub fn synchronizer(&self) -> Arc<CartSynchronizer> {
        self.synchronizer_on(self.device.clone(), None)
    }

    /// Synchronizer on the first context with `policy`.
    #[must_use]
    pub fn synchronizer_with(&self, policy: Arc<dyn ReconcilePolicy>) -> Arc<CartSynchronizer> {
        self.synchronizer_on(self.device.clone(), Some(policy))
    }

    /// A second tab: its own context on the same origin, same remote and
    /// session. Returns the synchronizer and its device handle.
    #[must_use]
    pub fn open_tab(&self) -> (Arc<CartSynchronizer>, MemoryDeviceStore) {
        let device = self.device.open_context();
        (self.synchronizer_on(device.clone(), None), device)
    }

    /// Write a raw payload to the cart key, as another tab would.
    ///
    /// # Errors
    ///
    /// Returns an error if the device store is disabled.
    pub fn write_device_payload(&self, payload: &str) -> Result<(), DeviceStoreError> {
        self.device
            .open_context()
            .set(DEFAULT_STORAGE_KEY, payload)
    }

    /// Failures absorbed so far.
    #[must_use]
    pub fn failures(&self) -> Vec<SyncFailure> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The user this context signs in as, if any.
    #[must_use]
    pub fn user(&self) -> Option<UserId> {
        self.identity.current_user().map(|u| u.id)
    }

    fn synchronizer_on(
        &self,
        device: MemoryDeviceStore,
        policy: Option<Arc<dyn ReconcilePolicy>>,
    ) -> Arc<CartSynchronizer> {
        let sink = Arc::clone(&self.failures);
        let hook: FailureHook = Arc::new(move |failure: &SyncFailure| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(failure.clone());
        });

        let mut builder = CartSynchronizer::builder(Arc::new(device))
            .remote(Arc::new(self.remote.clone()))
            .provisioner(Arc::new(self.remote.provisioner()))
            .identity(Arc::clone(&self.identity) as Arc<dyn IdentityProvider>)
            .on_failure(hook);
        if let Some(policy) = policy {
            builder = builder.policy(policy);
        }
        Arc::new(builder.build())
    }
}

/// Build a cart from `(product, quantity)` pairs.
#[must_use]
pub fn cart(entries: &[(&str, u32)]) -> Cart {
    entries
        .iter()
        .map(|(product, quantity)| (ProductId::new(*product), *quantity))
        .collect()
}

/// Poll `check` until it holds or the timeout passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + EVENTUALLY_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
