//! Cart synchronizer.
//!
//! Presents one cart view and one mutation API over three copies of the
//! cart: the [`LocalCartCache`], the device store behind it, and the
//! optional per-user remote store.
//!
//! # Write path
//!
//! Every mutation reads the full cart, applies the change, and commits it to
//! the cache and device store before returning. The remote copy is updated
//! afterwards by a detached background push; the caller never waits for it
//! and never sees its outcome.
//!
//! # Reconciliation
//!
//! [`CartSynchronizer::load_user_cart`] runs on sign-in and on activation.
//! With no remote record the device cart seeds the remote store; with a
//! record the configured [`ReconcilePolicy`] decides the result, which then
//! replaces the device copy. Remote writes across devices are not ordered,
//! so concurrent edits on two devices may clobber each other.
//!
//! Each successful remote write records a [`BaselineStore`] entry: the cart
//! both copies agreed on, and for which user. Policies get it as the common
//! ancestor, so reconciling again without edits changes nothing.
//!
//! # Failures
//!
//! Nothing here returns an error. Remote failures are reported through the
//! [`FailureReporter`] and the device copy is used instead.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use storehouse_core::{Cart, ProductId, UserId};

use crate::baseline::BaselineStore;
use crate::cache::LocalCartCache;
use crate::device::{DeviceStore, StorageEvent, StorageEvents};
use crate::identity::{CurrentUser, IdentityProvider, SessionIdentity};
use crate::reconcile::{LastWriterWins, ReconcilePolicy};
use crate::remote::{Provisioner, RemoteCartStore};
use crate::tasks::{BackgroundTasks, FailureHook, FailureReporter, SyncFailure, SyncOperation};

/// Default device-store key of the cart payload.
pub const DEFAULT_STORAGE_KEY: &str = "cart";

/// Remote store plus the provisioner used when its table is missing.
#[derive(Clone)]
struct RemoteHandle {
    store: Arc<dyn RemoteCartStore>,
    provisioner: Option<Arc<dyn Provisioner>>,
}

impl RemoteHandle {
    /// Upsert, provisioning and retrying once if the table is missing.
    async fn upsert_with_retry(&self, user: &UserId, cart: &Cart) -> Result<(), SyncFailure> {
        let err = match self.store.upsert_by_user(user, cart).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        if !err.is_table_missing() {
            return Err(SyncFailure::new(SyncOperation::Upsert, Some(user), &err));
        }
        let Some(provisioner) = &self.provisioner else {
            return Err(SyncFailure::new(SyncOperation::Upsert, Some(user), &err));
        };

        debug!(user = %user, "Remote cart table missing, provisioning");
        provisioner
            .provision()
            .await
            .map_err(|e| SyncFailure::new(SyncOperation::Provision, Some(user), &e))?;

        self.store
            .upsert_by_user(user, cart)
            .await
            .map_err(|e| SyncFailure::new(SyncOperation::Upsert, Some(user), &e))
    }
}

/// Coordinates the local cache, device store and remote store.
pub struct CartSynchronizer {
    cache: LocalCartCache,
    baseline: Arc<BaselineStore>,
    write_lock: Mutex<()>,
    remote: Option<RemoteHandle>,
    identity: Arc<dyn IdentityProvider>,
    policy: Arc<dyn ReconcilePolicy>,
    tasks: BackgroundTasks,
    reporter: FailureReporter,
}

impl CartSynchronizer {
    /// Start building a synchronizer over `device`.
    #[must_use]
    pub fn builder(device: Arc<dyn DeviceStore>) -> CartSynchronizerBuilder {
        CartSynchronizerBuilder::new(device)
    }

    /// The current cart.
    pub fn get_cart(&self) -> Cart {
        self.cache.read()
    }

    /// Total units in the cart.
    pub fn cart_count(&self) -> u32 {
        self.cache.read().total_quantity()
    }

    /// Add `quantity` units of a product.
    pub fn add_to_cart(&self, product: ProductId, quantity: u32) -> Cart {
        self.mutate(|cart| {
            cart.add(product, quantity);
        })
    }

    /// Remove one unit of a product, deleting the entry at zero.
    pub fn decrease_item(&self, product: &ProductId) -> Cart {
        self.mutate(|cart| {
            cart.decrease(product);
        })
    }

    /// Delete a product's entry regardless of quantity.
    pub fn remove_from_cart(&self, product: &ProductId) -> Cart {
        self.mutate(|cart| {
            cart.remove(product);
        })
    }

    /// Set a product's quantity outright. Zero deletes the entry.
    pub fn set_quantity(&self, product: ProductId, quantity: u32) -> Cart {
        self.mutate(|cart| cart.set_quantity(product, quantity))
    }

    /// Empty the cart locally and, in the background, remotely.
    pub fn clear_cart(&self) -> Cart {
        self.mutate(Cart::clear)
    }

    /// Invalidate the cache if `event` touched the cart key.
    pub fn handle_storage_event(&self, event: &StorageEvent) {
        if event.affects(self.cache.key()) {
            debug!(key = ?event.key, "Cart changed in another context");
            self.cache.invalidate();
        }
    }

    /// Page (re)activation: drop the cache and reconcile with the remote.
    pub async fn on_activation(&self) -> Cart {
        self.cache.invalidate();
        self.load_user_cart().await
    }

    /// Reconcile the device cart with the signed-in user's remote cart.
    ///
    /// Without a user or a remote store this is the device cart. Remote
    /// failures fall back to the device cart.
    #[instrument(skip(self))]
    pub async fn load_user_cart(&self) -> Cart {
        let Some(remote) = &self.remote else {
            debug!("No remote cart store configured");
            return self.get_cart();
        };
        let Some(user) = self.identity.current_user() else {
            debug!("Anonymous session, using device cart");
            return self.get_cart();
        };

        if let Err(e) = remote.store.probe().await {
            self.reporter
                .report(&SyncFailure::new(SyncOperation::Probe, Some(&user.id), &e));
            return self.get_cart();
        }

        let record = match remote.store.fetch_by_user(&user.id).await {
            Ok(record) => record,
            Err(e) => {
                self.reporter
                    .report(&SyncFailure::new(SyncOperation::Fetch, Some(&user.id), &e));
                return self.get_cart();
            }
        };

        let remote_cart = match record.map(|r| r.cart()) {
            Some(Ok(cart)) => cart,
            Some(Err(e)) => {
                debug!(user = %user.id, error = %e, "Remote cart data unusable, seeding from device");
                return self.seed_remote(remote, &user).await;
            }
            None => return self.seed_remote(remote, &user).await,
        };

        let reconciled = {
            let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let local = self.cache.read();
            let base = self.baseline.for_user(&user.id);
            let reconciled = self.policy.reconcile(&local, &remote_cart, base.as_ref());
            self.cache.write(&reconciled);
            reconciled
        };

        if reconciled == remote_cart {
            self.baseline.record(&user.id, &reconciled);
        } else {
            match remote.upsert_with_retry(&user.id, &reconciled).await {
                Ok(()) => self.baseline.record(&user.id, &reconciled),
                Err(failure) => self.reporter.report(&failure),
            }
        }

        info!(
            user = %user.id,
            policy = self.policy.name(),
            items = reconciled.len(),
            "Reconciled cart with remote copy"
        );
        reconciled
    }

    /// Wait for every background push scheduled so far.
    pub async fn flush(&self) {
        self.tasks.drain().await;
    }

    /// Number of background pushes still running.
    pub fn pending_pushes(&self) -> usize {
        self.tasks.pending()
    }

    /// Whether a device write failed and the cart lives only in memory.
    pub fn is_degraded(&self) -> bool {
        self.cache.is_degraded()
    }

    /// Listen for storage events and identity transitions.
    ///
    /// Storage events touching the cart key invalidate the cache. Signing in
    /// (or switching users) runs [`load_user_cart`](Self::load_user_cart);
    /// signing out leaves the device cart alone. The task runs until aborted.
    pub fn spawn_event_loop(self: &Arc<Self>, storage: Option<StorageEvents>) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        let mut identity_rx = self.identity.subscribe();
        // Transitions after this point are seen even if the task starts late
        let last_user = identity_rx.borrow_and_update().clone();
        tokio::spawn(async move {
            sync.run_event_loop(identity_rx, last_user, storage).await;
        })
    }

    async fn run_event_loop(
        &self,
        mut identity_rx: watch::Receiver<Option<CurrentUser>>,
        mut last_user: Option<CurrentUser>,
        mut storage: Option<StorageEvents>,
    ) {
        enum Step {
            Identity(bool),
            Storage(Option<StorageEvent>),
        }

        loop {
            let step = tokio::select! {
                changed = identity_rx.changed() => Step::Identity(changed.is_ok()),
                event = next_storage_event(storage.as_mut()) => Step::Storage(event),
            };

            match step {
                Step::Identity(false) => {
                    debug!("Identity provider closed, stopping cart event loop");
                    return;
                }
                Step::Identity(true) => {
                    let user = identity_rx.borrow_and_update().clone();
                    match (&last_user, &user) {
                        (_, Some(now)) if last_user.as_ref() != Some(now) => {
                            info!(user = %now.id, "User signed in, reconciling cart");
                            self.load_user_cart().await;
                        }
                        (Some(before), None) => {
                            info!(user = %before.id, "User signed out, keeping device cart");
                        }
                        _ => {}
                    }
                    last_user = user;
                }
                Step::Storage(Some(event)) => self.handle_storage_event(&event),
                Step::Storage(None) => {
                    debug!("Storage event stream closed");
                    storage = None;
                }
            }
        }
    }

    /// Push the device cart as the user's first remote copy.
    async fn seed_remote(&self, remote: &RemoteHandle, user: &CurrentUser) -> Cart {
        let local = self.get_cart();
        match remote.upsert_with_retry(&user.id, &local).await {
            Ok(()) => {
                self.baseline.record(&user.id, &local);
                info!(user = %user.id, items = local.len(), "Seeded remote cart from device");
            }
            Err(failure) => self.reporter.report(&failure),
        }
        local
    }

    /// Apply `op` to the full cart, commit locally, then schedule a push.
    fn mutate(&self, op: impl FnOnce(&mut Cart)) -> Cart {
        let cart = {
            let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let mut cart = self.cache.read();
            op(&mut cart);
            self.cache.write(&cart);
            cart
        };
        self.schedule_push(cart.clone());
        cart
    }

    /// Push `cart` for the signed-in user; the baseline moves on success.
    fn schedule_push(&self, cart: Cart) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let Some(user) = self.identity.current_user() else {
            return;
        };

        let baseline = Arc::clone(&self.baseline);
        let task_user = user.id.clone();
        self.tasks
            .spawn(SyncOperation::Upsert, Some(&user.id), async move {
                remote.upsert_with_retry(&task_user, &cart).await?;
                baseline.record(&task_user, &cart);
                Ok::<(), SyncFailure>(())
            });
    }
}

async fn next_storage_event(storage: Option<&mut StorageEvents>) -> Option<StorageEvent> {
    match storage {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

/// Builder for [`CartSynchronizer`].
pub struct CartSynchronizerBuilder {
    device: Arc<dyn DeviceStore>,
    storage_key: String,
    remote: Option<Arc<dyn RemoteCartStore>>,
    provisioner: Option<Arc<dyn Provisioner>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    policy: Arc<dyn ReconcilePolicy>,
    failure_hook: Option<FailureHook>,
}

impl CartSynchronizerBuilder {
    fn new(device: Arc<dyn DeviceStore>) -> Self {
        Self {
            device,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            remote: None,
            provisioner: None,
            identity: None,
            policy: Arc::new(LastWriterWins),
            failure_hook: None,
        }
    }

    /// Device-store key of the cart payload.
    #[must_use]
    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Per-user remote store. Without one, the cart is device-only.
    #[must_use]
    pub fn remote(mut self, store: Arc<dyn RemoteCartStore>) -> Self {
        self.remote = Some(store);
        self
    }

    /// Provisioner run once when a remote write finds its table missing.
    #[must_use]
    pub fn provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Identity provider. Defaults to an anonymous session.
    #[must_use]
    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Reconciliation policy. Defaults to [`LastWriterWins`].
    #[must_use]
    pub fn policy(mut self, policy: Arc<dyn ReconcilePolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Hook receiving every absorbed remote failure.
    #[must_use]
    pub fn on_failure(mut self, hook: FailureHook) -> Self {
        self.failure_hook = Some(hook);
        self
    }

    /// Build the synchronizer.
    #[must_use]
    pub fn build(self) -> CartSynchronizer {
        let reporter = FailureReporter::new(self.failure_hook);
        let baseline = BaselineStore::new(Arc::clone(&self.device), &self.storage_key);
        CartSynchronizer {
            cache: LocalCartCache::new(self.device, self.storage_key),
            baseline: Arc::new(baseline),
            write_lock: Mutex::new(()),
            remote: self.remote.map(|store| RemoteHandle {
                store,
                provisioner: self.provisioner,
            }),
            identity: self
                .identity
                .unwrap_or_else(|| Arc::new(SessionIdentity::anonymous())),
            policy: self.policy,
            tasks: BackgroundTasks::new(reporter.clone()),
            reporter,
        }
    }
}
