//! Cart read and mutation commands.
//!
//! Each invocation builds a [`CartSynchronizer`] over the file device store
//! in `CART_SYNC_DEVICE_DIR`. With `--user` and a configured database the
//! session is signed in and mutations are pushed to the remote store; the
//! command waits for those pushes before returning.

use std::io::Write;
use std::sync::Arc;

use storehouse_cart::remote::create_pool;
use storehouse_cart::{
    CartSyncConfig, CartSynchronizer, CurrentUser, FailureHook, FileDeviceStore, PgProvisioner,
    PgRemoteCartStore, SessionIdentity, SyncFailure,
};
use storehouse_core::{Cart, ProductId};
use tracing::{info, warn};

use super::CommandError;

/// One CLI invocation's view of the cart.
pub struct Session {
    sync: CartSynchronizer,
}

impl Session {
    /// Build the synchronizer from configuration.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::Database` if the database URL is unusable.
    pub fn open(config: &CartSyncConfig, user: Option<String>) -> Result<Self, CommandError> {
        let identity = user.map_or_else(SessionIdentity::anonymous, |id| {
            SessionIdentity::signed_in(CurrentUser::new(id))
        });

        let mut builder =
            CartSynchronizer::builder(Arc::new(FileDeviceStore::new(config.device_dir.clone())))
                .storage_key(config.storage_key.clone())
                .identity(Arc::new(identity))
                .policy(config.policy.into_policy())
                .on_failure(sentry_breadcrumb_hook());

        if let Some(url) = config.remote_database_url() {
            let pool = create_pool(url, config.max_connections)?;
            builder = builder
                .remote(Arc::new(PgRemoteCartStore::new(pool.clone())))
                .provisioner(Arc::new(PgProvisioner::new(pool)));
        } else {
            info!("Remote cart store disabled, cart stays on this device");
        }

        Ok(Self {
            sync: builder.build(),
        })
    }

    pub fn show(&self) -> Result<(), CommandError> {
        print_cart(&self.sync.get_cart())
    }

    pub fn count(&self) -> Result<(), CommandError> {
        writeln!(std::io::stdout().lock(), "{}", self.sync.cart_count())?;
        Ok(())
    }

    pub async fn add(&self, product: &str, quantity: u32) -> Result<(), CommandError> {
        let cart = self.sync.add_to_cart(product_id(product)?, quantity);
        self.finish(&cart).await
    }

    pub async fn decrease(&self, product: &str) -> Result<(), CommandError> {
        let cart = self.sync.decrease_item(&product_id(product)?);
        self.finish(&cart).await
    }

    pub async fn set(&self, product: &str, quantity: u32) -> Result<(), CommandError> {
        let cart = self.sync.set_quantity(product_id(product)?, quantity);
        self.finish(&cart).await
    }

    pub async fn remove(&self, product: &str) -> Result<(), CommandError> {
        let cart = self.sync.remove_from_cart(&product_id(product)?);
        self.finish(&cart).await
    }

    pub async fn clear(&self) -> Result<(), CommandError> {
        let cart = self.sync.clear_cart();
        self.finish(&cart).await
    }

    pub async fn sync(&self) -> Result<(), CommandError> {
        let cart = self.sync.load_user_cart().await;
        self.finish(&cart).await
    }

    /// Wait for background pushes, then print the resulting cart.
    async fn finish(&self, cart: &Cart) -> Result<(), CommandError> {
        let pending = self.sync.pending_pushes();
        if pending > 0 {
            info!(pending, "Waiting for remote cart pushes");
        }
        self.sync.flush().await;

        if self.sync.is_degraded() {
            warn!("Device storage unavailable, cart was not saved on this device");
        }
        print_cart(cart)
    }
}

fn print_cart(cart: &Cart) -> Result<(), CommandError> {
    let rendered = serde_json::to_string_pretty(cart)?;
    writeln!(std::io::stdout().lock(), "{rendered}")?;
    Ok(())
}

fn product_id(raw: &str) -> Result<ProductId, CommandError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CommandError::EmptyProduct);
    }
    Ok(ProductId::new(trimmed))
}

/// Record swallowed sync failures as Sentry breadcrumbs.
fn sentry_breadcrumb_hook() -> FailureHook {
    Arc::new(|failure: &SyncFailure| {
        sentry::add_breadcrumb(sentry::Breadcrumb {
            category: Some("cart_sync".to_string()),
            message: Some(failure.to_string()),
            level: sentry::Level::Warning,
            ..Default::default()
        });
    })
}
