//! Remote store provisioning.
//!
//! # Usage
//!
//! ```bash
//! storehouse-cart provision
//! ```
//!
//! Creates the `cart_sync` schema and `cart_sync.user_cart` table. Safe to
//! run repeatedly. Requires `CART_SYNC_DATABASE_URL` (or `DATABASE_URL`),
//! regardless of `CART_SYNC_REMOTE_ENABLED`.

use storehouse_cart::remote::create_pool;
use storehouse_cart::{CartSyncConfig, PgProvisioner, Provisioner};

use super::CommandError;

/// Run the cart migrations against the configured database.
///
/// # Errors
///
/// Returns `CommandError` if no database is configured or the migrations fail.
pub async fn run(config: &CartSyncConfig) -> Result<(), CommandError> {
    let database_url = config.require_database_url()?;
    let pool = create_pool(database_url, config.max_connections)?;

    tracing::info!("Provisioning remote cart store...");
    PgProvisioner::new(pool).provision().await?;

    tracing::info!("Remote cart store ready");
    Ok(())
}
