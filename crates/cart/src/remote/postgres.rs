//! `PostgreSQL` remote cart store.
//!
//! # Table: `cart_sync.user_cart`
//!
//! One row per user, keyed by `user_id`. `cart_data` holds the JSON cart
//! object. The table is created by the migrations in
//! `crates/cart/migrations/`, run through [`PgProvisioner`] or
//! `storehouse-cart provision`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use tracing::instrument;

use storehouse_core::{Cart, UserId};

use super::{Provisioner, RemoteCartRecord, RemoteCartStore, RemoteError};

/// SQLSTATE for `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

/// Create a lazily-connecting `PostgreSQL` pool.
///
/// No connection is attempted until the first query, so an unreachable
/// database surfaces as a remote failure at sync time rather than at startup.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection string cannot be parsed.
pub fn create_pool(
    database_url: &secrecy::SecretString,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect_lazy(database_url.expose_secret())
}

impl From<sqlx::Error> for RemoteError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err
            && db.code().as_deref() == Some(UNDEFINED_TABLE)
        {
            return Self::TableMissing(db.message().to_string());
        }
        Self::Unavailable(err.to_string())
    }
}

/// [`RemoteCartStore`] backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PgRemoteCartStore {
    pool: PgPool,
}

impl PgRemoteCartStore {
    /// Create a store on an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RemoteCartStore for PgRemoteCartStore {
    #[instrument(skip(self))]
    async fn probe(&self) -> Result<(), RemoteError> {
        sqlx::query("SELECT 1 FROM cart_sync.user_cart LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(user = %user))]
    async fn fetch_by_user(&self, user: &UserId) -> Result<Option<RemoteCartRecord>, RemoteError> {
        let row: Option<(Option<serde_json::Value>, DateTime<Utc>)> = sqlx::query_as(
            r"
            SELECT cart_data, updated_at
            FROM cart_sync.user_cart
            WHERE user_id = $1
            ",
        )
        .bind(user)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(cart_data, updated_at)| RemoteCartRecord {
            user_id: user.clone(),
            cart_data: cart_data.unwrap_or(serde_json::Value::Null),
            updated_at,
        }))
    }

    #[instrument(skip(self, cart), fields(user = %user, items = cart.len()))]
    async fn upsert_by_user(&self, user: &UserId, cart: &Cart) -> Result<(), RemoteError> {
        sqlx::query(
            r"
            INSERT INTO cart_sync.user_cart (user_id, cart_data, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (user_id)
            DO UPDATE SET cart_data = EXCLUDED.cart_data, updated_at = now()
            ",
        )
        .bind(user)
        .bind(Json(cart))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// [`Provisioner`] running the embedded cart migrations.
#[derive(Clone)]
pub struct PgProvisioner {
    pool: PgPool,
}

impl PgProvisioner {
    /// Create a provisioner on an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Provisioner for PgProvisioner {
    #[instrument(skip(self))]
    async fn provision(&self) -> Result<(), RemoteError> {
        tracing::info!("Running cart_sync migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RemoteError::Provisioning(e.to_string()))
    }
}
