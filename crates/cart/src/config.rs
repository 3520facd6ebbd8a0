//! Cart sync configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `CART_SYNC_DATABASE_URL` - `PostgreSQL` connection string for the remote
//!   cart store (falls back to `DATABASE_URL`; unset disables the remote)
//! - `CART_SYNC_REMOTE_ENABLED` - Master switch for the remote store (default: true)
//! - `CART_SYNC_DEVICE_DIR` - Directory of the file device store (default: .storehouse)
//! - `CART_SYNC_STORAGE_KEY` - Device-store key of the cart (default: cart)
//! - `CART_SYNC_POLICY` - `last-writer-wins` or `additive-merge` (default: last-writer-wins)
//! - `CART_SYNC_MAX_CONNECTIONS` - Remote pool size (default: 5)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;

use secrecy::SecretString;
use thiserror::Error;

use crate::reconcile::PolicyKind;
use crate::sync::DEFAULT_STORAGE_KEY;

const DEFAULT_DEVICE_DIR: &str = ".storehouse";
const DEFAULT_MAX_CONNECTIONS: &str = "5";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Cart sync configuration.
///
/// `Debug` output never contains the database URL: `SecretString` redacts it.
#[derive(Debug, Clone)]
pub struct CartSyncConfig {
    /// `PostgreSQL` URL of the remote cart store (contains password)
    pub database_url: Option<SecretString>,
    /// Whether the remote store is used at all
    pub remote_enabled: bool,
    /// Directory of the file device store
    pub device_dir: PathBuf,
    /// Device-store key of the cart payload
    pub storage_key: String,
    /// Reconciliation policy
    pub policy: PolicyKind,
    /// Remote pool size
    pub max_connections: u32,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl Default for CartSyncConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            remote_enabled: true,
            device_dir: PathBuf::from(DEFAULT_DEVICE_DIR),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            policy: PolicyKind::default(),
            max_connections: 5,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }
}

impl CartSyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(lookup);

        let database_url = vars
            .optional("CART_SYNC_DATABASE_URL")
            .or_else(|| vars.optional("DATABASE_URL"))
            .map(SecretString::from);
        let remote_enabled = parse_bool(
            "CART_SYNC_REMOTE_ENABLED",
            &vars.or_default("CART_SYNC_REMOTE_ENABLED", "true"),
        )?;
        let device_dir = PathBuf::from(vars.or_default("CART_SYNC_DEVICE_DIR", DEFAULT_DEVICE_DIR));

        let storage_key = vars.or_default("CART_SYNC_STORAGE_KEY", DEFAULT_STORAGE_KEY);
        if storage_key.trim().is_empty() {
            return Err(ConfigError::InvalidEnvVar(
                "CART_SYNC_STORAGE_KEY".to_string(),
                "must not be empty".to_string(),
            ));
        }

        let policy = vars
            .or_default("CART_SYNC_POLICY", "last-writer-wins")
            .parse::<PolicyKind>()
            .map_err(|e| ConfigError::InvalidEnvVar("CART_SYNC_POLICY".to_string(), e.to_string()))?;
        let max_connections = vars
            .or_default("CART_SYNC_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)
            .parse::<u32>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("CART_SYNC_MAX_CONNECTIONS".to_string(), e.to_string())
            })?;

        Ok(Self {
            database_url,
            remote_enabled,
            device_dir,
            storage_key,
            policy,
            max_connections,
            sentry_dsn: vars.optional("SENTRY_DSN"),
            sentry_environment: vars.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Database URL of the remote store, or `None` when the remote is
    /// disabled or not configured.
    #[must_use]
    pub fn remote_database_url(&self) -> Option<&SecretString> {
        if self.remote_enabled {
            self.database_url.as_ref()
        } else {
            None
        }
    }

    /// Database URL of the remote store, required.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if no URL is configured.
    pub fn require_database_url(&self) -> Result<&SecretString, ConfigError> {
        self.database_url
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("CART_SYNC_DATABASE_URL".to_string()))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    /// Get an optional variable; empty values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }
}

/// Parse a boolean flag.
fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected a boolean, got '{other}'"),
        )),
    }
}
