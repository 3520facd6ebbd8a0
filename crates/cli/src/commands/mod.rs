//! CLI command implementations.

use storehouse_cart::{ConfigError, RemoteError};
use thiserror::Error;

pub mod cart;
pub mod provision;

/// Errors that can end a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The database URL could not be turned into a pool.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Provisioning the remote table failed.
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// Empty product handle.
    #[error("Product handle must not be empty")]
    EmptyProduct,

    /// Cart could not be rendered.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing to stdout failed.
    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),
}
