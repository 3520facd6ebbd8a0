//! Storehouse cart CLI - drive the cart synchronizer from a shell.
//!
//! # Usage
//!
//! ```bash
//! # Show the device cart
//! storehouse-cart show
//!
//! # Add two units as a signed-in user (pushed to the remote store)
//! storehouse-cart --user cust_42 add pineapple-chips -q 2
//!
//! # Reconcile the device cart with the user's remote cart
//! storehouse-cart --user cust_42 sync
//!
//! # Create the remote cart table
//! storehouse-cart provision
//! ```
//!
//! # Commands
//!
//! - `show` / `count` - Read the cart
//! - `add`, `decrease`, `set`, `remove`, `clear` - Mutate the cart
//! - `sync` - Reconcile with the remote store
//! - `provision` - Run the remote store migrations
//!
//! Configuration comes from the environment; see
//! [`storehouse_cart::config`].

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use storehouse_cart::CartSyncConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "storehouse-cart")]
#[command(author, version, about = "Storehouse cart sync tools")]
struct Cli {
    /// Act as this signed-in user (anonymous when omitted)
    #[arg(short, long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the remote cart table
    Provision,

    #[command(flatten)]
    Cart(CartCommand),
}

/// Commands that open a cart session.
#[derive(Subcommand)]
enum CartCommand {
    /// Print the cart as JSON
    Show,
    /// Print the total number of units in the cart
    Count,
    /// Add units of a product
    Add {
        /// Product handle
        product: String,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Remove one unit of a product
    Decrease {
        /// Product handle
        product: String,
    },
    /// Set a product's quantity (0 removes it)
    Set {
        /// Product handle
        product: String,

        /// New quantity
        quantity: u32,
    },
    /// Remove a product entirely
    Remove {
        /// Product handle
        product: String,
    },
    /// Empty the cart
    Clear,
    /// Reconcile the device cart with the user's remote cart
    Sync,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CartSyncConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Configuration is needed for Sentry init, so it loads before tracing
    let config = CartSyncConfig::from_env();
    let sentry_guard = config.as_ref().ok().and_then(init_sentry);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storehouse_cart=info,storehouse_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result = match config {
        Ok(config) => run(cli, &config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        // Flush Sentry before exiting; `exit` skips destructors
        drop(sentry_guard);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &CartSyncConfig) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Provision => commands::provision::run(config).await,
        Commands::Cart(command) => {
            let session = commands::cart::Session::open(config, cli.user)?;
            run_cart(&session, command).await
        }
    }
}

async fn run_cart(
    session: &commands::cart::Session,
    command: CartCommand,
) -> Result<(), commands::CommandError> {
    match command {
        CartCommand::Show => session.show(),
        CartCommand::Count => session.count(),
        CartCommand::Add { product, quantity } => session.add(&product, quantity).await,
        CartCommand::Decrease { product } => session.decrease(&product).await,
        CartCommand::Set { product, quantity } => session.set(&product, quantity).await,
        CartCommand::Remove { product } => session.remove(&product).await,
        CartCommand::Clear => session.clear().await,
        CartCommand::Sync => session.sync().await,
    }
}
