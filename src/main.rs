//! ragforge maintenance CLI binary.
//!
//! This is the entry point for running maintenance operations
//! (re-embedding, diagnostics, consistency verification) against a
//! `ragforge` index. For library usage, import from the `ragforge` crate
//! instead.

use clap::Parser;
use ragforge::cli::{self, Cli};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    cli::run(cli).await?;

    Ok(())
}
