//! Hubgate CLI application
//!
//! Runs single-entity lookups against a GitHub repository through the
//! Hubgate access layer. Every key passed to one command is looked up
//! concurrently, so they coalesce into a single listing call.
//!
//! Set `RUST_LOG=hubgate_core=debug` to watch batching, caching and
//! rate-limit decisions.

mod args;
mod commands;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use args::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with environment-based filtering
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling outstanding lookups");
            on_signal.cancel();
        }
    });

    commands::run(cli, cancel).await
}
