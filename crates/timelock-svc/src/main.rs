//! Time-Lock Service
//!
//! Runs the keypers' DKG at startup, then serves time-lock encryption and
//! decryption over HTTP.

mod api;
mod config;
mod error;

use anyhow::{Context, Result};
use api::AppState;
use clap::Parser;
use config::Args;
use std::sync::Arc;
use timelock_core::{keygen, EpochKeyManager, EpochMode, LocalKeypers, TimeLock};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_env_filter(filter)
            .init();
    }

    let mode = args.mode()?;
    let seed = args.seed()?;

    info!(
        listen = %args.listen_addr(),
        epoch_mode = %mode,
        keypers = args.keypers,
        threshold = args.threshold,
        deterministic = seed.is_some(),
        "Starting time-lock service"
    );

    let state = bootstrap(&args, mode, seed)
        .await
        .context("DKG setup failed")?;

    let app = api::router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(args.listen_addr()).await?;
    info!(address = %args.listen_addr(), "Listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Run the DKG and assemble the service state
async fn bootstrap(args: &Args, mode: EpochMode, seed: Option<[u8; 32]>) -> Result<AppState> {
    let results = keygen::run_local_dkg(args.keypers, args.threshold, seed).await?;
    let keypers = LocalKeypers::new(results)?;

    let keys = EpochKeyManager::new(Arc::new(keypers));
    let timelock = TimeLock::new(keys, mode).with_legacy_sigma(args.legacy_sigma);

    info!(
        eon_key = %hex::encode(timelock_core::primitives::g2_to_bytes(timelock.master_public_key())),
        qualified = ?timelock.keys().source().qualified(),
        "DKG finished"
    );

    Ok(AppState { timelock })
}
