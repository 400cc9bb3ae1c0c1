//! Pool monitor example showing how to drive a Stratum session
//!
//! Connects to a mining pool, logs everything the session reports and keeps
//! running until Ctrl+C. In a real miner you would feed the received jobs to
//! your hashing backend and submit the shares it finds.

use anyhow::Result;
use stratum_link::{SessionEvent, StratumConfig, StratumSession};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; RUST_LOG overrides the default filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "stratum_link=debug".into()),
        )
        .init();

    // Note: this is an example pool - replace with a real pool address and
    // your own wallet/worker credentials
    let config = StratumConfig {
        url: "stratum+tcp://pool.example.com:3333".to_string(),
        username: "your_wallet_address.worker1".to_string(),
        password: "x".to_string(), // most pools use 'x' as password
        log_incoming: true,
        log_outgoing: true,
        ..Default::default()
    };

    let (handle, mut events) = StratumSession::spawn(config)?;
    handle.connect()?;

    let monitor = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Online => info!("Logged in to pool"),
                SessionEvent::Connected => info!("Connection established"),
                SessionEvent::Disconnected => warn!("Connection lost"),
                SessionEvent::StatusChanged(status) => info!("Status: {status}"),
                SessionEvent::Error(e) => error!("Pool error: {e}"),
                SessionEvent::DifficultyChanged(diff) => info!("Difficulty is now {diff}"),
                SessionEvent::JobReceived(job) => {
                    info!("Received new mining job: {job}");

                    // In a real miner, you would:
                    // 1. Build the work from the job parameters and the
                    //    session's extranonce
                    // 2. Iterate nonces to find valid shares
                    // 3. handle.submit(share) when one is found
                }
                SessionEvent::RedirectRequested(target) => {
                    info!("Pool redirected us to {target}");
                }
                SessionEvent::ShareAccepted(id) => info!("Share {id} accepted"),
                SessionEvent::ShareRejected(id) => warn!("Share {id} rejected"),
            }
        }
    });

    info!("Session is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    handle.shutdown()?;
    monitor.await?;

    Ok(())
}

// Run with: cargo run --example pool_monitor
