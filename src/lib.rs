//! Stratum Mining Pool Protocol Client
//!
//! A resilient Stratum V1 client for cryptocurrency mining pools, speaking
//! line-delimited JSON-RPC over a persistent TCP connection.
//!
//! # Features
//!
//! - Legacy (`mining.subscribe`/`mining.authorize`) and modern (JSON-RPC 2.0
//!   `login`) handshake dialects, with a one-time automatic fallback
//! - Connection resilience: scheduled reconnect backoff, session resumption,
//!   pool-directed one-shot redirects (`client.reconnect`)
//! - Defensive parsing of the message shapes real pools actually send
//! - Flood and garbage protection: bounded receive buffer, invalid-command
//!   streak limit
//! - Throughput metering and optional keep-alive pings
//! - Async/await based on Tokio
//!
//! # Example
//!
//! ```no_run
//! use stratum_link::{SessionEvent, StratumConfig, StratumSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StratumConfig {
//!         url: "stratum+tcp://pool.example.com:3333".to_string(),
//!         username: "wallet.worker".to_string(),
//!         ..Default::default()
//!     };
//!
//!     let (handle, mut events) = StratumSession::spawn(config)?;
//!     handle.connect()?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             SessionEvent::JobReceived(job) => println!("New job: {job}"),
//!             SessionEvent::Online => println!("Logged in"),
//!             _ => {}
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod timer;
pub mod transport;

mod session;

// Re-export main types
pub use config::{BackoffSchedule, Dialect, StratumConfig, Target};
pub use error::{Result, StratumError};
pub use events::SessionEvent;
pub use protocol::Share;
pub use session::{SessionHandle, StratumSession};
pub use transport::{Connector, Wire};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default user agent string
pub fn default_user_agent() -> String {
    crate::config::default_user_agent()
}
