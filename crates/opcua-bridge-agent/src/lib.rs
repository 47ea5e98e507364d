//! # OPC UA Bridge Agent
//!
//! Runtime connecting an OPC UA server to a broker exchange.
//!
//! ## Architecture
//!
//! The agent wires three parts together:
//! 1. **Crawler**: discovers the address space and subscribes to its variables
//! 2. **Mapping**: turns each change notification into a normalized event
//! 3. **Publisher**: delivers events to the broker, queueing them until the
//!    connection is ready

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod runtime;

pub use config::{BridgeConfig, BrokerConfig, BrokerProtocol, CrawlConfig};
pub use runtime::Bridge;

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber, filtered by `RUST_LOG` (default `info`).
///
/// Does nothing if a subscriber is already installed.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
