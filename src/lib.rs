//! Marstek battery UDP polling engine
//!
//! Async client for Marstek battery appliances speaking a JSON-RPC-shaped
//! protocol over UDP datagrams. The device offers no delivery guarantee, no
//! ordering, and no fixed response schema, and it falls over when polled too
//! quickly — this crate turns that into a stable, always-available metrics
//! snapshot:
//!
//! - **Transport** ([`UdpTransport`]): one datagram out, correlated response
//!   or timeout back. Mismatched and malformed datagrams are dropped as
//!   noise.
//! - **Scheduler** ([`CommandScheduler`]): runs the fixed status-command
//!   sequence with a mandatory quiet period between device calls.
//! - **Normalizer** ([`normalize::extract`]): maps drifting response key
//!   names onto canonical metrics through explicit, ordered alias tables.
//! - **Poller** ([`DevicePoller`]): periodic cycles merging fresh readings
//!   over stale ones into a torn-write-free [`Snapshot`].
//! - **Validator** ([`ConnectionValidator`]): setup-time reachability check
//!   with a bounded retry budget.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use marstek_udp::{ConnectionValidator, DevicePoller, MarstekConfig, ValidatePolicy};
//!
//! #[tokio::main]
//! async fn main() -> marstek_udp::Result<()> {
//!     let config = MarstekConfig::new("192.168.1.100");
//!     let mut poller = DevicePoller::connect(&config).await?;
//!
//!     // Setup-time connectivity check, then poll.
//!     let validator = ConnectionValidator::new(ValidatePolicy::from_config(&config));
//!     validator.validate(poller.scheduler_mut()).await?;
//!
//!     let snapshot = poller.tick().await;
//!     if let Some(soc) = snapshot.get("battery_soc") {
//!         println!("state of charge: {:?} (fresh: {})", soc.value, soc.fresh);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The library never installs a tracing subscriber; embedders own logging
//! setup.

pub mod config;
pub mod error;
pub mod normalize;
pub mod poller;
pub mod protocol;
pub mod scheduler;
pub mod transport;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::MarstekConfig;
pub use error::{Error, Result};
pub use normalize::{extract, metric_names, MetricValue};
pub use poller::{DevicePoller, MetricReading, Snapshot};
pub use protocol::{Command, RpcRequest, RpcResponse};
pub use scheduler::CommandScheduler;
pub use transport::{DeviceRpc, UdpTransport};
pub use validate::{ConnectionValidator, ValidatePolicy};
