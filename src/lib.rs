//! hostpulse - host and GPU telemetry sampling with SQLite-backed history
//!
//! This crate periodically samples host telemetry (CPU, memory, disk,
//! network, fans) and GPU telemetry, and persists each sample as six
//! append-only time series for a monitoring dashboard to query over bounded
//! windows.
//!
//! # Components
//!
//! - **Snapshot model** ([`snapshot`]): one timestamped bundle of all
//!   subsystem readings per tick, with an explicit per-GPU failure marker
//! - **Rate derivation** ([`rates`]): per-second throughput from cumulative
//!   disk/network byte counters, with counter-reset clamping
//! - **Persistence** ([`store`]): idempotent schema lifecycle, atomic
//!   multi-series snapshot writes, outer-joined windowed reads, and
//!   retention purge
//! - **Sampling loop** ([`sampler`]): drift-corrected cadence with per-tick
//!   fault isolation and cooperative shutdown
//! - **Default source** ([`collectors`]): sysinfo / procfs / NVML readers
//!   behind the [`sampler::MetricsSource`] boundary
//!
//! # Example
//!
//! ```no_run
//! use hostpulse::prelude::*;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> hostpulse::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = MetricsStore::open(&config.db_path)?;
//!     let sampler = Sampler::new(SystemSource::new(), store, &config);
//!
//!     let (_stop_tx, stop_rx) = watch::channel(false);
//!     sampler.run(stop_rx).await;
//!     Ok(())
//! }
//! ```
//!
//! # Failure policy
//!
//! Telemetry delivery is best-effort, at-most-once: a tick that fails at any
//! stage is logged and dropped, and the loop schedules the next tick. Only
//! configuration faults at startup are fatal.

pub mod collectors;
pub mod config;
pub mod error;
pub mod rates;
pub mod sampler;
pub mod snapshot;
pub mod store;

pub use error::{Error, Result};

/// Re-export common types for convenience
pub mod prelude {
    pub use crate::collectors::SystemSource;
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::rates::CounterRates;
    pub use crate::sampler::{MetricsSource, Sampler};
    pub use crate::snapshot::{RawReading, Snapshot};
    pub use crate::store::MetricsStore;
}
