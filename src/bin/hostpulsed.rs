//! The hostpulse sampler daemon.
//!
//! Reads configuration from the environment, opens (and initializes) the
//! telemetry database, and samples host/GPU metrics until interrupted.

use std::process::ExitCode;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hostpulse::collectors::SystemSource;
use hostpulse::config::Config;
use hostpulse::sampler::Sampler;
use hostpulse::store::MetricsStore;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Configuration faults are unrecoverable without operator intervention;
    // fail before the loop ever starts.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        },
    };
    info!(db = %config.db_summary(), interval_s = config.sample_interval.as_secs(), "starting hostpulsed");

    let store = match MetricsStore::open(&config.db_path) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "failed to open telemetry database");
            return ExitCode::FAILURE;
        },
    };

    let sampler = Sampler::new(SystemSource::new(), store, &config);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; shutting down");
            let _ = stop_tx.send(true);
        }
    });

    sampler.run(stop_rx).await;
    ExitCode::SUCCESS
}
