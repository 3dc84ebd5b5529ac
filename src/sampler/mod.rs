//! The drift-corrected sampling loop.
//!
//! One async task drives collection at a nominal cadence: read the metrics
//! source, derive throughput rates from its cumulative counters, assemble a
//! timestamped snapshot, and hand it to the store. Every store call is a
//! synchronous write made inline; a slow store delays the next tick instead
//! of building an in-memory backlog.
//!
//! A failed tick is logged and skipped. A single bad sample never halts
//! monitoring.

#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mockall::automock;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::rates::CounterRates;
use crate::snapshot::{DiskCounters, DiskThroughput, NetCounters, NetThroughput, RawReading, Snapshot};
use crate::store::{now_epoch, MetricsStore};

/// Floor for the measured inter-tick interval, so rate math never divides by
/// zero even when two ticks land on the same clock reading.
const MIN_TICK_INTERVAL_SECS: f64 = 0.001;

/// Minimum sleep between ticks. Prevents busy-looping when processing runs
/// longer than the nominal interval or errors repeatedly.
const MIN_SLEEP: Duration = Duration::from_millis(500);

/// How often the automatic retention purge runs, when retention is set.
const PURGE_PERIOD: Duration = Duration::from_secs(3600);

/// The upstream boundary: whatever produces one raw reading per tick.
///
/// Implementations report any failure to produce a reading as a
/// [`Collection`](crate::error::Error::Collection) error scoped to that
/// tick; the loop logs it and moves on.
#[automock]
#[async_trait]
pub trait MetricsSource: Send {
    async fn read(&mut self) -> Result<RawReading>;
}

/// The sampling loop. Owns the metrics source, the store, and the ephemeral
/// previous-counter state; single producer by design.
pub struct Sampler<S: MetricsSource> {
    source: S,
    store: MetricsStore,
    nominal_interval: Duration,
    retention: Option<Duration>,
    disk_rates: CounterRates,
    net_rates: CounterRates,
    last_tick: Instant,
    last_purge: Instant,
}

impl<S: MetricsSource> Sampler<S> {
    pub fn new(source: S, store: MetricsStore, config: &Config) -> Self {
        let now = Instant::now();
        Sampler {
            source,
            store,
            nominal_interval: config.sample_interval,
            retention: config.retention,
            disk_rates: CounterRates::new(),
            net_rates: CounterRates::new(),
            last_tick: now,
            last_purge: now,
        }
    }

    /// The store this sampler writes to.
    pub fn store(&self) -> &MetricsStore {
        &self.store
    }

    /// Run until `stop` flips to `true`. An in-flight tick completes before
    /// the loop exits; there is no drain beyond that.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!(
            interval_s = self.nominal_interval.as_secs_f64(),
            retention = ?self.retention,
            "sampler started"
        );

        loop {
            if *stop.borrow() {
                break;
            }

            let start = Instant::now();
            // Actual elapsed time since the previous tick, not the nominal
            // interval: rates stay correct even when a tick was delayed.
            let interval_s =
                start.duration_since(self.last_tick).as_secs_f64().max(MIN_TICK_INTERVAL_SECS);

            match self.tick(interval_s).await {
                Ok(ts) => debug!(ts, interval_s, "tick committed"),
                Err(e) if e.is_collection() => {
                    warn!(error = %e, "collection failed; skipping this tick")
                },
                Err(e) => error!(error = %e, "snapshot dropped; store write failed"),
            }
            self.last_tick = start;

            self.maybe_purge();

            let sleep_for =
                self.nominal_interval.saturating_sub(start.elapsed()).max(MIN_SLEEP);
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {},
                changed = stop.changed() => {
                    // A dropped sender means nobody can ask us to keep
                    // going; treat it the same as an explicit stop.
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                },
            }
        }

        info!("sampler stopped");
    }

    /// One collection pass: read, derive, assemble, persist.
    ///
    /// Counter baselines are updated as soon as collection succeeds; a
    /// subsequent store failure drops the snapshot but keeps the baselines,
    /// so the next tick's rates span the gap correctly.
    async fn tick(&mut self, interval_s: f64) -> Result<i64> {
        let raw = self.source.read().await?;
        let ts = now_epoch();

        let disk_tp = derive_disk_rates(&mut self.disk_rates, &raw.disk_counters, interval_s);
        let net_tp = derive_net_rates(&mut self.net_rates, &raw.net_counters, interval_s);

        let snapshot = Snapshot::assemble(ts, raw, disk_tp, net_tp);
        self.store.insert_snapshot(&snapshot)?;
        Ok(ts)
    }

    /// Periodic retention purge, at most once per [`PURGE_PERIOD`].
    fn maybe_purge(&mut self) {
        let Some(retention) = self.retention else { return };
        if self.last_purge.elapsed() < PURGE_PERIOD {
            return;
        }
        self.last_purge = Instant::now();

        let cutoff = now_epoch() - retention.as_secs() as i64;
        match self.store.purge_before(cutoff) {
            Ok(result) => debug!(cutoff, deleted = result.total(), "retention purge"),
            // Purge is re-runnable; failing here costs nothing but disk.
            Err(e) => warn!(error = %e, "retention purge failed"),
        }
    }
}

/// Turn cumulative disk byte counters into per-device throughput.
///
/// Devices on their first observation are absent from the result; devices
/// gone from this tick lose their baseline.
fn derive_disk_rates(
    rates: &mut CounterRates,
    counters: &BTreeMap<String, DiskCounters>,
    elapsed_s: f64,
) -> BTreeMap<String, DiskThroughput> {
    let mut live = HashSet::with_capacity(counters.len() * 2);
    let mut out = BTreeMap::new();

    for (device, c) in counters {
        let read_key = format!("{device}:read");
        let write_key = format!("{device}:write");
        let read = rates.observe(&read_key, c.read_bytes, elapsed_s);
        let write = rates.observe(&write_key, c.write_bytes, elapsed_s);
        live.insert(read_key);
        live.insert(write_key);

        if let (Some(read), Some(write)) = (read, write) {
            if read.counter_reset || write.counter_reset {
                warn!(device = %device, "disk counter went backwards; rate clamped to zero");
            }
            out.insert(
                device.clone(),
                DiskThroughput { read_bps: read.bps, write_bps: write.bps },
            );
        }
    }

    rates.prune_stale(&live);
    out
}

/// Turn cumulative interface byte counters into per-interface throughput.
fn derive_net_rates(
    rates: &mut CounterRates,
    counters: &BTreeMap<String, NetCounters>,
    elapsed_s: f64,
) -> BTreeMap<String, NetThroughput> {
    let mut live = HashSet::with_capacity(counters.len() * 2);
    let mut out = BTreeMap::new();

    for (iface, c) in counters {
        let rx_key = format!("{iface}:rx");
        let tx_key = format!("{iface}:tx");
        let rx = rates.observe(&rx_key, c.rx_bytes, elapsed_s);
        let tx = rates.observe(&tx_key, c.tx_bytes, elapsed_s);
        live.insert(rx_key);
        live.insert(tx_key);

        if let (Some(rx), Some(tx)) = (rx, tx) {
            if rx.counter_reset || tx.counter_reset {
                warn!(iface = %iface, "network counter went backwards; rate clamped to zero");
            }
            out.insert(iface.clone(), NetThroughput { rx_bps: rx.bps, tx_bps: tx.bps });
        }
    }

    rates.prune_stale(&live);
    out
}
