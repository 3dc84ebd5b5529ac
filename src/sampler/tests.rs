use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::*;
use crate::snapshot::{DiskCounters, GpuReading, GpuSample, NetCounters};

fn test_config() -> Config {
    Config {
        db_path: PathBuf::from(":memory:"),
        sample_interval: Duration::from_secs(2),
        data_dir: PathBuf::from("/tmp"),
        retention: None,
    }
}

fn reading_with_counters(disk_read: u64, disk_write: u64, rx: u64, tx: u64) -> RawReading {
    let mut raw = RawReading::default();
    raw.cpu.total_util = 10.0;
    raw.mem.used_percent = 20.0;
    raw.disk_counters.insert("sda".to_string(), DiskCounters {
        read_bytes: disk_read,
        write_bytes: disk_write,
    });
    raw.net_counters.insert("eth0".to_string(), NetCounters { rx_bytes: rx, tx_bytes: tx });
    raw
}

fn disk_row(store: &MetricsStore) -> Option<(f64, f64)> {
    store
        .connection()
        .query_row(
            "SELECT read_bps, write_bps FROM disk_samples WHERE device = 'sda'
             ORDER BY ts DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .ok()
}

fn table_count(store: &MetricsStore, table: &str) -> i64 {
    store
        .connection()
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap()
}

#[tokio::test]
async fn first_tick_stores_no_rates_second_tick_does() {
    let mut source = MockMetricsSource::new();
    let mut calls = 0u32;
    source.expect_read().times(2).returning(move || {
        calls += 1;
        match calls {
            1 => Ok(reading_with_counters(1_000, 500, 10_000, 2_000)),
            _ => Ok(reading_with_counters(3_000, 1_500, 14_000, 3_000)),
        }
    });

    let store = MetricsStore::open_in_memory().unwrap();
    let mut sampler = Sampler::new(source, store, &test_config());

    // First observation only establishes baselines: the snapshot commits,
    // but carries no disk/net rows.
    sampler.tick(2.0).await.unwrap();
    assert_eq!(table_count(sampler.store(), "cpu_samples"), 1);
    assert_eq!(table_count(sampler.store(), "disk_samples"), 0);
    assert_eq!(table_count(sampler.store(), "net_samples"), 0);

    sampler.tick(2.0).await.unwrap();
    let (read_bps, write_bps) = disk_row(sampler.store()).unwrap();
    assert_eq!(read_bps, 1_000.0);
    assert_eq!(write_bps, 500.0);

    let (rx_bps, tx_bps): (f64, f64) = sampler
        .store()
        .connection()
        .query_row("SELECT rx_bps, tx_bps FROM net_samples", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(rx_bps, 2_000.0);
    assert_eq!(tx_bps, 500.0);
}

#[tokio::test]
async fn collection_failure_is_isolated_and_leaves_no_state() {
    let mut source = MockMetricsSource::new();
    let mut calls = 0u32;
    source.expect_read().times(2).returning(move || {
        calls += 1;
        match calls {
            1 => Err(crate::error::Error::collection("sensor bus timeout")),
            _ => Ok(reading_with_counters(1_000, 500, 0, 0)),
        }
    });

    let store = MetricsStore::open_in_memory().unwrap();
    let mut sampler = Sampler::new(source, store, &test_config());

    let err = sampler.tick(2.0).await.unwrap_err();
    assert!(err.is_collection());
    assert_eq!(table_count(sampler.store(), "cpu_samples"), 0);

    // The failed tick established no baselines, so the next successful tick
    // is a first observation.
    sampler.tick(2.0).await.unwrap();
    assert_eq!(table_count(sampler.store(), "disk_samples"), 0);
}

#[tokio::test]
async fn store_failure_drops_snapshot_but_keeps_baselines() {
    let mut source = MockMetricsSource::new();
    let mut calls = 0u32;
    source.expect_read().times(2).returning(move || {
        calls += 1;
        match calls {
            1 => Ok(reading_with_counters(1_000, 500, 0, 0)),
            _ => Ok(reading_with_counters(5_000, 2_500, 0, 0)),
        }
    });

    let store = MetricsStore::open_in_memory().unwrap();
    // Sabotage the write path for the first tick only.
    store.connection().execute_batch("ALTER TABLE cpu_samples RENAME TO cpu_samples_hidden;").unwrap();

    let mut sampler = Sampler::new(source, store, &test_config());
    let err = sampler.tick(2.0).await.unwrap_err();
    assert!(err.is_persistence());

    // Restore the table; collection succeeded on tick 1, so its baselines
    // survive the dropped snapshot and tick 2 produces real rates.
    sampler
        .store()
        .connection()
        .execute_batch("ALTER TABLE cpu_samples_hidden RENAME TO cpu_samples;")
        .unwrap();

    sampler.tick(2.0).await.unwrap();
    let (read_bps, write_bps) = disk_row(sampler.store()).unwrap();
    assert_eq!(read_bps, 2_000.0);
    assert_eq!(write_bps, 1_000.0);
}

#[tokio::test]
async fn counter_reset_stores_zero_rate() {
    let mut source = MockMetricsSource::new();
    let mut calls = 0u32;
    source.expect_read().times(2).returning(move || {
        calls += 1;
        match calls {
            1 => Ok(reading_with_counters(9_000, 9_000, 0, 0)),
            // Device reset: counters restart below the previous values.
            _ => Ok(reading_with_counters(100, 50, 0, 0)),
        }
    });

    let store = MetricsStore::open_in_memory().unwrap();
    let mut sampler = Sampler::new(source, store, &test_config());
    sampler.tick(2.0).await.unwrap();
    sampler.tick(2.0).await.unwrap();

    let (read_bps, write_bps) = disk_row(sampler.store()).unwrap();
    assert_eq!(read_bps, 0.0);
    assert_eq!(write_bps, 0.0);
}

#[tokio::test]
async fn gpu_failure_markers_flow_through_to_skip() {
    let mut source = MockMetricsSource::new();
    source.expect_read().times(1).returning(|| {
        let mut raw = RawReading::default();
        raw.gpus = vec![
            GpuReading::Sample(GpuSample {
                index: 0,
                temp: 50.0,
                util: 10.0,
                power_w: 60.0,
                vram_used_mb: 1024,
                vram_total_mb: 8192,
                fan_percent: 30.0,
            }),
            GpuReading::Failed { index: 1, reason: "nvml timeout".to_string() },
        ];
        Ok(raw)
    });

    let store = MetricsStore::open_in_memory().unwrap();
    let mut sampler = Sampler::new(source, store, &test_config());
    sampler.tick(2.0).await.unwrap();

    assert_eq!(table_count(sampler.store(), "gpu_samples"), 1);
}

#[tokio::test]
async fn run_exits_on_stop_signal() {
    let mut source = MockMetricsSource::new();
    source.expect_read().returning(|| Ok(RawReading::default()));

    let store = MetricsStore::open_in_memory().unwrap();
    let sampler = Sampler::new(source, store, &test_config());

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(sampler.run(rx));

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle).await.expect("sampler did not stop").unwrap();
}

#[tokio::test]
async fn run_exits_when_stop_sender_is_dropped() {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    let reads = Arc::new(AtomicU32::new(0));
    let reads_in_mock = Arc::clone(&reads);

    let mut source = MockMetricsSource::new();
    source.expect_read().returning(move || {
        reads_in_mock.fetch_add(1, Ordering::SeqCst);
        Ok(RawReading::default())
    });

    let store = MetricsStore::open_in_memory().unwrap();
    let sampler = Sampler::new(source, store, &test_config());

    let (tx, rx) = watch::channel(false);
    drop(tx);

    // A closed channel means no one can ever signal us; the loop must treat
    // that as a stop rather than spinning with the sleep select always lost.
    let handle = tokio::spawn(sampler.run(rx));
    tokio::time::timeout(Duration::from_secs(5), handle).await.expect("sampler did not stop").unwrap();
    assert!(reads.load(Ordering::SeqCst) <= 1);
}

#[test]
fn derive_rates_prunes_disappeared_devices() {
    let mut rates = CounterRates::new();

    let mut counters = BTreeMap::new();
    counters.insert("sda".to_string(), DiskCounters { read_bytes: 100, write_bytes: 100 });
    counters.insert("sdb".to_string(), DiskCounters { read_bytes: 100, write_bytes: 100 });
    derive_disk_rates(&mut rates, &counters, 2.0);
    assert_eq!(rates.len(), 4);

    // sdb unplugged: its baselines vanish with it.
    counters.remove("sdb");
    let tp = derive_disk_rates(&mut rates, &counters, 2.0);
    assert_eq!(rates.len(), 2);
    assert!(tp.contains_key("sda"));
}
