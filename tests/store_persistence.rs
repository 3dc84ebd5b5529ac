//! On-disk lifecycle tests: schema convergence across reopens, durability of
//! committed snapshots, and purge behavior through the public API.

use std::collections::BTreeMap;

use hostpulse::snapshot::{
    CpuSample, DiskSample, DiskThroughput, GpuReading, GpuSample, MemorySample, NetSample,
    NetThroughput, Snapshot,
};
use hostpulse::store::MetricsStore;

fn snapshot_at(ts: i64) -> Snapshot {
    let mut disk_tp = BTreeMap::new();
    disk_tp.insert("sda".to_string(), DiskThroughput { read_bps: 90.0, write_bps: 45.0 });
    let mut net_tp = BTreeMap::new();
    net_tp.insert("eth0".to_string(), NetThroughput { rx_bps: 512.0, tx_bps: 128.0 });
    let mut fans = BTreeMap::new();
    fans.insert("chassis/fan1".to_string(), 900.0);

    Snapshot {
        ts,
        cpu: CpuSample {
            total_util: 12.0,
            iowait: 0.5,
            per_core: vec![10.0, 14.0],
            temp: Some(47.0),
            load1: 0.2,
            load5: 0.3,
            load15: 0.25,
            uptime_sec: 3_600.0,
            user_pct: Some(8.0),
            system_pct: Some(4.0),
        },
        mem: MemorySample {
            used_percent: 55.0,
            used_bytes: 8_000_000_000,
            total_bytes: 16_000_000_000,
            swap_used_percent: 0.0,
        },
        gpus: vec![GpuReading::Sample(GpuSample {
            index: 0,
            temp: 40.0,
            util: 5.0,
            power_w: 30.0,
            vram_used_mb: 512,
            vram_total_mb: 12_288,
            fan_percent: 0.0,
        })],
        disk: DiskSample { throughput: disk_tp, usage_percent: 64.0 },
        net: NetSample { throughput: net_tp },
        fans,
    }
}

#[test]
fn snapshots_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("hostpulse.db");

    {
        let mut store = MetricsStore::open(&db_path).unwrap();
        store.insert_snapshot(&snapshot_at(1_000)).unwrap();
        store.insert_snapshot(&snapshot_at(2_000)).unwrap();
    }

    // Reopening runs schema initialization again against a populated
    // database; it must converge without touching existing rows.
    let store = MetricsStore::open(&db_path).unwrap();
    let history = store.cpu_mem_history_since(0).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].ts, 1_000);
    assert_eq!(history[1].ts, 2_000);
    assert_eq!(history[0].total_util, Some(12.0));

    let gpus = store.gpu_history_since(0).unwrap();
    assert_eq!(gpus.len(), 2);
    assert_eq!(gpus[0].vram_total_mb, 12_288);
}

#[test]
fn concurrent_reader_sees_committed_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("hostpulse.db");

    let mut writer = MetricsStore::open(&db_path).unwrap();
    let reader = MetricsStore::open(&db_path).unwrap();

    writer.insert_snapshot(&snapshot_at(5_000)).unwrap();

    let history = reader.cpu_mem_history_since(0).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].ts, 5_000);
}

#[test]
fn purge_through_reopen_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("hostpulse.db");

    {
        let mut store = MetricsStore::open(&db_path).unwrap();
        for ts in [100, 200, 300] {
            store.insert_snapshot(&snapshot_at(ts)).unwrap();
        }
        let first = store.purge_before(250).unwrap();
        assert_eq!(first.cpu, 2);
    }

    let store = MetricsStore::open(&db_path).unwrap();
    let repeat = store.purge_before(250).unwrap();
    assert_eq!(repeat.total(), 0);

    let history = store.cpu_mem_history_since(0).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].ts, 300);
}
