//! The snapshot data model.
//!
//! A [`Snapshot`] is one timestamped bundle of all subsystem readings for a
//! single sampling tick. Every series row the store derives from a snapshot
//! shares the snapshot's `ts`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// CPU readings for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuSample {
    /// Total utilization across all cores, percent.
    pub total_util: f64,
    /// Time spent waiting on IO, percent.
    pub iowait: f64,
    /// Per-core utilization, percent.
    pub per_core: Vec<f64>,
    /// Package temperature in Celsius, when a sensor is present.
    pub temp: Option<f64>,
    /// 1-minute load average.
    pub load1: f64,
    /// 5-minute load average.
    pub load5: f64,
    /// 15-minute load average.
    pub load15: f64,
    /// Host uptime in seconds.
    pub uptime_sec: f64,
    /// User-mode share of CPU time, percent.
    pub user_pct: Option<f64>,
    /// Kernel-mode share of CPU time, percent.
    pub system_pct: Option<f64>,
}

/// Memory readings for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySample {
    /// Used physical memory, percent of total.
    pub used_percent: f64,
    /// Used physical memory in bytes.
    pub used_bytes: u64,
    /// Total physical memory in bytes.
    pub total_bytes: u64,
    /// Used swap, percent of total swap.
    pub swap_used_percent: f64,
}

/// One GPU's telemetry for a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuSample {
    /// Device index as enumerated by the driver.
    pub index: u32,
    /// Core temperature in Celsius.
    pub temp: f64,
    /// Utilization, percent.
    pub util: f64,
    /// Power draw in watts.
    pub power_w: f64,
    /// VRAM in use, megabytes.
    pub vram_used_mb: i64,
    /// Total VRAM, megabytes.
    pub vram_total_mb: i64,
    /// Fan duty cycle, percent.
    pub fan_percent: f64,
}

/// A per-GPU reading: either a full sample or an explicit failure marker.
///
/// Failed entries are skipped individually at insert time; one unreadable
/// device never aborts the rest of the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GpuReading {
    Sample(GpuSample),
    Failed { index: u32, reason: String },
}

impl GpuReading {
    /// The sample, if this reading succeeded.
    pub fn as_sample(&self) -> Option<&GpuSample> {
        match self {
            GpuReading::Sample(s) => Some(s),
            GpuReading::Failed { .. } => None,
        }
    }
}

/// Derived disk throughput for one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskThroughput {
    pub read_bps: f64,
    pub write_bps: f64,
}

/// Derived network throughput for one interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetThroughput {
    pub rx_bps: f64,
    pub tx_bps: f64,
}

/// Disk readings for one tick: per-device derived throughput plus the shared
/// root filesystem usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskSample {
    pub throughput: BTreeMap<String, DiskThroughput>,
    pub usage_percent: f64,
}

/// Network readings for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetSample {
    pub throughput: BTreeMap<String, NetThroughput>,
}

/// Cumulative disk byte counters, as read from the OS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskCounters {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Cumulative network byte counters, as read from the OS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Raw output of a [`MetricsSource`](crate::sampler::MetricsSource) tick.
///
/// Disk and network carry cumulative counters; the sampler differentiates
/// them into per-second rates before assembling the [`Snapshot`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReading {
    pub cpu: CpuSample,
    pub mem: MemorySample,
    pub gpus: Vec<GpuReading>,
    pub disk_counters: BTreeMap<String, DiskCounters>,
    pub disk_usage_percent: f64,
    pub net_counters: BTreeMap<String, NetCounters>,
    pub fans: BTreeMap<String, f64>,
}

/// One complete, timestamped sample instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Epoch seconds, shared by every row derived from this tick.
    pub ts: i64,
    pub cpu: CpuSample,
    pub mem: MemorySample,
    pub gpus: Vec<GpuReading>,
    pub disk: DiskSample,
    pub net: NetSample,
    /// Fan RPM by sensor label.
    pub fans: BTreeMap<String, f64>,
}

impl Snapshot {
    /// Compose a snapshot from a raw reading plus the rates derived from its
    /// cumulative counters.
    ///
    /// Devices and interfaces on their first observation have no derived rate
    /// yet and are simply absent from the throughput maps.
    pub fn assemble(
        ts: i64,
        raw: RawReading,
        disk_throughput: BTreeMap<String, DiskThroughput>,
        net_throughput: BTreeMap<String, NetThroughput>,
    ) -> Self {
        Snapshot {
            ts,
            cpu: raw.cpu,
            mem: raw.mem,
            gpus: raw.gpus,
            disk: DiskSample { throughput: disk_throughput, usage_percent: raw.disk_usage_percent },
            net: NetSample { throughput: net_throughput },
            fans: raw.fans,
        }
    }

    /// Iterator over the valid GPU samples, skipping failure markers.
    pub fn valid_gpus(&self) -> impl Iterator<Item = &GpuSample> {
        self.gpus.iter().filter_map(GpuReading::as_sample)
    }
}
