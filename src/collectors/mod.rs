//! The default metrics source: host readings via sysinfo and procfs, GPU
//! readings via NVML.
//!
//! Cumulative disk/network counters are returned raw; differentiating them
//! into rates is the sampler's job.

mod gpu;
mod procfs;

pub use gpu::GpuProbe;
pub use procfs::{read_disk_counters, read_fans, ProcStatTracker};

use async_trait::async_trait;
use sysinfo::{Components, Disks, Networks, System};

use crate::error::Result;
use crate::sampler::MetricsSource;
use crate::snapshot::{CpuSample, MemorySample, NetCounters, RawReading};

/// Live host/GPU metrics source.
pub struct SystemSource {
    system: System,
    networks: Networks,
    disks: Disks,
    components: Components,
    proc_stat: ProcStatTracker,
    gpu: GpuProbe,
}

impl SystemSource {
    pub fn new() -> Self {
        let mut system = System::new();
        // Prime the usage counters so the first real tick has a delta to
        // measure against.
        system.refresh_memory();
        system.refresh_cpu_usage();

        SystemSource {
            system,
            networks: Networks::new_with_refreshed_list(),
            disks: Disks::new_with_refreshed_list(),
            components: Components::new_with_refreshed_list(),
            proc_stat: ProcStatTracker::new(),
            gpu: GpuProbe::init(),
        }
    }

    fn cpu_sample(&mut self) -> CpuSample {
        let breakdown = self.proc_stat.sample();
        let load = System::load_average();
        CpuSample {
            total_util: f64::from(self.system.global_cpu_usage()),
            iowait: breakdown.iowait_pct,
            per_core: self.system.cpus().iter().map(|cpu| f64::from(cpu.cpu_usage())).collect(),
            temp: self.cpu_temperature(),
            load1: load.one,
            load5: load.five,
            load15: load.fifteen,
            uptime_sec: System::uptime() as f64,
            user_pct: breakdown.user_pct,
            system_pct: breakdown.system_pct,
        }
    }

    fn cpu_temperature(&self) -> Option<f64> {
        self.components
            .iter()
            .find(|c| {
                let label = c.label().to_ascii_lowercase();
                label.contains("package") || label.contains("tctl") || label.contains("cpu")
            })
            .and_then(|c| c.temperature())
            .map(f64::from)
    }

    fn memory_sample(&self) -> MemorySample {
        let total = self.system.total_memory();
        let used = self.system.used_memory();
        let swap_total = self.system.total_swap();
        let swap_used = self.system.used_swap();
        MemorySample {
            used_percent: percent(used, total),
            used_bytes: used,
            total_bytes: total,
            swap_used_percent: percent(swap_used, swap_total),
        }
    }

    /// Usage of the root filesystem, or the largest mounted one when no `/`
    /// mount is visible (containers).
    fn root_usage_percent(&self) -> f64 {
        let root = self
            .disks
            .list()
            .iter()
            .find(|d| d.mount_point() == std::path::Path::new("/"))
            .or_else(|| self.disks.list().iter().max_by_key(|d| d.total_space()));
        match root {
            Some(disk) if disk.total_space() > 0 => {
                percent(disk.total_space() - disk.available_space(), disk.total_space())
            },
            _ => 0.0,
        }
    }
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSource for SystemSource {
    async fn read(&mut self) -> Result<RawReading> {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.networks.refresh(true);
        self.disks.refresh(true);
        self.components.refresh(true);

        let mut net_counters = std::collections::BTreeMap::new();
        for (name, data) in self.networks.iter() {
            if name.as_str() == "lo" {
                continue;
            }
            net_counters.insert(name.clone(), NetCounters {
                rx_bytes: data.total_received(),
                tx_bytes: data.total_transmitted(),
            });
        }

        Ok(RawReading {
            cpu: self.cpu_sample(),
            mem: self.memory_sample(),
            gpus: self.gpu.read(),
            disk_counters: read_disk_counters(),
            disk_usage_percent: self.root_usage_percent(),
            net_counters,
            fans: read_fans(),
        })
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_guards_zero_division() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(1, 4), 25.0);
    }
}
