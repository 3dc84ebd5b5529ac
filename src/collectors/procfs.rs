//! Linux procfs/sysfs readers for the bits sysinfo does not cover: CPU time
//! breakdown, cumulative disk byte counters, and fan tachometers.
//!
//! Parsers are generic over input text so tests feed literal fixtures. On
//! hosts without these files everything degrades to empty/zero readings
//! rather than erroring; a missing sensor is not a collection failure.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::snapshot::DiskCounters;

const PROC_STAT: &str = "/proc/stat";
const PROC_DISKSTATS: &str = "/proc/diskstats";
const HWMON_ROOT: &str = "/sys/class/hwmon";

/// Aggregate CPU jiffy counters from the `cpu` summary line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }
}

/// Percentage shares of CPU time since the previous sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuBreakdown {
    pub iowait_pct: f64,
    pub user_pct: Option<f64>,
    pub system_pct: Option<f64>,
}

/// Differentiates `/proc/stat` between ticks to produce percentage shares.
#[derive(Debug, Default)]
pub struct ProcStatTracker {
    last: Option<CpuTimes>,
}

impl ProcStatTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `/proc/stat` and return the share of each CPU state since the
    /// previous call. The first call (and any host without procfs) yields
    /// the zero breakdown.
    pub fn sample(&mut self) -> CpuBreakdown {
        let Some(current) = fs::read_to_string(PROC_STAT).ok().and_then(|s| parse_proc_stat(&s))
        else {
            return CpuBreakdown::default();
        };
        let previous = self.last.replace(current);
        match previous {
            Some(previous) => breakdown(previous, current),
            None => CpuBreakdown::default(),
        }
    }
}

/// Percentage shares over the delta between two jiffy readings.
fn breakdown(previous: CpuTimes, current: CpuTimes) -> CpuBreakdown {
    let total = current.total().saturating_sub(previous.total());
    if total == 0 {
        return CpuBreakdown::default();
    }
    let pct = |field: fn(&CpuTimes) -> u64| {
        field(&current).saturating_sub(field(&previous)) as f64 / total as f64 * 100.0
    };
    CpuBreakdown {
        iowait_pct: pct(|t| t.iowait),
        user_pct: Some(pct(|t| t.user)),
        system_pct: Some(pct(|t| t.system)),
    }
}

/// Parse the aggregate `cpu ` line out of `/proc/stat` text.
fn parse_proc_stat(text: &str) -> Option<CpuTimes> {
    let line = text.lines().find(|l| l.starts_with("cpu "))?;
    let mut fields = line.split_whitespace().skip(1).map(|f| f.parse::<u64>().unwrap_or(0));
    Some(CpuTimes {
        user: fields.next()?,
        nice: fields.next()?,
        system: fields.next()?,
        idle: fields.next()?,
        iowait: fields.next().unwrap_or(0),
        irq: fields.next().unwrap_or(0),
        softirq: fields.next().unwrap_or(0),
        steal: fields.next().unwrap_or(0),
    })
}

/// Cumulative read/write byte counters per whole disk from `/proc/diskstats`.
///
/// Counters are sectors x 512. Partitions are filtered out; the series
/// tracks whole devices.
pub fn read_disk_counters() -> BTreeMap<String, DiskCounters> {
    fs::read_to_string(PROC_DISKSTATS).map(|s| parse_diskstats(&s)).unwrap_or_default()
}

fn parse_diskstats(text: &str) -> BTreeMap<String, DiskCounters> {
    let mut counters = BTreeMap::new();
    for line in text.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 {
            continue;
        }
        let device = parts[2];
        if is_partition(device) || device.starts_with("loop") || device.starts_with("ram") {
            continue;
        }
        let read_sectors: u64 = parts[5].parse().unwrap_or(0);
        let written_sectors: u64 = parts[9].parse().unwrap_or(0);
        counters.insert(device.to_string(), DiskCounters {
            read_bytes: read_sectors * 512,
            write_bytes: written_sectors * 512,
        });
    }
    counters
}

/// Whether a diskstats device name is a partition (or mapped volume) rather
/// than a whole disk: `sda1`, `vdb2`, `nvme0n1p3`, `dm-0`.
fn is_partition(name: &str) -> bool {
    if let Some(rest) = name.strip_prefix("dm-") {
        return !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit());
    }
    if name.starts_with("nvme") || name.starts_with("mmcblk") {
        return match name.rsplit_once('p') {
            Some((_, suffix)) => !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()),
            None => false,
        };
    }
    if name.starts_with("sd") || name.starts_with("vd") || name.starts_with("hd") {
        return name.bytes().last().is_some_and(|b| b.is_ascii_digit());
    }
    false
}

/// Fan RPM per label from `/sys/class/hwmon`.
///
/// Labels come from `fanN_label` when the driver provides one, otherwise
/// `<chip>/fanN`.
pub fn read_fans() -> BTreeMap<String, f64> {
    read_fans_from(Path::new(HWMON_ROOT))
}

fn read_fans_from(root: &Path) -> BTreeMap<String, f64> {
    let mut fans = BTreeMap::new();
    let Ok(chips) = fs::read_dir(root) else { return fans };

    for chip in chips.flatten() {
        let chip_path = chip.path();
        let chip_name = fs::read_to_string(chip_path.join("name"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| chip.file_name().to_string_lossy().into_owned());

        let Ok(entries) = fs::read_dir(&chip_path) else { continue };
        for entry in entries.flatten() {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(fan) = file_name.strip_suffix("_input") else { continue };
            if !fan.starts_with("fan") {
                continue;
            }
            let Some(rpm) = fs::read_to_string(entry.path())
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok())
            else {
                continue;
            };
            let label = fs::read_to_string(chip_path.join(format!("{fan}_label")))
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|_| format!("{chip_name}/{fan}"));
            fans.insert(label, rpm);
        }
    }
    fans
}
