//! NVIDIA GPU readings via NVML.
//!
//! NVML is loaded once at startup; hosts without the driver simply report no
//! GPUs. A device that fails mid-read yields an explicit
//! [`GpuReading::Failed`] marker so the rest of the snapshot is unaffected.

use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::error::NvmlError;
use nvml_wrapper::Nvml;
use tracing::warn;

use crate::snapshot::{GpuReading, GpuSample};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Holds the NVML handle for the process lifetime.
pub struct GpuProbe {
    nvml: Option<Nvml>,
}

impl GpuProbe {
    /// Initialize NVML. Failure (no NVIDIA driver, no GPUs) is not an
    /// error: the probe reports an empty device list instead.
    pub fn init() -> Self {
        let nvml = match Nvml::init() {
            Ok(nvml) => Some(nvml),
            Err(e) => {
                warn!(error = %e, "NVML unavailable; GPU telemetry disabled");
                None
            },
        };
        GpuProbe { nvml }
    }

    /// One reading per enumerated device, valid or explicitly failed.
    pub fn read(&self) -> Vec<GpuReading> {
        let Some(nvml) = &self.nvml else { return Vec::new() };
        let count = nvml.device_count().unwrap_or(0);
        (0..count).map(|index| read_device(nvml, index)).collect()
    }
}

fn read_device(nvml: &Nvml, index: u32) -> GpuReading {
    match try_read_device(nvml, index) {
        Ok(sample) => GpuReading::Sample(sample),
        Err(e) => GpuReading::Failed { index, reason: e.to_string() },
    }
}

fn try_read_device(nvml: &Nvml, index: u32) -> Result<GpuSample, NvmlError> {
    let device = nvml.device_by_index(index)?;
    let util = device.utilization_rates()?.gpu as f64;
    let temp = device.temperature(TemperatureSensor::Gpu)? as f64;
    let power_w = device.power_usage()? as f64 / 1000.0;
    let memory = device.memory_info()?;
    // Not every board has a fan (passive datacenter cards); report zero.
    let fan_percent = device.fan_speed(0).map(f64::from).unwrap_or(0.0);

    Ok(GpuSample {
        index,
        temp,
        util,
        power_w,
        vram_used_mb: (memory.used / BYTES_PER_MB) as i64,
        vram_total_mb: (memory.total / BYTES_PER_MB) as i64,
        fan_percent,
    })
}
