//! Host capability detection.

use serde::{Deserialize, Serialize};
use sysinfo::System;

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub cpu_cores: usize,
    pub total_memory_mb: u64,
    pub available_memory_mb: u64,
    pub accelerator: bool,
}

impl HardwareProfile {
    pub fn new(cpu_cores: usize, total_memory_mb: u64, available_memory_mb: u64, accelerator: bool) -> Self {
        Self {
            cpu_cores: cpu_cores.max(1),
            total_memory_mb,
            available_memory_mb,
            accelerator,
        }
    }

    /// Probe the host. `accelerator` overrides detection when set.
    pub fn detect(accelerator: Option<bool>) -> Self {
        let mut system = System::new();
        system.refresh_memory();
        let cores = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self::new(
            cores,
            system.total_memory() / BYTES_PER_MB,
            system.available_memory() / BYTES_PER_MB,
            accelerator.unwrap_or_else(accelerator_visible),
        )
    }

    /// Re-read available memory; the rest does not change at runtime.
    pub fn refresh(&mut self) {
        let mut system = System::new();
        system.refresh_memory();
        self.available_memory_mb = system.available_memory() / BYTES_PER_MB;
    }
}

/// A GPU is assumed when the CUDA runtime has devices assigned.
fn accelerator_visible() -> bool {
    std::env::var("CUDA_VISIBLE_DEVICES")
        .map(|v| !v.trim().is_empty() && v.trim() != "-1")
        .unwrap_or(false)
}
