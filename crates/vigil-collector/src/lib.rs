//! Host metric sampling for the vigil agent.
//!
//! Each sampler module gathers one category of system state (CPU, memory,
//! disk space, network throughput, disk I/O, latency). [`SystemSampler`]
//! composes them into the single [`MetricRecord`] the delivery pipeline
//! consumes each tick.

pub mod cpu;
pub mod disk;
pub mod diskio;
pub mod latency;
pub mod memory;
pub mod network;

use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use sysinfo::System;
use vigil_common::types::MetricRecord;

use crate::cpu::CpuSampler;
use crate::disk::DiskSampler;
use crate::diskio::DiskIoSampler;
use crate::latency::LatencyProbe;
use crate::memory::MemorySampler;
use crate::network::NetworkSampler;

/// Window between the two counter snapshots used for CPU, network, and
/// disk-I/O rates. Sampling blocks for this long on every call.
const COUNTER_WINDOW: Duration = Duration::from_secs(1);

/// Produces one immutable metric record per sampling tick.
///
/// Implementations are synchronous and infallible: a sampler that cannot
/// read a counter reports zero (or an absent latency) rather than failing
/// the tick.
pub trait SampleSource {
    fn sample(&mut self) -> MetricRecord;
}

/// Returns the host name reported by the operating system.
pub fn hostname() -> Option<String> {
    System::host_name()
}

/// The production [`SampleSource`]: reads live system state via `sysinfo`
/// plus an optional TCP latency probe.
pub struct SystemSampler {
    device_id: String,
    cpu: CpuSampler,
    memory: MemorySampler,
    disk: DiskSampler,
    network: NetworkSampler,
    disk_io: DiskIoSampler,
    latency: Option<LatencyProbe>,
}

impl SystemSampler {
    pub fn new(device_id: String, latency: Option<LatencyProbe>) -> Self {
        Self {
            device_id,
            cpu: CpuSampler::new(),
            memory: MemorySampler::new(),
            disk: DiskSampler::new(),
            network: NetworkSampler::new(),
            disk_io: DiskIoSampler::new(),
            latency,
        }
    }
}

impl SampleSource for SystemSampler {
    fn sample(&mut self) -> MetricRecord {
        self.cpu.prime();
        self.network.prime();
        self.disk_io.prime();

        let started = Instant::now();
        thread::sleep(COUNTER_WINDOW);
        let elapsed = started.elapsed();

        let cpu_usage = self.cpu.read();
        let (bytes_sent_per_sec, bytes_recv_per_sec) = self.network.read(elapsed);
        let (disk_read_bytes_per_sec, disk_write_bytes_per_sec) = self.disk_io.read(elapsed);

        MetricRecord {
            device_id: self.device_id.clone(),
            cpu_usage,
            memory_usage: self.memory.usage_percent(),
            disk_usage: self.disk.usage_percent(),
            bytes_sent_per_sec,
            bytes_recv_per_sec,
            system_uptime_seconds: System::uptime() as f64,
            disk_read_bytes_per_sec,
            disk_write_bytes_per_sec,
            latency_ms: self.latency.as_ref().and_then(LatencyProbe::measure),
            timestamp: Utc::now(),
        }
    }
}
