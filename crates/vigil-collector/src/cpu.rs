use sysinfo::System;

pub struct CpuSampler {
    system: System,
}

impl CpuSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self { system }
    }

    /// Takes the first of the two usage snapshots.
    pub fn prime(&mut self) {
        self.system.refresh_cpu_usage();
    }

    /// Takes the second snapshot and returns global CPU usage in percent.
    /// Only meaningful once at least `sysinfo::MINIMUM_CPU_UPDATE_INTERVAL`
    /// has passed since [`CpuSampler::prime`].
    pub fn read(&mut self) -> f64 {
        self.system.refresh_cpu_usage();
        self.system.global_cpu_usage() as f64
    }
}
