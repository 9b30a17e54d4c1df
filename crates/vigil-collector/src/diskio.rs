use std::time::Duration;

use sysinfo::Disks;

pub struct DiskIoSampler {
    disks: Disks,
    prev_read: u64,
    prev_written: u64,
}

impl DiskIoSampler {
    pub fn new() -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
            prev_read: 0,
            prev_written: 0,
        }
    }

    /// Records the first I/O counter snapshot, summed across all disks.
    pub fn prime(&mut self) {
        self.disks.refresh(true);
        let (read, written) = self.totals();
        self.prev_read = read;
        self.prev_written = written;
    }

    /// Takes the second snapshot and returns (read, written) bytes per
    /// second over the elapsed window.
    pub fn read(&mut self, elapsed: Duration) -> (u64, u64) {
        self.disks.refresh(true);
        let (read, written) = self.totals();
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return (0, 0);
        }
        (
            (read.saturating_sub(self.prev_read) as f64 / secs).round() as u64,
            (written.saturating_sub(self.prev_written) as f64 / secs).round() as u64,
        )
    }

    fn totals(&self) -> (u64, u64) {
        self.disks.iter().fold((0, 0), |(read, written), disk| {
            let usage = disk.usage();
            (
                read + usage.total_read_bytes,
                written + usage.total_written_bytes,
            )
        })
    }
}
