use std::path::Path;

use sysinfo::Disks;

pub struct DiskSampler {
    disks: Disks,
}

impl DiskSampler {
    pub fn new() -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
        }
    }

    /// Usage of the root filesystem in percent, falling back to the total
    /// across all mounts on hosts without a "/" mount point.
    pub fn usage_percent(&mut self) -> f64 {
        self.disks.refresh(true);

        let root = self
            .disks
            .iter()
            .find(|disk| disk.mount_point() == Path::new("/"));

        let (total, available) = match root {
            Some(disk) => (disk.total_space(), disk.available_space()),
            None => self
                .disks
                .iter()
                .fold((0u64, 0u64), |(total, available), disk| {
                    (
                        total + disk.total_space(),
                        available + disk.available_space(),
                    )
                }),
        };

        if total > 0 {
            (total.saturating_sub(available) as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}
