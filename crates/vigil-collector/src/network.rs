use std::time::Duration;

use sysinfo::Networks;

pub struct NetworkSampler {
    networks: Networks,
    prev_sent: u64,
    prev_recv: u64,
}

impl NetworkSampler {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
            prev_sent: 0,
            prev_recv: 0,
        }
    }

    /// Records the first counter snapshot, summed across all interfaces.
    pub fn prime(&mut self) {
        self.networks.refresh(true);
        let (sent, recv) = self.totals();
        self.prev_sent = sent;
        self.prev_recv = recv;
    }

    /// Takes the second snapshot and returns (bytes sent, bytes received)
    /// per second over the elapsed window.
    pub fn read(&mut self, elapsed: Duration) -> (u64, u64) {
        self.networks.refresh(true);
        let (sent, recv) = self.totals();
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return (0, 0);
        }
        (
            (sent.saturating_sub(self.prev_sent) as f64 / secs).round() as u64,
            (recv.saturating_sub(self.prev_recv) as f64 / secs).round() as u64,
        )
    }

    fn totals(&self) -> (u64, u64) {
        self.networks.iter().fold((0, 0), |(sent, recv), (_, data)| {
            (
                sent + data.total_transmitted(),
                recv + data.total_received(),
            )
        })
    }
}
