use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Measures round-trip latency as the time to open a TCP connection to a
/// configured `host:port` target.
pub struct LatencyProbe {
    target: String,
    timeout: Duration,
}

impl LatencyProbe {
    pub fn new(target: String, timeout: Duration) -> Self {
        Self { target, timeout }
    }

    /// Connect latency in milliseconds, or `None` when the target does not
    /// resolve or does not answer within the timeout.
    pub fn measure(&self) -> Option<f64> {
        let addr = match self.target.to_socket_addrs() {
            Ok(mut addrs) => addrs.next()?,
            Err(e) => {
                tracing::debug!(target = %self.target, error = %e, "latency probe target did not resolve");
                return None;
            }
        };

        let started = Instant::now();
        match TcpStream::connect_timeout(&addr, self.timeout) {
            Ok(_) => Some(started.elapsed().as_secs_f64() * 1000.0),
            Err(e) => {
                tracing::debug!(target = %self.target, error = %e, "latency probe target unreachable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn reachable_target_yields_latency() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let probe = LatencyProbe::new(addr.to_string(), Duration::from_secs(1));
        let latency = probe.measure().expect("listener should be reachable");
        assert!(latency >= 0.0);
    }

    #[test]
    fn unreachable_target_yields_none() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = LatencyProbe::new(addr.to_string(), Duration::from_millis(200));
        assert!(probe.measure().is_none());
    }

    #[test]
    fn unresolvable_target_yields_none() {
        let probe = LatencyProbe::new("not a host".to_string(), Duration::from_millis(200));
        assert!(probe.measure().is_none());
    }
}
