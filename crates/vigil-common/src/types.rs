use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sampled snapshot of host health, produced per tick and delivered to
/// the collector.
///
/// Field names serialize in the camelCase form the collector's HTTP API
/// expects. `latency_ms` is omitted from the JSON entirely when the probe
/// target was unreachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub device_id: String,
    /// Global CPU usage in percent (0-100).
    pub cpu_usage: f64,
    /// Memory usage in percent (0-100).
    pub memory_usage: f64,
    /// Root filesystem usage in percent (0-100).
    pub disk_usage: f64,
    pub bytes_sent_per_sec: u64,
    pub bytes_recv_per_sec: u64,
    pub system_uptime_seconds: f64,
    pub disk_read_bytes_per_sec: u64,
    pub disk_write_bytes_per_sec: u64,
    /// Round-trip time to the configured probe target, absent when the
    /// target did not answer within the probe timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    pub timestamp: DateTime<Utc>,
}
