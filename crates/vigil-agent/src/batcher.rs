use vigil_common::types::MetricRecord;

/// Accumulates records until the configured threshold, amortizing one
/// authenticated round trip over several samples.
pub struct Batcher {
    records: Vec<MetricRecord>,
    threshold: usize,
}

impl Batcher {
    pub fn new(threshold: usize) -> Self {
        Self {
            records: Vec::new(),
            threshold: threshold.max(1),
        }
    }

    /// Appends a record and reports whether the batch has reached the
    /// threshold and should be flushed.
    pub fn add(&mut self, record: MetricRecord) -> bool {
        self.records.push(record);
        self.records.len() >= self.threshold
    }

    /// Returns and clears the current batch. Also the forced-flush hook used
    /// at graceful shutdown.
    pub fn drain_all(&mut self) -> Vec<MetricRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
