use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use vigil_common::types::MetricRecord;

use crate::delivery::DeliveryOutcome;
use crate::error::AgentError;

/// Persistence boundary for the durable queue, so the storage medium is
/// swappable without touching drain logic.
pub trait QueueStore {
    /// The persisted sequence. An absent backing file is an empty queue;
    /// unparseable content is discarded and treated as empty.
    fn load(&self) -> Result<Vec<MetricRecord>, AgentError>;
    fn save(&self, records: &[MetricRecord]) -> Result<(), AgentError>;
    /// Removes the backing storage entirely, not just its contents.
    fn clear(&self) -> Result<(), AgentError>;
}

/// The shipped store: one JSON file holding the full record sequence.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl QueueStore for JsonFileStore {
    fn load(&self) -> Result<Vec<MetricRecord>, AgentError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AgentError::Storage(e)),
        };

        match serde_json::from_str(&content) {
            Ok(records) => Ok(records),
            Err(e) => {
                // Documented data loss: a corrupt queue resets to empty.
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "queue file unparseable, discarding it"
                );
                if let Err(e) = fs::remove_file(&self.path) {
                    tracing::warn!(error = %e, "failed to remove corrupt queue file");
                }
                Ok(Vec::new())
            }
        }
    }

    fn save(&self, records: &[MetricRecord]) -> Result<(), AgentError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_string(records)?;
        fs::write(&self.path, body)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), AgentError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AgentError::Storage(e)),
        }
    }
}

/// What a drain pass accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub remaining: usize,
    /// A record hit an authentication rejection; draining halted there.
    pub auth_rejected: bool,
}

/// Disk-backed queue of records accepted but not yet confirmed delivered.
///
/// No deduplication: a crash between collector acknowledgment and queue
/// rewrite redelivers the acknowledged records on the next drain.
pub struct DurableQueue<S: QueueStore> {
    store: S,
}

impl<S: QueueStore> DurableQueue<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Appends one record to the tail, persisting the full updated sequence
    /// before returning. On a storage error the record is the caller's to
    /// drop; there is no secondary durable tier.
    pub fn append(&self, record: MetricRecord) -> Result<(), AgentError> {
        let mut records = self.store.load()?;
        records.push(record);
        self.store.save(&records)
    }

    pub fn pending(&self) -> Result<usize, AgentError> {
        Ok(self.store.load()?.len())
    }

    /// Attempts redelivery of every queued record in original order, one
    /// single-record batch at a time.
    ///
    /// Accepted records are removed. The first `AuthRejected` halts the pass
    /// (the stale credential would fail every remaining record the same way)
    /// and keeps that record plus all unattempted ones. A `Failed` record is
    /// kept and the pass moves on. When nothing remains the backing file is
    /// removed.
    pub fn drain_attempt<F>(&self, mut deliver: F) -> Result<DrainReport, AgentError>
    where
        F: FnMut(&[MetricRecord]) -> DeliveryOutcome,
    {
        let records = self.store.load()?;
        if records.is_empty() {
            return Ok(DrainReport {
                delivered: 0,
                remaining: 0,
                auth_rejected: false,
            });
        }

        let mut kept = Vec::new();
        let mut delivered = 0usize;
        let mut auth_rejected = false;

        let mut iter = records.into_iter();
        while let Some(record) = iter.next() {
            match deliver(std::slice::from_ref(&record)) {
                DeliveryOutcome::Accepted => delivered += 1,
                DeliveryOutcome::AuthRejected => {
                    auth_rejected = true;
                    kept.push(record);
                    kept.extend(iter);
                    break;
                }
                DeliveryOutcome::Failed => kept.push(record),
            }
        }

        let remaining = kept.len();
        if kept.is_empty() {
            self.store.clear()?;
        } else {
            self.store.save(&kept)?;
        }

        Ok(DrainReport {
            delivered,
            remaining,
            auth_rejected,
        })
    }
}
