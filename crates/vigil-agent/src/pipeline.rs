use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use vigil_collector::SampleSource;
use vigil_common::types::MetricRecord;

use crate::auth::{Credential, CredentialSource};
use crate::batcher::Batcher;
use crate::delivery::{Deliver, DeliveryOutcome};
use crate::error::AgentError;
use crate::queue::{DurableQueue, QueueStore};

/// Discrete pipeline observations, emitted through an [`EventSink`] instead
/// of ambient logging calls scattered through the control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    FlushStarted { pending: usize },
    FlushCompleted { delivered: usize, remaining: usize },
    QueueError { detail: String },
    BatchReady { size: usize },
    DeliveryAccepted { records: usize },
    DeliveryFailed { records: usize },
    RecordRequeued,
    RecordDropped { detail: String },
    AuthRefreshed,
    AuthFailed { detail: String },
    TickSkipped,
}

pub trait EventSink {
    fn emit(&self, event: PipelineEvent);
}

/// The production sink: maps pipeline events onto the log stream.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::FlushStarted { pending } => {
                tracing::info!(pending, "flushing durable queue");
            }
            PipelineEvent::FlushCompleted {
                delivered,
                remaining,
            } => {
                tracing::info!(delivered, remaining, "queue flush finished");
            }
            PipelineEvent::QueueError { detail } => {
                tracing::warn!(detail = %detail, "durable queue failure");
            }
            PipelineEvent::BatchReady { size } => {
                tracing::debug!(size, "batch threshold reached");
            }
            PipelineEvent::DeliveryAccepted { records } => {
                tracing::info!(records, "batch delivered");
            }
            PipelineEvent::DeliveryFailed { records } => {
                tracing::warn!(records, "batch delivery failed, re-enqueueing");
            }
            PipelineEvent::RecordRequeued => {
                tracing::debug!("record parked in durable queue");
            }
            PipelineEvent::RecordDropped { detail } => {
                tracing::warn!(detail = %detail, "record dropped, queue storage unavailable");
            }
            PipelineEvent::AuthRefreshed => {
                tracing::info!("obtained collector credential");
            }
            PipelineEvent::AuthFailed { detail } => {
                tracing::warn!(detail = %detail, "credential refresh failed");
            }
            PipelineEvent::TickSkipped => {
                tracing::warn!("skipping remainder of tick, no usable credential");
            }
        }
    }
}

/// Orchestrates one sampling/delivery tick: flush the durable queue, sample,
/// batch, deliver, and park failed batches back in the queue.
///
/// Fully synchronous; every collaborator is a seam so the tick algorithm is
/// testable with scripted fakes.
pub struct Controller<Q, D, C, S>
where
    Q: QueueStore,
    D: Deliver,
    C: CredentialSource,
    S: SampleSource,
{
    queue: DurableQueue<Q>,
    delivery: D,
    credentials: C,
    sampler: S,
    batcher: Batcher,
    sink: Box<dyn EventSink>,
    interval: Duration,
    credential: Option<Credential>,
}

impl<Q, D, C, S> Controller<Q, D, C, S>
where
    Q: QueueStore,
    D: Deliver,
    C: CredentialSource,
    S: SampleSource,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: DurableQueue<Q>,
        delivery: D,
        credentials: C,
        sampler: S,
        batcher: Batcher,
        sink: Box<dyn EventSink>,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            delivery,
            credentials,
            sampler,
            batcher,
            sink,
            interval,
            credential: None,
        }
    }

    /// Blocking startup authentication. The caller treats failure as fatal:
    /// the agent has no useful unauthenticated mode.
    pub fn authenticate(&mut self) -> Result<(), AgentError> {
        match self.credentials.obtain() {
            Ok(credential) => {
                self.credential = Some(credential);
                self.sink.emit(PipelineEvent::AuthRefreshed);
                Ok(())
            }
            Err(e) => {
                self.sink.emit(PipelineEvent::AuthFailed {
                    detail: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Runs ticks until `running` flips false, then force-flushes whatever
    /// the batcher still holds.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), AgentError> {
        self.authenticate()?;

        while running.load(Ordering::SeqCst) {
            self.run_tick();
            self.sleep_until_next_tick(running);
        }

        self.shutdown_flush();
        Ok(())
    }

    pub fn run_tick(&mut self) {
        if !self.flush_queue() {
            self.sink.emit(PipelineEvent::TickSkipped);
            return;
        }

        let record = self.sampler.sample();
        if !self.batcher.add(record) {
            return;
        }

        self.sink.emit(PipelineEvent::BatchReady {
            size: self.batcher.len(),
        });
        let batch = self.batcher.drain_all();
        self.deliver_batch(batch);
    }

    /// Drains the durable queue with single-record sends. Returns false when
    /// the tick should stop here (an auth rejection surfaced and no fresh
    /// credential could be obtained).
    fn flush_queue(&mut self) -> bool {
        let Some(credential) = self.credential.clone() else {
            return self.refresh_credential().is_some();
        };

        let pending = match self.queue.pending() {
            Ok(pending) => pending,
            Err(e) => {
                self.sink.emit(PipelineEvent::QueueError {
                    detail: e.to_string(),
                });
                return true;
            }
        };
        if pending == 0 {
            return true;
        }

        self.sink.emit(PipelineEvent::FlushStarted { pending });

        let delivery = &self.delivery;
        let report = self
            .queue
            .drain_attempt(|batch| delivery.send(batch, &credential));

        let report = match report {
            Ok(report) => report,
            Err(e) => {
                self.sink.emit(PipelineEvent::QueueError {
                    detail: e.to_string(),
                });
                return true;
            }
        };

        self.sink.emit(PipelineEvent::FlushCompleted {
            delivered: report.delivered,
            remaining: report.remaining,
        });

        if report.auth_rejected {
            // The queued records stay put; next tick retries them with the
            // fresh credential.
            return self.refresh_credential().is_some();
        }
        true
    }

    fn deliver_batch(&mut self, batch: Vec<MetricRecord>) {
        let Some(credential) = self.credential.clone() else {
            self.requeue(batch);
            return;
        };

        let mut outcome = self.delivery.send(&batch, &credential);
        if outcome == DeliveryOutcome::AuthRejected {
            // One refresh, one resend. A second rejection falls through to
            // the durable queue.
            if let Some(fresh) = self.refresh_credential() {
                outcome = self.delivery.send(&batch, &fresh);
            }
        }

        match outcome {
            DeliveryOutcome::Accepted => {
                self.sink.emit(PipelineEvent::DeliveryAccepted {
                    records: batch.len(),
                });
            }
            DeliveryOutcome::AuthRejected | DeliveryOutcome::Failed => {
                self.sink.emit(PipelineEvent::DeliveryFailed {
                    records: batch.len(),
                });
                self.requeue(batch);
            }
        }
    }

    fn refresh_credential(&mut self) -> Option<Credential> {
        match self.credentials.obtain() {
            Ok(credential) => {
                self.credential = Some(credential.clone());
                self.sink.emit(PipelineEvent::AuthRefreshed);
                Some(credential)
            }
            Err(e) => {
                self.sink.emit(PipelineEvent::AuthFailed {
                    detail: e.to_string(),
                });
                None
            }
        }
    }

    fn requeue(&mut self, batch: Vec<MetricRecord>) {
        for record in batch {
            match self.queue.append(record) {
                Ok(()) => self.sink.emit(PipelineEvent::RecordRequeued),
                Err(e) => {
                    // Single-tier durability: nothing to fall back to.
                    self.sink.emit(PipelineEvent::RecordDropped {
                        detail: e.to_string(),
                    });
                }
            }
        }
    }

    fn shutdown_flush(&mut self) {
        let batch = self.batcher.drain_all();
        if batch.is_empty() {
            return;
        }
        self.deliver_batch(batch);
    }

    fn sleep_until_next_tick(&self, running: &AtomicBool) {
        let deadline = Instant::now() + self.interval;
        while running.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(200));
        }
    }
}
