use std::cell::Cell;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::rc::Rc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;

use crate::auth::{Credential, CredentialSource};
use crate::batcher::Batcher;
use crate::delivery::{classify_status, Deliver, DeliveryOutcome, RetryPolicy};
use crate::error::AgentError;
use crate::pipeline::{Controller, EventSink, PipelineEvent};
use crate::queue::{DurableQueue, JsonFileStore, QueueStore};
use vigil_collector::SampleSource;
use vigil_common::types::MetricRecord;

fn record(device: &str) -> MetricRecord {
    MetricRecord {
        device_id: device.to_string(),
        cpu_usage: 12.5,
        memory_usage: 40.0,
        disk_usage: 63.0,
        bytes_sent_per_sec: 1_000,
        bytes_recv_per_sec: 2_000,
        system_uptime_seconds: 3_600.0,
        disk_read_bytes_per_sec: 512,
        disk_write_bytes_per_sec: 1_024,
        latency_ms: Some(2.0),
        timestamp: Utc::now(),
    }
}

// ---- scripted fakes for the pipeline seams ----

#[derive(Clone)]
struct ScriptedDeliver {
    outcomes: Rc<RefCell<VecDeque<DeliveryOutcome>>>,
    /// (batch size, bearer token) per send call.
    calls: Rc<RefCell<Vec<(usize, String)>>>,
}

impl ScriptedDeliver {
    fn new(outcomes: &[DeliveryOutcome]) -> Self {
        Self {
            outcomes: Rc::new(RefCell::new(outcomes.iter().copied().collect())),
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl Deliver for ScriptedDeliver {
    fn send(&self, batch: &[MetricRecord], credential: &Credential) -> DeliveryOutcome {
        self.calls
            .borrow_mut()
            .push((batch.len(), credential.token().to_string()));
        self.outcomes
            .borrow_mut()
            .pop_front()
            .expect("unexpected delivery call")
    }
}

#[derive(Clone)]
struct FakeCredentials {
    /// `None` entries simulate a failed login exchange.
    tokens: Rc<RefCell<VecDeque<Option<&'static str>>>>,
    obtained: Rc<Cell<usize>>,
}

impl FakeCredentials {
    fn new(tokens: &[Option<&'static str>]) -> Self {
        Self {
            tokens: Rc::new(RefCell::new(tokens.iter().copied().collect())),
            obtained: Rc::new(Cell::new(0)),
        }
    }
}

impl CredentialSource for FakeCredentials {
    fn obtain(&self) -> Result<Credential, AgentError> {
        self.obtained.set(self.obtained.get() + 1);
        match self
            .tokens
            .borrow_mut()
            .pop_front()
            .expect("unexpected credential request")
        {
            Some(token) => Ok(Credential::new(token.to_string())),
            None => Err(AgentError::Auth("scripted login failure".to_string())),
        }
    }
}

struct FakeSampler {
    records: Rc<RefCell<VecDeque<MetricRecord>>>,
}

impl FakeSampler {
    fn new(records: Vec<MetricRecord>) -> Self {
        Self {
            records: Rc::new(RefCell::new(records.into())),
        }
    }
}

impl SampleSource for FakeSampler {
    fn sample(&mut self) -> MetricRecord {
        self.records
            .borrow_mut()
            .pop_front()
            .expect("unexpected sample request")
    }
}

struct RecordingSink {
    events: Rc<RefCell<Vec<PipelineEvent>>>,
}

impl EventSink for RecordingSink {
    fn emit(&self, event: PipelineEvent) {
        self.events.borrow_mut().push(event);
    }
}

struct Harness {
    controller: Controller<JsonFileStore, ScriptedDeliver, FakeCredentials, FakeSampler>,
    deliver: ScriptedDeliver,
    credentials: FakeCredentials,
    samples: Rc<RefCell<VecDeque<MetricRecord>>>,
    events: Rc<RefCell<Vec<PipelineEvent>>>,
    queue_path: std::path::PathBuf,
}

fn harness(
    dir: &TempDir,
    batch_size: usize,
    outcomes: &[DeliveryOutcome],
    tokens: &[Option<&'static str>],
    samples: Vec<MetricRecord>,
) -> Harness {
    let queue_path = dir.path().join("queue.json");
    let deliver = ScriptedDeliver::new(outcomes);
    let credentials = FakeCredentials::new(tokens);
    let sampler = FakeSampler::new(samples);
    let sample_handle = sampler.records.clone();
    let events = Rc::new(RefCell::new(Vec::new()));

    let controller = Controller::new(
        DurableQueue::new(JsonFileStore::new(&queue_path)),
        deliver.clone(),
        credentials.clone(),
        sampler,
        Batcher::new(batch_size),
        Box::new(RecordingSink {
            events: events.clone(),
        }),
        Duration::ZERO,
    );

    Harness {
        controller,
        deliver,
        credentials,
        samples: sample_handle,
        events,
        queue_path,
    }
}

fn has_event(events: &Rc<RefCell<Vec<PipelineEvent>>>, wanted: &PipelineEvent) -> bool {
    events.borrow().iter().any(|event| event == wanted)
}

// ---- durable queue ----

#[test]
fn drain_removes_file_when_all_records_succeed() {
    let dir = TempDir::new().unwrap();
    let queue = DurableQueue::new(JsonFileStore::new(dir.path().join("queue.json")));

    queue.append(record("r1")).unwrap();
    queue.append(record("r2")).unwrap();
    assert!(dir.path().join("queue.json").exists());

    let report = queue.drain_attempt(|_| DeliveryOutcome::Accepted).unwrap();

    assert_eq!(report.delivered, 2);
    assert_eq!(report.remaining, 0);
    assert!(!report.auth_rejected);
    assert!(!dir.path().join("queue.json").exists());
}

#[test]
fn corrupt_queue_file_resets_to_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("queue.json");
    fs::write(&path, "{ not json").unwrap();

    let queue = DurableQueue::new(JsonFileStore::new(&path));
    let report = queue
        .drain_attempt(|_| panic!("corrupt queue must not deliver anything"))
        .unwrap();

    assert_eq!(report.delivered, 0);
    assert_eq!(report.remaining, 0);
    assert!(!path.exists());
}

#[test]
fn drain_halts_on_auth_rejection_and_keeps_the_rest() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path().join("queue.json"));
    store
        .save(&[record("r1"), record("r2"), record("r3")])
        .unwrap();

    let queue = DurableQueue::new(JsonFileStore::new(dir.path().join("queue.json")));
    let mut outcomes =
        VecDeque::from([DeliveryOutcome::Accepted, DeliveryOutcome::AuthRejected]);
    let mut attempts = 0usize;

    let report = queue
        .drain_attempt(|batch| {
            assert_eq!(batch.len(), 1);
            attempts += 1;
            outcomes.pop_front().expect("r3 must not be attempted")
        })
        .unwrap();

    assert_eq!(attempts, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.remaining, 2);
    assert!(report.auth_rejected);

    let kept = store.load().unwrap();
    assert_eq!(kept[0].device_id, "r2");
    assert_eq!(kept[1].device_id, "r3");
}

#[test]
fn drain_keeps_failed_record_and_continues() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path().join("queue.json"));
    store.save(&[record("r1"), record("r2")]).unwrap();

    let queue = DurableQueue::new(JsonFileStore::new(dir.path().join("queue.json")));
    let mut outcomes = VecDeque::from([DeliveryOutcome::Failed, DeliveryOutcome::Accepted]);

    let report = queue
        .drain_attempt(|_| outcomes.pop_front().unwrap())
        .unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(report.remaining, 1);
    assert!(!report.auth_rejected);

    let kept = store.load().unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].device_id, "r1");
}

#[test]
fn append_surfaces_storage_errors() {
    let dir = TempDir::new().unwrap();
    // A regular file where the queue's parent directory should be.
    fs::write(dir.path().join("blocker"), "x").unwrap();

    let queue = DurableQueue::new(JsonFileStore::new(
        dir.path().join("blocker").join("queue.json"),
    ));

    assert!(matches!(
        queue.append(record("r1")),
        Err(AgentError::Storage(_))
    ));
}

// ---- batcher ----

#[test]
fn batch_threshold_signals_exactly_on_boundary() {
    let mut batcher = Batcher::new(3);

    assert!(!batcher.add(record("r1")));
    assert!(!batcher.add(record("r2")));
    assert!(batcher.add(record("r3")));

    assert_eq!(batcher.drain_all().len(), 3);
    assert!(batcher.is_empty());
    assert!(!batcher.add(record("r4")));
}

// ---- retry policy ----

#[test]
fn linear_backoff_strictly_increases() {
    let policy = RetryPolicy::new(5, Duration::from_millis(250));

    let delays: Vec<Duration> = (1..5).map(|attempt| policy.delay_for(attempt)).collect();
    assert!(delays.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(policy.delay_for(1), Duration::from_millis(250));
    assert_eq!(policy.delay_for(3), Duration::from_millis(750));
}

#[test]
fn zero_delay_policy_never_sleeps() {
    let policy = RetryPolicy::zero_delay(3);
    assert_eq!(policy.max_attempts(), 3);
    assert_eq!(policy.delay_for(4), Duration::ZERO);
}

// ---- delivery classification ----

#[test]
fn status_classification_matches_wire_contract() {
    use reqwest::StatusCode;

    assert_eq!(classify_status(StatusCode::OK), DeliveryOutcome::Accepted);
    assert_eq!(
        classify_status(StatusCode::CREATED),
        DeliveryOutcome::Accepted
    );
    assert_eq!(
        classify_status(StatusCode::UNAUTHORIZED),
        DeliveryOutcome::AuthRejected
    );
    assert_eq!(
        classify_status(StatusCode::NOT_FOUND),
        DeliveryOutcome::Failed
    );
    assert_eq!(
        classify_status(StatusCode::INTERNAL_SERVER_ERROR),
        DeliveryOutcome::Failed
    );
    assert_eq!(
        classify_status(StatusCode::NO_CONTENT),
        DeliveryOutcome::Failed
    );
}

// ---- controller ----

#[test]
fn auth_rejected_batch_is_retried_once_with_fresh_credential() {
    let dir = TempDir::new().unwrap();
    let mut h = harness(
        &dir,
        2,
        &[DeliveryOutcome::AuthRejected, DeliveryOutcome::Accepted],
        &[Some("token-1"), Some("token-2")],
        vec![record("r1"), record("r2"), record("r3")],
    );

    h.controller.authenticate().unwrap();

    h.controller.run_tick(); // r1, batch not full
    assert!(h.deliver.calls.borrow().is_empty());

    h.controller.run_tick(); // r2 fills the batch
    assert_eq!(
        *h.deliver.calls.borrow(),
        vec![(2, "token-1".to_string()), (2, "token-2".to_string())]
    );
    assert_eq!(h.credentials.obtained.get(), 2);

    h.controller.run_tick(); // r3, batch not full again

    assert!(h.samples.borrow().is_empty());
    assert!(!h.queue_path.exists(), "queue must stay untouched");
    assert!(has_event(
        &h.events,
        &PipelineEvent::DeliveryAccepted { records: 2 }
    ));
    assert!(!has_event(&h.events, &PipelineEvent::RecordRequeued));
}

#[test]
fn failed_batch_is_requeued_and_drained_next_tick() {
    let dir = TempDir::new().unwrap();
    let mut h = harness(
        &dir,
        2,
        &[
            DeliveryOutcome::Failed,   // full batch, retries exhausted
            DeliveryOutcome::Accepted, // drain r1
            DeliveryOutcome::Accepted, // drain r2
        ],
        &[Some("token-1")],
        vec![record("r1"), record("r2"), record("r3")],
    );

    h.controller.authenticate().unwrap();
    h.controller.run_tick();
    h.controller.run_tick();

    assert!(h.queue_path.exists());
    let parked = JsonFileStore::new(&h.queue_path).load().unwrap();
    assert_eq!(parked.len(), 2);
    assert_eq!(parked[0].device_id, "r1");
    assert_eq!(parked[1].device_id, "r2");
    assert!(has_event(
        &h.events,
        &PipelineEvent::DeliveryFailed { records: 2 }
    ));

    h.controller.run_tick(); // flush drains both, then samples r3

    assert!(!h.queue_path.exists());
    assert!(has_event(
        &h.events,
        &PipelineEvent::FlushCompleted {
            delivered: 2,
            remaining: 0
        }
    ));
    assert_eq!(
        *h.deliver.calls.borrow(),
        vec![
            (2, "token-1".to_string()),
            (1, "token-1".to_string()),
            (1, "token-1".to_string()),
        ]
    );
}

#[test]
fn tick_is_skipped_when_reauth_fails_during_flush() {
    let dir = TempDir::new().unwrap();
    JsonFileStore::new(dir.path().join("queue.json"))
        .save(&[record("r1")])
        .unwrap();

    let mut h = harness(
        &dir,
        2,
        &[DeliveryOutcome::AuthRejected],
        &[Some("token-1"), None],
        Vec::new(), // sampling must not happen on a skipped tick
    );

    h.controller.authenticate().unwrap();
    h.controller.run_tick();

    assert!(has_event(&h.events, &PipelineEvent::TickSkipped));
    assert!(h.queue_path.exists(), "rejected record must be retained");
    assert_eq!(
        JsonFileStore::new(&h.queue_path).load().unwrap().len(),
        1
    );
}

#[test]
fn startup_auth_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut h = harness(&dir, 2, &[], &[None], Vec::new());

    assert!(matches!(
        h.controller.authenticate(),
        Err(AgentError::Auth(_))
    ));
}

#[test]
fn dropped_records_are_reported_not_silent() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("blocker"), "x").unwrap();

    let queue_path = dir.path().join("blocker").join("queue.json");
    let deliver = ScriptedDeliver::new(&[DeliveryOutcome::Failed]);
    let events = Rc::new(RefCell::new(Vec::new()));

    let mut controller = Controller::new(
        DurableQueue::new(JsonFileStore::new(&queue_path)),
        deliver,
        FakeCredentials::new(&[Some("token-1")]),
        FakeSampler::new(vec![record("r1")]),
        Batcher::new(1),
        Box::new(RecordingSink {
            events: events.clone(),
        }),
        Duration::ZERO,
    );

    controller.authenticate().unwrap();
    controller.run_tick();

    let saw_drop = events
        .borrow()
        .iter()
        .any(|event| matches!(event, PipelineEvent::RecordDropped { .. }));
    assert!(saw_drop, "a lossy append must surface a RecordDropped event");
}
