use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use vigil_common::types::MetricRecord;

use crate::auth::Credential;

const MAX_LOGGED_BODY: usize = 512;

/// Classification of one delivery call, after internal retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The collector acknowledged receipt (200 or 201).
    Accepted,
    /// The collector rejected the bearer credential (401). Never retried
    /// internally; the caller must refresh the credential first.
    AuthRejected,
    /// Anything else: network error, timeout, unexpected status, malformed
    /// response. Retried internally up to the policy ceiling.
    Failed,
}

/// Bounded-retry policy with linearly increasing delays. Linear rather than
/// exponential: a low-frequency agent never builds up enough pressure for
/// exponential growth to matter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A policy that never sleeps, for deterministic tests.
    pub fn zero_delay(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given 1-based attempt; grows strictly with the
    /// attempt number when the base delay is nonzero.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// One network delivery attempt for a batch of records.
pub trait Deliver {
    fn send(&self, batch: &[MetricRecord], credential: &Credential) -> DeliveryOutcome;
}

/// HTTP delivery to the collector's metrics endpoint. A one-record batch is
/// sent as a bare JSON object, larger batches as a JSON array; the collector
/// accepts both shapes.
pub struct DeliveryClient {
    client: reqwest::blocking::Client,
    metrics_url: String,
    policy: RetryPolicy,
}

impl DeliveryClient {
    pub fn new(
        client: reqwest::blocking::Client,
        metrics_url: String,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            metrics_url,
            policy,
        }
    }

    fn attempt_once(&self, batch: &[MetricRecord], credential: &Credential) -> DeliveryOutcome {
        let request = self
            .client
            .post(&self.metrics_url)
            .bearer_auth(credential.token());

        let result = match batch {
            [single] => request.json(single).send(),
            _ => request.json(&batch).send(),
        };

        match result {
            Ok(response) => {
                let status = response.status();
                let outcome = classify_status(status);
                if outcome == DeliveryOutcome::Failed {
                    let body = response.text().unwrap_or_default();
                    tracing::warn!(
                        status = status.as_u16(),
                        body = %truncate(&body, MAX_LOGGED_BODY),
                        "collector rejected batch"
                    );
                }
                outcome
            }
            Err(e) => {
                tracing::warn!(error = %e, "delivery request failed");
                DeliveryOutcome::Failed
            }
        }
    }
}

impl Deliver for DeliveryClient {
    fn send(&self, batch: &[MetricRecord], credential: &Credential) -> DeliveryOutcome {
        for attempt in 1..=self.policy.max_attempts() {
            match self.attempt_once(batch, credential) {
                DeliveryOutcome::Accepted => return DeliveryOutcome::Accepted,
                DeliveryOutcome::AuthRejected => return DeliveryOutcome::AuthRejected,
                DeliveryOutcome::Failed => {
                    if attempt < self.policy.max_attempts() {
                        let delay = self.policy.delay_for(attempt);
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "delivery attempt failed, backing off"
                        );
                        thread::sleep(delay);
                    }
                }
            }
        }
        DeliveryOutcome::Failed
    }
}

pub(crate) fn classify_status(status: StatusCode) -> DeliveryOutcome {
    match status.as_u16() {
        200 | 201 => DeliveryOutcome::Accepted,
        401 => DeliveryOutcome::AuthRejected,
        _ => DeliveryOutcome::Failed,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
