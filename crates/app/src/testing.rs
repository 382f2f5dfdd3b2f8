//! Test doubles shared by the app's unit tests.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Mutex,
};

use async_trait::async_trait;

use registry_core::{CompanyRecord, EventKind, EventPublisher, PublishError};

const ALWAYS: u32 = u32::MAX;

/// Publisher that records delivered events and can simulate outages.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    delivered: Mutex<Vec<(EventKind, CompanyRecord)>>,
    attempts: AtomicU32,
    failures_left: AtomicU32,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every attempt.
    pub fn failing() -> Self {
        Self::failing_times(ALWAYS)
    }

    /// Fails the first `times` attempts, then succeeds.
    pub fn failing_times(times: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(times),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<(EventKind, CompanyRecord)> {
        self.delivered.lock().expect("publisher lock").clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.delivered().into_iter().map(|(kind, _)| kind).collect()
    }

    fn record(&self, kind: EventKind, company: &CompanyRecord) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                ALWAYS => Some(ALWAYS),
                n => Some(n - 1),
            })
            .is_ok();
        if should_fail {
            return Err(PublishError::Delivery("simulated broker outage".to_string()));
        }

        self.delivered
            .lock()
            .expect("publisher lock")
            .push((kind, company.clone()));
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish_created(&self, company: &CompanyRecord) -> Result<(), PublishError> {
        self.record(EventKind::Created, company)
    }

    async fn publish_updated(&self, company: &CompanyRecord) -> Result<(), PublishError> {
        self.record(EventKind::Updated, company)
    }

    async fn publish_deleted(&self, company: &CompanyRecord) -> Result<(), PublishError> {
        self.record(EventKind::Deleted, company)
    }
}

/// Valid, unsaved record with a punctuated tax id.
pub fn sample_company() -> CompanyRecord {
    CompanyRecord::draft(
        "11.444.777/0001-61",
        "Empresa Teste",
        "Empresa Teste LTDA",
        "Rua Teste, 123, Centro - Sao Paulo/SP",
        10,
        1,
    )
}

/// Second valid tax id, distinct from [`sample_company`]'s.
pub const OTHER_TAX_ID: &str = "11.222.333/0001-81";
