use std::{sync::Arc, time::Duration};

use metrics::counter;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info, warn};

use registry_core::{CompanyRecord, EventKind, EventPublisher, PublishError};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Bounded linear backoff for notification delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay,
        }
    }

    /// Wait before the attempt following `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY)
    }
}

/// How a single background delivery ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Exhausted,
    Abandoned,
}

/// Fire-and-forget delivery of change notifications.
///
/// Deliveries run on their own tasks under a dispatcher-owned cancellation
/// token, so they outlive the request that triggered them. Failures are
/// logged and counted, never returned.
#[derive(Clone)]
pub struct NotificationDispatcher {
    publisher: Arc<dyn EventPublisher>,
    policy: RetryPolicy,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl NotificationDispatcher {
    pub fn new(publisher: Arc<dyn EventPublisher>, policy: RetryPolicy) -> Self {
        Self {
            publisher,
            policy,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Schedules delivery of `kind` for `company` and returns immediately.
    pub fn dispatch(&self, kind: EventKind, company: CompanyRecord) {
        let publisher = self.publisher.clone();
        let policy = self.policy;
        let shutdown = self.shutdown.clone();
        self.tracker.spawn(async move {
            deliver(publisher.as_ref(), policy, &shutdown, kind, &company).await;
        });
    }

    /// Number of deliveries still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits until every scheduled delivery has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Waits up to `timeout` for pending deliveries, then abandons the rest.
    ///
    /// Returns `true` when every delivery finished on its own.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok()
        {
            return true;
        }

        warn!(
            stage = "dispatcher",
            pending = self.tracker.len(),
            "shutdown timeout reached, abandoning pending notifications"
        );
        self.shutdown.cancel();
        self.tracker.wait().await;
        false
    }
}

pub(crate) async fn deliver(
    publisher: &dyn EventPublisher,
    policy: RetryPolicy,
    shutdown: &CancellationToken,
    kind: EventKind,
    company: &CompanyRecord,
) -> DeliveryOutcome {
    for attempt in 1..=policy.max_retries {
        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return abandon(kind, company, attempt),
            result = publish(publisher, kind, company) => result,
        };

        match result {
            Ok(()) => {
                info!(
                    stage = "dispatcher",
                    event = kind.routing_key(),
                    company_id = %company.id,
                    attempt,
                    "notification published"
                );
                counter!("notifications_total", "kind" => kind.as_str(), "outcome" => "published")
                    .increment(1);
                return DeliveryOutcome::Delivered { attempts: attempt };
            }
            Err(err) => {
                warn!(
                    stage = "dispatcher",
                    event = kind.routing_key(),
                    company_id = %company.id,
                    attempt,
                    max_retries = policy.max_retries,
                    error = %err,
                    "notification attempt failed"
                );
            }
        }

        if attempt < policy.max_retries {
            counter!("notifications_total", "kind" => kind.as_str(), "outcome" => "retried")
                .increment(1);
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return abandon(kind, company, attempt),
                _ = tokio::time::sleep(policy.delay_after(attempt)) => {}
            }
        }
    }

    error!(
        stage = "dispatcher",
        event = kind.routing_key(),
        company_id = %company.id,
        attempts = policy.max_retries,
        "notification dropped after exhausting retries"
    );
    counter!("notifications_total", "kind" => kind.as_str(), "outcome" => "dropped").increment(1);
    DeliveryOutcome::Exhausted
}

async fn publish(
    publisher: &dyn EventPublisher,
    kind: EventKind,
    company: &CompanyRecord,
) -> Result<(), PublishError> {
    match kind {
        EventKind::Created => publisher.publish_created(company).await,
        EventKind::Updated => publisher.publish_updated(company).await,
        EventKind::Deleted => publisher.publish_deleted(company).await,
    }
}

fn abandon(kind: EventKind, company: &CompanyRecord, attempt: u32) -> DeliveryOutcome {
    warn!(
        stage = "dispatcher",
        event = kind.routing_key(),
        company_id = %company.id,
        attempt,
        "notification abandoned during shutdown"
    );
    counter!("notifications_total", "kind" => kind.as_str(), "outcome" => "dropped").increment(1);
    DeliveryOutcome::Abandoned
}
