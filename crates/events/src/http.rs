use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use thiserror::Error;
use tracing::debug;
use url::Url;

use registry_core::{CompanyEvent, CompanyRecord, EventKind, EventPublisher, PublishError};

/// Header carrying the routing key of the delivered event.
pub const EVENT_TYPE_HEADER: &str = "X-Event-Type";

/// Publishes company events by POSTing JSON envelopes to a webhook endpoint.
#[derive(Clone)]
pub struct HttpEventPublisher {
    http: Client,
    endpoint: Url,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl HttpEventPublisher {
    /// Creates a publisher targeting `endpoint`.
    pub fn new(endpoint: Url, http: Client) -> Self {
        Self {
            http,
            endpoint,
            clock: Arc::new(Utc::now),
        }
    }

    /// Overrides the clock used to stamp event timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Sends a single event. No retries are attempted here.
    pub async fn send(
        &self,
        kind: EventKind,
        company: &CompanyRecord,
    ) -> Result<(), HttpPublisherError> {
        let event = CompanyEvent::new(kind, company, (self.clock)());
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(EVENT_TYPE_HEADER, kind.routing_key())
            .json(&event)
            .send()
            .await?;

        ensure_success(response).await?;
        debug!(stage = "events", event = kind.routing_key(), company_id = %company.id, "event delivered");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for HttpEventPublisher {
    async fn publish_created(&self, company: &CompanyRecord) -> Result<(), PublishError> {
        self.send(EventKind::Created, company)
            .await
            .map_err(PublishError::from)
    }

    async fn publish_updated(&self, company: &CompanyRecord) -> Result<(), PublishError> {
        self.send(EventKind::Updated, company)
            .await
            .map_err(PublishError::from)
    }

    async fn publish_deleted(&self, company: &CompanyRecord) -> Result<(), PublishError> {
        self.send(EventKind::Deleted, company)
            .await
            .map_err(PublishError::from)
    }
}

/// Errors produced by the HTTP publisher.
#[derive(Debug, Error)]
pub enum HttpPublisherError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl From<HttpPublisherError> for PublishError {
    fn from(err: HttpPublisherError) -> Self {
        PublishError::Delivery(err.to_string())
    }
}

async fn ensure_success(response: Response) -> Result<(), HttpPublisherError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(HttpPublisherError::Status { status, body });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use httpmock::prelude::*;
    use serde_json::json;

    fn publisher(server: &MockServer) -> HttpEventPublisher {
        let endpoint = Url::parse(&server.url("/events")).expect("url");
        let fixed = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        HttpEventPublisher::new(endpoint, Client::builder().build().expect("client"))
            .with_clock(Arc::new(move || fixed))
    }

    fn company() -> CompanyRecord {
        let mut record = CompanyRecord::draft(
            "11444777000161",
            "Acme",
            "Acme Industria LTDA",
            "Rua Teste, 123",
            10,
            1,
        );
        record.id = "c-1".to_string();
        record
    }

    #[tokio::test]
    async fn created_event_posts_envelope() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/events")
                    .header(EVENT_TYPE_HEADER, "company.created")
                    .json_body(json!({
                        "event": "created",
                        "operation": "Company registration Acme",
                        "company_id": "c-1",
                        "tax_id": "11444777000161",
                        "timestamp": "2024-05-01T12:00:00Z"
                    }));
                then.status(202);
            })
            .await;

        publisher(&server)
            .publish_created(&company())
            .await
            .expect("publish created");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn deleted_event_uses_deleted_routing_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/events")
                    .header(EVENT_TYPE_HEADER, "company.deleted");
                then.status(200);
            })
            .await;

        publisher(&server)
            .publish_deleted(&company())
            .await
            .expect("publish deleted");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_is_a_delivery_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/events");
                then.status(503).body("broker unavailable");
            })
            .await;

        let publisher = publisher(&server);
        let err = publisher
            .send(EventKind::Updated, &company())
            .await
            .expect_err("should error");
        match err {
            HttpPublisherError::Status { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "broker unavailable");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let err = publisher
            .publish_updated(&company())
            .await
            .expect_err("trait call should error too");
        assert!(matches!(err, PublishError::Delivery(message) if message.contains("503")));
    }
}
