//! Collaborator traits consumed by the orchestration service.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::CompanyRecord;

/// Persistence capability set for company records.
///
/// Lookups that find nothing return `Ok(None)`; only genuine I/O failures
/// surface as errors.
#[async_trait]
pub trait CompanyRepository: Send + Sync {
    /// Persists a new record and returns it with the assigned id.
    async fn create(&self, company: &CompanyRecord) -> Result<CompanyRecord, StoreError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<CompanyRecord>, StoreError>;

    /// Looks a record up by its normalized tax id.
    async fn get_by_tax_id(&self, tax_id: &str) -> Result<Option<CompanyRecord>, StoreError>;

    /// Replaces every mutable field of the record with the same id. `created_at`
    /// is never overwritten.
    async fn update(&self, company: &CompanyRecord) -> Result<CompanyRecord, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Returns one page of records, most recently created first. `page` starts at 1.
    async fn list(&self, page: u32, limit: u32) -> Result<Vec<CompanyRecord>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

/// Errors raised by a [`CompanyRepository`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("company not found")]
    NotFound,
    #[error("a company with the same tax id already exists")]
    Duplicate,
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }
}

/// Outbound change notifications.
///
/// Implementations attempt delivery exactly once per call; retries belong to
/// the caller.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_created(&self, company: &CompanyRecord) -> Result<(), PublishError>;

    async fn publish_updated(&self, company: &CompanyRecord) -> Result<(), PublishError>;

    async fn publish_deleted(&self, company: &CompanyRecord) -> Result<(), PublishError>;
}

/// Errors raised by an [`EventPublisher`].
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("event delivery failed: {0}")]
    Delivery(String),
}
