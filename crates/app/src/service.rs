use std::{future::Future, sync::Arc};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use registry_core::{
    tax_id, validate, CompanyRecord, CompanyRepository, EventKind, EventPublisher, StoreError,
    ValidationError,
};

use crate::dispatcher::{NotificationDispatcher, RetryPolicy};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Page coordinates after clamping caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    /// Pages start at 1. Limits outside `1..=100` fall back to 20.
    pub fn clamp(page: i64, limit: i64) -> Self {
        let page = u32::try_from(page.max(1)).unwrap_or(u32::MAX);
        let limit = match u32::try_from(limit) {
            Ok(limit) if (1..=MAX_PAGE_LIMIT).contains(&limit) => limit,
            _ => DEFAULT_PAGE_LIMIT,
        };
        Self { page, limit }
    }
}

/// Stable machine-readable category of a [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Repository,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Repository => "repository_error",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid company data: {0}")]
    Validation(#[from] ValidationError),
    #[error("tax id {0} is already registered")]
    Conflict(String),
    #[error("company with id {0} not found")]
    NotFound(String),
    #[error("repository failure: {0}")]
    Repository(#[source] StoreError),
    #[error("operation cancelled before completion")]
    Cancelled,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Repository(_) => ErrorKind::Repository,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    fn conflict(raw_tax_id: &str) -> Self {
        Self::Conflict(tax_id::format(raw_tax_id))
    }

    fn not_found(id: &str) -> Self {
        Self::NotFound(id.to_string())
    }

    fn from_write(err: StoreError, company: &CompanyRecord) -> Self {
        match err {
            StoreError::Duplicate => Self::conflict(&company.tax_id),
            StoreError::NotFound => Self::not_found(&company.id),
            other => Self::Repository(other),
        }
    }
}

/// Coordinates validation, uniqueness, persistence and change notifications
/// for company records.
///
/// Holds no mutable state of its own; consistency under concurrent requests
/// is left to the repository.
#[derive(Clone)]
pub struct CompanyService {
    repository: Arc<dyn CompanyRepository>,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl CompanyService {
    pub fn new(
        repository: Arc<dyn CompanyRepository>,
        publisher: Arc<dyn EventPublisher>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            repository,
            dispatcher: NotificationDispatcher::new(publisher, retry),
            clock: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Validates and persists a new company, then schedules a `created` event.
    pub async fn create(
        &self,
        cancel: &CancellationToken,
        mut company: CompanyRecord,
    ) -> Result<CompanyRecord, ServiceError> {
        validate(&mut company)?;

        let existing = guarded(cancel, self.repository.get_by_tax_id(&company.tax_id)).await?;
        if existing.is_some() {
            return Err(ServiceError::conflict(&company.tax_id));
        }

        ensure_active(cancel)?;
        company.id.clear();
        company.stamp_created(self.now());
        let created = self
            .repository
            .create(&company)
            .await
            .map_err(|err| ServiceError::from_write(err, &company))?;

        self.dispatcher.dispatch(EventKind::Created, created.clone());
        info!(stage = "service", company_id = %created.id, tax_id = %created.tax_id, "company created");
        Ok(created)
    }

    pub async fn get(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> Result<CompanyRecord, ServiceError> {
        if id.is_empty() {
            return Err(ValidationError::MissingId.into());
        }

        guarded(cancel, self.repository.get_by_id(id))
            .await?
            .ok_or_else(|| ServiceError::not_found(id))
    }

    /// Replaces every mutable field of an existing company. `created_at` is
    /// carried over from the stored record.
    pub async fn update(
        &self,
        cancel: &CancellationToken,
        mut company: CompanyRecord,
    ) -> Result<CompanyRecord, ServiceError> {
        if company.id.is_empty() {
            return Err(ValidationError::MissingId.into());
        }
        validate(&mut company)?;

        let existing = guarded(cancel, self.repository.get_by_id(&company.id))
            .await?
            .ok_or_else(|| ServiceError::not_found(&company.id))?;

        if existing.tax_id != company.tax_id {
            let holder = guarded(cancel, self.repository.get_by_tax_id(&company.tax_id)).await?;
            if holder.is_some_and(|holder| holder.id != company.id) {
                return Err(ServiceError::conflict(&company.tax_id));
            }
        }

        ensure_active(cancel)?;
        company.created_at = existing.created_at;
        company.stamp_updated(self.now());
        let updated = self
            .repository
            .update(&company)
            .await
            .map_err(|err| ServiceError::from_write(err, &company))?;

        self.dispatcher.dispatch(EventKind::Updated, updated.clone());
        info!(stage = "service", company_id = %updated.id, "company updated");
        Ok(updated)
    }

    /// Removes a company and schedules a `deleted` event carrying the last
    /// stored snapshot.
    pub async fn delete(&self, cancel: &CancellationToken, id: &str) -> Result<(), ServiceError> {
        if id.is_empty() {
            return Err(ValidationError::MissingId.into());
        }

        let existing = guarded(cancel, self.repository.get_by_id(id))
            .await?
            .ok_or_else(|| ServiceError::not_found(id))?;

        ensure_active(cancel)?;
        self.repository
            .delete(id)
            .await
            .map_err(|err| ServiceError::from_write(err, &existing))?;

        info!(stage = "service", company_id = %existing.id, "company deleted");
        self.dispatcher.dispatch(EventKind::Deleted, existing);
        Ok(())
    }

    /// Lists companies newest first. Out-of-range paging input is clamped,
    /// see [`Pagination::clamp`].
    pub async fn list(
        &self,
        cancel: &CancellationToken,
        page: i64,
        limit: i64,
    ) -> Result<Vec<CompanyRecord>, ServiceError> {
        let Pagination { page, limit } = Pagination::clamp(page, limit);
        guarded(cancel, self.repository.list(page, limit)).await
    }

    pub async fn count(&self, cancel: &CancellationToken) -> Result<u64, ServiceError> {
        guarded(cancel, self.repository.count()).await
    }
}

/// Runs a repository call unless the caller's token fires first.
async fn guarded<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, ServiceError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ServiceError::Cancelled),
        result = operation => result.map_err(ServiceError::Repository),
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), ServiceError> {
    if cancel.is_cancelled() {
        return Err(ServiceError::Cancelled);
    }
    Ok(())
}
