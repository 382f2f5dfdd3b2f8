use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Company registered in the registry.
///
/// `id` stays empty until the storage collaborator assigns one on creation.
/// `tax_id` holds the normalized 14-digit form once the record has passed
/// [`crate::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    #[serde(default)]
    pub id: String,
    pub tax_id: String,
    pub fantasy_name: String,
    pub corporate_name: String,
    pub address: String,
    pub employee_count: i64,
    pub min_accessible_employee_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CompanyRecord {
    /// Builds an unsaved record with both timestamps at the Unix epoch.
    pub fn draft(
        tax_id: impl Into<String>,
        fantasy_name: impl Into<String>,
        corporate_name: impl Into<String>,
        address: impl Into<String>,
        employee_count: i64,
        min_accessible_employee_count: i64,
    ) -> Self {
        Self {
            id: String::new(),
            tax_id: tax_id.into(),
            fantasy_name: fantasy_name.into(),
            corporate_name: corporate_name.into(),
            address: address.into(),
            employee_count,
            min_accessible_employee_count,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Returns `true` once the storage collaborator has assigned an id.
    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }

    /// Stamps both timestamps for a record about to be created.
    pub fn stamp_created(&mut self, now: DateTime<Utc>) {
        self.created_at = now;
        self.updated_at = now;
    }

    /// Refreshes `updated_at`, never moving it before `created_at`.
    pub fn stamp_updated(&mut self, now: DateTime<Utc>) {
        self.updated_at = now.max(self.created_at);
    }
}

/// Category of a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }

    /// Label used for routing headers and log fields, e.g. `company.created`.
    pub fn routing_key(self) -> &'static str {
        match self {
            Self::Created => "company.created",
            Self::Updated => "company.updated",
            Self::Deleted => "company.deleted",
        }
    }

    fn operation_prefix(self) -> &'static str {
        match self {
            Self::Created => "Company registration",
            Self::Updated => "Company update",
            Self::Deleted => "Company removal",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope published to the messaging collaborator after a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyEvent {
    pub event: EventKind,
    pub operation: String,
    pub company_id: String,
    pub tax_id: String,
    pub timestamp: String,
}

impl CompanyEvent {
    pub fn new(kind: EventKind, company: &CompanyRecord, at: DateTime<Utc>) -> Self {
        Self {
            event: kind,
            operation: format!("{} {}", kind.operation_prefix(), company.fantasy_name),
            company_id: company.id.clone(),
            tax_id: company.tax_id.clone(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}
