//! Domain layer for the company registry.
//!
//! Hosts the record model, the tax id checksum, the record validator and the
//! traits implemented by the storage and messaging collaborators. Nothing in
//! this crate performs I/O.
pub mod ports;
pub mod tax_id;
pub mod types;
pub mod validation;

pub use ports::{CompanyRepository, EventPublisher, PublishError, StoreError};
pub use types::{CompanyEvent, CompanyRecord, EventKind};
pub use validation::{validate, ValidationError};
