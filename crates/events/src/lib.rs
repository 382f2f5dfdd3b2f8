pub mod http;

pub use http::{HttpEventPublisher, HttpPublisherError};
