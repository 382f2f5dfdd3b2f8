use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::service::{ErrorKind, ServiceError};

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

/// `application/problem+json` error body.
pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ServiceError> for ProblemResponse {
    fn from(err: ServiceError) -> Self {
        let kind = err.kind();
        let status = match kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Cancelled => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Repository => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let detail = match kind {
            ErrorKind::Repository => {
                error!(stage = "api", error = %err, "repository failure");
                "the company registry is temporarily unavailable".to_string()
            }
            _ => err.to_string(),
        };

        Self::new(status, kind.as_str(), detail)
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_core::{StoreError, ValidationError};

    #[test]
    fn maps_error_kinds_to_statuses() {
        let cases = [
            (
                ServiceError::Validation(ValidationError::TaxIdInvalid),
                StatusCode::BAD_REQUEST,
            ),
            (ServiceError::Conflict("x".into()), StatusCode::CONFLICT),
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServiceError::Cancelled, StatusCode::GATEWAY_TIMEOUT),
            (
                ServiceError::Repository(StoreError::backend(std::io::Error::other("disk"))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ProblemResponse::from(err).status(), status);
        }
    }

    #[test]
    fn repository_detail_is_generic() {
        let problem = ProblemResponse::from(ServiceError::Repository(StoreError::backend(
            std::io::Error::other("secret path /var/db"),
        )));
        assert_eq!(problem.body.problem_type, "repository_error");
        assert!(!problem.body.detail.contains("secret"));
    }
}
