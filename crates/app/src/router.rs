use std::time::{Duration, Instant};

use axum::{
    extract::{rejection::JsonRejection, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use registry_core::CompanyRecord;

use crate::problem::ProblemResponse;
use crate::service::{CompanyService, Pagination, ServiceError, DEFAULT_PAGE_LIMIT};
use crate::telemetry;

const SERVICE_NAME: &str = "company-registry";

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    service: CompanyService,
    request_timeout: Duration,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, service: CompanyService, request_timeout: Duration) -> Self {
        Self {
            metrics,
            service,
            request_timeout,
        }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn service(&self) -> &CompanyService {
        &self.service
    }

    fn deadline(&self) -> RequestDeadline {
        RequestDeadline::start(self.request_timeout)
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/companies", get(list_companies).post(create_company))
        .route(
            "/companies/:id",
            get(get_company).put(update_company).delete(delete_company),
        )
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Cancellation token that fires once the request deadline passes.
///
/// Dropping the deadline stops its timer.
struct RequestDeadline {
    token: CancellationToken,
    timer: JoinHandle<()>,
}

impl RequestDeadline {
    fn start(timeout: Duration) -> Self {
        let token = CancellationToken::new();
        let expired = token.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            expired.cancel();
        });
        Self { token, timer }
    }

    fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for RequestDeadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

/// Request body for create and update. Missing fields decode to empty values
/// so the record validator reports them.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CompanyPayload {
    tax_id: String,
    fantasy_name: String,
    corporate_name: String,
    address: String,
    employee_count: i64,
    min_accessible_employee_count: i64,
}

impl CompanyPayload {
    fn into_record(self) -> CompanyRecord {
        CompanyRecord::draft(
            self.tax_id,
            self.fantasy_name,
            self.corporate_name,
            self.address,
            self.employee_count,
            self.min_accessible_employee_count,
        )
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    page: Option<String>,
    #[serde(default)]
    limit: Option<String>,
}

impl ListQuery {
    fn pagination(&self) -> Pagination {
        let page = parse_or(self.page.as_deref(), 1);
        let limit = parse_or(self.limit.as_deref(), i64::from(DEFAULT_PAGE_LIMIT));
        Pagination::clamp(page, limit)
    }
}

fn parse_or(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Serialize)]
struct CompanyPage {
    page: u32,
    limit: u32,
    total: u64,
    companies: Vec<CompanyRecord>,
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": SERVICE_NAME }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

async fn create_company(
    State(state): State<AppState>,
    payload: Result<Json<CompanyPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<CompanyRecord>), ProblemResponse> {
    let Json(payload) = payload.map_err(malformed_body)?;
    let deadline = state.deadline();

    let result = state
        .service()
        .create(deadline.token(), payload.into_record())
        .await;
    record_operation("create", &result);
    Ok((StatusCode::CREATED, Json(result?)))
}

async fn get_company(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CompanyRecord>, ProblemResponse> {
    let deadline = state.deadline();

    let result = state.service().get(deadline.token(), &id).await;
    record_operation("get", &result);
    Ok(Json(result?))
}

async fn update_company(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<CompanyPayload>, JsonRejection>,
) -> Result<Json<CompanyRecord>, ProblemResponse> {
    let Json(payload) = payload.map_err(malformed_body)?;
    let mut company = payload.into_record();
    company.id = id;
    let deadline = state.deadline();

    let result = state.service().update(deadline.token(), company).await;
    record_operation("update", &result);
    Ok(Json(result?))
}

async fn delete_company(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ProblemResponse> {
    let deadline = state.deadline();

    let result = state.service().delete(deadline.token(), &id).await;
    record_operation("delete", &result);
    result?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_companies(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<CompanyPage>, ProblemResponse> {
    let Pagination { page, limit } = query.pagination();
    let deadline = state.deadline();
    let service = state.service();

    let result = async {
        let companies = service
            .list(deadline.token(), i64::from(page), i64::from(limit))
            .await?;
        let total = service.count(deadline.token()).await?;
        Ok::<_, ServiceError>(CompanyPage {
            page,
            limit,
            total,
            companies,
        })
    }
    .await;
    record_operation("list", &result);
    Ok(Json(result?))
}

fn malformed_body(rejection: JsonRejection) -> ProblemResponse {
    counter!("company_operations_total", "operation" => "decode", "outcome" => "malformed_body")
        .increment(1);
    ProblemResponse::new(
        StatusCode::BAD_REQUEST,
        "validation_error",
        rejection.body_text(),
    )
}

fn record_operation<T>(operation: &'static str, result: &Result<T, ServiceError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(err) => err.kind().as_str(),
    };
    counter!("company_operations_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let elapsed = started.elapsed();
    let status = response.status();
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "status" => status.as_u16().to_string()
    )
    .record(elapsed.as_secs_f64());
    info!(
        stage = "http",
        %method,
        path = %path,
        status = status.as_u16(),
        latency_ms = elapsed.as_millis() as u64,
        "request handled"
    );

    response
}
