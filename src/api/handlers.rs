use std::sync::Arc;

use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    Form, Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::metrics;
use crate::models::request::{NewRequest, Request, RequestStatus, StatusUpdate};
use crate::AppState;

const INDEX_HTML: &str = include_str!("index.html");

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 500;

#[derive(Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    /// A status name, or `all`.
    pub status: Option<String>,
}

impl ListParams {
    fn status_filter(&self) -> Result<Option<RequestStatus>, AppError> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => Ok(None),
            Some(s) => Ok(Some(s.parse()?)),
        }
    }
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Validate and store one request. `created_at` comes from the store.
async fn intake(state: &AppState, req: NewRequest) -> Result<Request, AppError> {
    let req = req.validate()?;
    let row = state.store.insert_request(&req).await?;
    metrics::REQUESTS_SUBMITTED.inc();
    tracing::info!(
        request_id = row.id,
        room = %row.room_number,
        building = row.building.as_deref().unwrap_or("-"),
        priority = ?row.priority,
        "maintenance request submitted"
    );
    Ok(row)
}

/// `POST /submit` from the HTML form.
pub async fn submit_form(
    State(state): State<Arc<AppState>>,
    form: Result<Form<NewRequest>, FormRejection>,
) -> Result<&'static str, AppError> {
    let Form(req) = form?;
    intake(&state, req).await?;
    Ok("Request submitted successfully!")
}

/// `POST /api/v1/requests`
pub async fn create_request(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Request>), AppError> {
    let Json(req) = payload?;
    let row = intake(&state, req).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// `GET /api/v1/requests?limit=N&status=S`, newest first.
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Request>>, AppError> {
    let Query(params) = params?;
    let status = params.status_filter()?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let rows = state.store.list_recent(limit, status).await?;
    Ok(Json(rows))
}

/// `PUT /api/v1/requests/{id}` with `{"status": "..."}`.
pub async fn update_request_status(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Request>, AppError> {
    let Path(id) = id?;
    let Json(update) = payload?;

    let row = state
        .store
        .update_status(id, update.status)
        .await?
        .ok_or(AppError::NotFound(id))?;
    tracing::info!(request_id = id, status = %row.status, "request status updated");
    Ok(Json(row))
}

/// `DELETE /api/v1/requests/{id}`
pub async fn delete_request(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path(id) = id?;
    if !state.store.delete_request(id).await? {
        return Err(AppError::NotFound(id));
    }
    tracing::info!(request_id = id, "request deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn readiness(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
        }
    }
}

pub async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}
