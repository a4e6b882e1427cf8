use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use mestra_core::{ListParams, ListResult, ServiceError};

use crate::dispatcher::{ScanRequest, ScanResponse, TrackingService};
use crate::snapshot::TaskSnapshot;
use crate::store::{TaskFilters, TaskNote};

/// Shared application state.
pub type AppState = Arc<TrackingService>;

/// Build the tracking API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/tracking/v1", api_routes())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/scan", post(process_scan))
        .route("/tasks", get(list_tasks))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/notes", get(list_task_notes))
        .route("/units/{id}", get(get_unit))
}

/// Standard API error response body.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        }));
        (status, body).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError {
            code: err.status_code().as_u16(),
            message: err.to_string(),
        }
    }
}

/// Wrap a Result<T, ServiceError> into an API response.
fn ok_json<T: Serialize>(result: Result<T, ServiceError>) -> Result<Json<T>, ApiError> {
    result.map(Json).map_err(ApiError::from)
}

async fn process_scan(
    State(svc): State<AppState>,
    Json(req): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, ApiError> {
    ok_json(svc.process_scan(&req))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskQuery {
    #[serde(flatten)]
    params: ListParams,
    operation: Option<String>,
    production_item: Option<String>,
    status: Option<String>,
}

async fn list_tasks(
    State(svc): State<AppState>,
    Query(q): Query<TaskQuery>,
) -> Result<Json<ListResult<TaskSnapshot>>, ApiError> {
    let filters = TaskFilters {
        operation: q.operation,
        production_item: q.production_item,
        status: q.status,
    };
    ok_json(svc.store().list_tasks(&filters, &q.params).map(|r| ListResult {
        items: r.items.iter().map(TaskSnapshot::from_task).collect(),
        total: r.total,
    }))
}

async fn get_task(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskSnapshot>, ApiError> {
    ok_json(svc.store().get_task(&id).map(|t| TaskSnapshot::from_task(&t)))
}

async fn list_task_notes(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<TaskNote>>, ApiError> {
    ok_json(svc.store().list_task_notes(&id))
}

async fn get_unit(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<crate::model::ProductionUnit>, ApiError> {
    ok_json(svc.store().get_unit(&id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Uri;

    #[test]
    fn task_query_parses_numeric_pagination() {
        let uri: Uri = "/tasks?limit=10&operation=Glazing%20Bead".parse().unwrap();
        let Query(q) = Query::<TaskQuery>::try_from_uri(&uri).unwrap();
        assert_eq!(q.params.limit, 10);
        assert_eq!(q.params.offset, 0);
        assert_eq!(q.operation.as_deref(), Some("Glazing Bead"));

        let uri: Uri = "/tasks?offset=3&productionItem=S2026-044-2&status=PENDING"
            .parse()
            .unwrap();
        let Query(q) = Query::<TaskQuery>::try_from_uri(&uri).unwrap();
        assert_eq!(q.params.limit, 50);
        assert_eq!(q.params.offset, 3);
        assert_eq!(q.production_item.as_deref(), Some("S2026-044-2"));
        assert_eq!(q.status.as_deref(), Some("PENDING"));
    }
}
