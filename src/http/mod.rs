//! HTTP surface (§6): exactly two operations, `SubmitTask` and
//! `StreamTrace`. Request validation and CORS are left to a gateway in
//! front of this service; this layer only carries a `tower-http` trace
//! layer.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{Task, TaskType};
use crate::services::event_store::{EventQuery, EventStore};
use crate::services::queue_service::QueueService;

/// Shared state for the HTTP surface.
pub struct AppState {
    pub queue: Arc<QueueService>,
    pub events: Arc<dyn EventStore>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tasks", post(submit_task))
        .route("/traces/{id}/stream", get(stream_trace))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

struct ApiError(DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            DomainError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            DomainError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            DomainError::Conflict { .. } | DomainError::ConcurrencyConflict { .. } => StatusCode::CONFLICT,
            DomainError::RateLimited { .. } | DomainError::NamespaceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            DomainError::Permission(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Request body for `POST /tasks` (`SubmitTask`).
#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    pub task_type: TaskType,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub execute_time: Option<chrono::DateTime<chrono::Utc>>,
    pub trace_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SubmitTaskResponse {
    pub task_id: Uuid,
    pub trace_id: Uuid,
}

async fn submit_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitTaskRequest>,
) -> Result<(StatusCode, Json<SubmitTaskResponse>), ApiError> {
    let mut task = Task::new(req.task_type, req.payload);
    if let Some(execute_time) = req.execute_time {
        task = task.with_execute_time(execute_time);
    }
    if let Some(trace_id) = req.trace_id {
        task.trace_id = trace_id;
    }
    if let Some(group_id) = req.group_id {
        task = task.with_group(group_id);
    }
    if let Some(project_id) = req.project_id {
        task = task.with_project(project_id);
    }
    if let Some(user_id) = req.user_id {
        task = task.with_user(user_id);
    }

    let (task_id, trace_id) = state.queue.submit(task).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitTaskResponse { task_id, trace_id })))
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    last_id: Option<i64>,
}

const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(250);
const STREAM_BLOCK_TIME: Duration = Duration::from_secs(30);
const STREAM_MAX_COUNT: u32 = 200;

/// `GET /traces/:id/stream` (`StreamTrace`): Server-Sent Events, resumable
/// via `Last-Event-ID` or `?last_id=`. A server-generated `end` event
/// follows any terminal event in the trace (§5 S5).
async fn stream_trace(
    State(state): State<Arc<AppState>>,
    Path(trace_id): Path<Uuid>,
    Query(params): Query<StreamParams>,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let last_id = params
        .last_id
        .or_else(|| headers.get("last-event-id").and_then(|v| v.to_str().ok()).and_then(|s| s.parse().ok()))
        .unwrap_or(0);

    let stream = async_stream::stream! {
        let mut cursor = last_id;
        loop {
            let query = EventQuery::new(trace_id).after_id(cursor).max_count(STREAM_MAX_COUNT);
            let page = match state.events.query(query).await {
                Ok(page) => page,
                Err(err) => {
                    yield Ok(Event::default().event("error").data(err.to_string()));
                    break;
                }
            };

            if page.is_empty() {
                tokio::time::sleep(STREAM_POLL_INTERVAL).await;
                continue;
            }

            let mut saw_terminal = false;
            for entry in &page {
                cursor = entry.id;
                yield Ok(Event::default()
                    .id(entry.id.to_string())
                    .event(entry.payload.name())
                    .data(serde_json::to_string(entry).unwrap_or_default()));
                if entry.payload.is_terminal() {
                    saw_terminal = true;
                }
            }

            if saw_terminal {
                yield Ok(Event::default().event("end").data("{}"));
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(STREAM_BLOCK_TIME))
}
