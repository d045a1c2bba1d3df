use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::pipeline::error::classify;
use crate::pipeline::types::{
    AnalyzeMediaRequest, ErrorDetail, MediaAnalysis, Task, TaskStatus,
};
use crate::store::StoreError;
use crate::AppContext;

const MAX_BATCH_STATUS_IDS: usize = 50;

pub fn task_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/analyze-media", post(submit_analysis))
        .route("/task/:task_id", get(get_task).delete(delete_task))
        .route("/tasks/status", post(batch_task_status))
        .route("/stats", get(get_stats))
        .with_state(ctx)
}

#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Poll view of a task record.
#[derive(Debug, Serialize)]
pub struct TaskView {
    pub task_id: String,
    pub media_id: String,
    pub catalog_id: Option<String>,
    pub brand_name: Option<String>,
    pub status: TaskStatus,
    pub message: String,
    pub progress: u8,
    pub result: Option<MediaAnalysis>,
    pub error_detail: Option<ErrorDetail>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.id,
            media_id: task.request.media_id,
            catalog_id: task.request.catalog_id,
            brand_name: task.request.brand_name,
            status: task.status,
            message: task.message,
            progress: task.progress,
            result: task.result,
            error_detail: task.error_detail,
            created_at: task.created_at,
            updated_at: task.updated_at,
            completed_at: task.completed_at,
            failed_at: task.failed_at,
        }
    }
}

// Submit endpoint: async accept, the pipeline runs in the background
async fn submit_analysis(
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<AnalyzeMediaRequest>,
) -> impl IntoResponse {
    match ctx.orchestrator.submit(request).await {
        Ok(task) => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::success(SubmitResponse {
                task_id: task.id,
                status: task.status,
                message: task.message,
                created_at: task.created_at,
            })),
        )
            .into_response(),
        Err(e) => {
            let detail = classify(&e);
            error!("Failed to submit task: {:#}", e);
            let status = if detail.error_kind == "invalid_parameters" {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (
                status,
                Json(ApiResponse::<SubmitResponse>::error(detail.message)),
            )
                .into_response()
        }
    }
}

// Poll endpoint
async fn get_task(
    State(ctx): State<Arc<AppContext>>,
    Path(task_id): Path<String>,
) -> impl IntoResponse {
    match ctx.orchestrator.store().get(&task_id).await {
        Ok(Some(task)) => (
            StatusCode::OK,
            Json(ApiResponse::success(TaskView::from(task))),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<TaskView>::error(format!(
                "Task {task_id} not found"
            ))),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to get task {task_id}: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<TaskView>::error(e.to_string())),
            )
                .into_response()
        }
    }
}

async fn delete_task(
    State(ctx): State<Arc<AppContext>>,
    Path(task_id): Path<String>,
) -> impl IntoResponse {
    match ctx.orchestrator.store().delete(&task_id).await {
        Ok(()) => {
            info!("Deleted task {task_id}");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(StoreError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::error(format!(
                "Task {task_id} not found"
            ))),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::error(e.to_string())),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchStatusRequest {
    pub task_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchStatusResponse {
    pub results: HashMap<String, Option<TaskView>>,
    pub total: usize,
    pub found: usize,
    pub not_found: Vec<String>,
}

// Bounded batch poll: per-id result or null, plus summary counts
async fn batch_task_status(
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<BatchStatusRequest>,
) -> impl IntoResponse {
    if request.task_ids.len() > MAX_BATCH_STATUS_IDS {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<BatchStatusResponse>::error(format!(
                "At most {MAX_BATCH_STATUS_IDS} task ids per request"
            ))),
        )
            .into_response();
    }

    let mut results: HashMap<String, Option<TaskView>> = HashMap::new();
    let mut not_found = Vec::new();
    let total = request.task_ids.len();

    for task_id in request.task_ids {
        match ctx.orchestrator.store().get(&task_id).await {
            Ok(Some(task)) => {
                results.insert(task_id, Some(TaskView::from(task)));
            }
            Ok(None) => {
                not_found.push(task_id.clone());
                results.insert(task_id, None);
            }
            Err(e) => {
                error!("Failed to get task {task_id}: {e}");
                not_found.push(task_id.clone());
                results.insert(task_id, None);
            }
        }
    }

    let found = total - not_found.len();
    (
        StatusCode::OK,
        Json(ApiResponse::success(BatchStatusResponse {
            results,
            total,
            found,
            not_found,
        })),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    gate: crate::pipeline::gate::GateStats,
    tasks: crate::pipeline::orchestrator::TaskCounts,
}

async fn get_stats(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    match ctx.orchestrator.task_counts().await {
        Ok(tasks) => (
            StatusCode::OK,
            Json(ApiResponse::success(StatsResponse {
                gate: ctx.orchestrator.gate().stats(),
                tasks,
            })),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to compute task stats: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<StatsResponse>::error(e.to_string())),
            )
                .into_response()
        }
    }
}
