//! HTTP 控制面：入队、查看队列、查询状态、打开会话
//!
//! 只做形状校验（name / query 非空），任务本身的成败只体现在状态文本里。

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::core::{AgentHandle, AgentStatus, ResearchTask};

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub detail: AgentStatus,
    pub queued: usize,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub accepted: String,
}

pub fn create_router(handle: AgentHandle) -> Router {
    Router::new()
        .route("/api/tasks", post(api_tasks_create))
        .route("/api/queue", get(api_queue))
        .route("/api/status", get(api_status))
        .route("/api/session/open", post(api_session_open))
        .with_state(handle)
}

/// POST /api/tasks：入队一个研究任务
async fn api_tasks_create(
    State(handle): State<AgentHandle>,
    Json(task): Json<ResearchTask>,
) -> Result<(StatusCode, Json<EnqueueResponse>), (StatusCode, String)> {
    if !task.is_well_formed() {
        return Err((StatusCode::BAD_REQUEST, "name and query are required".to_string()));
    }
    let name = task.name.clone();
    handle
        .enqueue(task)
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;
    Ok((StatusCode::ACCEPTED, Json(EnqueueResponse { accepted: name })))
}

/// GET /api/queue：待办任务名（执行顺序）
async fn api_queue(
    State(handle): State<AgentHandle>,
) -> Result<Json<Vec<String>>, (StatusCode, String)> {
    handle
        .list_queue()
        .await
        .map(Json)
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
}

/// GET /api/status：状态文本与排队数量
async fn api_status(
    State(handle): State<AgentHandle>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let queued = handle
        .list_queue()
        .await
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?
        .len();
    let detail = handle.subscribe().borrow().clone();
    Ok(Json(StatusResponse {
        status: detail.to_string(),
        detail,
        queued,
    }))
}

/// POST /api/session/open：提前打开浏览器会话（便于手动登录）
async fn api_session_open(
    State(handle): State<AgentHandle>,
) -> Result<StatusCode, (StatusCode, String)> {
    handle
        .open_session()
        .map(|()| StatusCode::ACCEPTED)
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
}
