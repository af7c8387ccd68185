//! 文档生成 API 端点
//!
//! 提供生成任务的 REST API 和 WebSocket 进度推送

use axum::{
    extract::{ws::Message, Path, State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::preferences::{credentials_from, validate_project_id};
use crate::config::get_config;
use crate::error::{AppError, AppResult};
use crate::services::generation::{
    GenerationDriver, GenerationError, GenerationEvent, GenerationParams, ModelStatus,
};
use crate::state::{AppState, GenerationProgress, GenerationTask, GenerationTaskStatus};

/// 创建文档生成路由
pub fn generation_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/projects/:id/generate",
            post(start_generation).get(get_generation_status),
        )
        .route("/api/projects/:id/generate/cancel", post(cancel_generation))
        .route("/ws/projects/:id/generate", get(ws_handler))
}

/// 生成状态响应
#[derive(Debug, Serialize)]
pub struct GenerationStatusResponse {
    pub model_status: ModelStatus,
    #[serde(flatten)]
    pub progress: GenerationProgress,
}

fn is_terminal(event: &GenerationEvent) -> bool {
    matches!(
        event,
        GenerationEvent::Completed { .. } | GenerationEvent::Failed { .. } | GenerationEvent::Cancelled
    )
}

/// 启动文档生成任务
async fn start_generation(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<GenerationParams>>,
) -> AppResult<Json<Value>> {
    validate_project_id(&project_id)?;
    let params = body.map(|Json(p)| p).unwrap_or_default().clamped();
    let credentials = credentials_from(&headers);
    let config = get_config();

    let driver = Arc::new(GenerationDriver::new(
        state.backend.clone(),
        config.retry_policy(),
        config.revision_polling(),
    ));
    let task = Arc::new(GenerationTask::new(driver.clone()));

    // 同一项目只允许一个运行中的任务
    {
        let mut entry = state
            .generations
            .entry(project_id.clone())
            .or_insert_with(|| task.clone());
        if !Arc::ptr_eq(entry.value(), &task) {
            if entry.value().is_running() {
                return Err(GenerationError::Busy.into());
            }
            *entry.value_mut() = task.clone();
        }
    }

    info!(
        "Received generation request: project={}, temperature={}, top_p={}, top_k={}",
        project_id, params.temperature, params.top_p, params.top_k
    );

    // 在任务开始前订阅，保证事件全部被记录
    let mut rx = task.subscribe();
    let recorder = task.clone();
    let recorder_project = project_id.clone();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let done = is_terminal(&event);
                    recorder.record_event(event);
                    if done {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Generation event recorder lagged by {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        info!("Generation event recording ended for {}", recorder_project);
    });

    let runner = task.clone();
    let runner_project = project_id.clone();
    tokio::spawn(async move {
        let result = runner
            .driver
            .generate(&runner_project, &credentials, params, &runner.cancel)
            .await;
        match result {
            Ok(report) => runner.finish(GenerationTaskStatus::Completed, Some(report), None),
            Err(GenerationError::Cancelled) => {
                runner.finish(GenerationTaskStatus::Cancelled, None, None)
            }
            Err(e) => runner.finish(GenerationTaskStatus::Failed, None, Some(e.user_message())),
        }
    });

    Ok(Json(json!({
        "success": true,
        "project_id": project_id,
        "status": GenerationTaskStatus::Running,
    })))
}

/// 获取生成任务状态
async fn get_generation_status(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> AppResult<Json<GenerationStatusResponse>> {
    validate_project_id(&project_id)?;
    let task = state
        .generation(&project_id)
        .ok_or_else(|| AppError::NotFound(format!("No generation for project: {}", project_id)))?;

    Ok(Json(GenerationStatusResponse {
        model_status: task.model_status(),
        progress: task.snapshot(),
    }))
}

/// 取消生成任务
async fn cancel_generation(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> AppResult<Json<Value>> {
    validate_project_id(&project_id)?;
    let task = state
        .generation(&project_id)
        .ok_or_else(|| AppError::NotFound(format!("No generation for project: {}", project_id)))?;

    if !task.is_running() {
        return Err(AppError::Conflict("没有正在运行的生成任务".to_string()));
    }
    task.cancel.cancel();
    info!("Generation cancel requested: {}", project_id);

    Ok(Json(json!({
        "success": true,
        "message": "Generation cancelled"
    })))
}

/// WebSocket 进度推送处理器
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, project_id))
}

fn to_message(event: &GenerationEvent) -> Option<Message> {
    serde_json::to_string(event).ok().map(Message::Text)
}

/// 处理 WebSocket 连接
async fn handle_ws_connection(
    socket: axum::extract::ws::WebSocket,
    state: Arc<AppState>,
    project_id: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let task = match state.generation(&project_id) {
        Some(task) => task,
        None => {
            let error = json!({
                "type": "error",
                "message": format!("No generation for project: {}", project_id),
            });
            let _ = sender.send(Message::Text(error.to_string())).await;
            return;
        }
    };

    info!("WebSocket connection established: project={}", project_id);

    // 先订阅再回放，连接期间发布的事件可能重复出现一次
    let mut rx = task.subscribe();
    let history = task.snapshot().events;
    info!("Replaying {} generation events for {}", history.len(), project_id);
    for event in &history {
        let Some(message) = to_message(event) else { continue };
        if sender.send(message).await.is_err() {
            return;
        }
        if is_terminal(event) {
            return;
        }
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        let Some(message) = to_message(&event) else { continue };
                        if sender.send(message).await.is_err() {
                            break;
                        }
                        if is_terminal(&event) {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            // 处理客户端消息（主要是 ping/pong）
            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket connection closed: project={}", project_id);
}
