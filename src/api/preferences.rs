//! 文档偏好 API 端点
//!
//! 每个项目同一时间持有一个偏好会话，所有修改都作用在会话的工作状态上，
//! 完成步骤时才写入远端。

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::config::get_config;
use crate::error::{AppError, AppResult};
use crate::remote::is_valid_project_id;
use crate::services::preferences::{
    Credentials, DirectoryExclusionUpdate, DocFormat, DocumentationPlan, PerFileExclusionEntry,
    PreferenceSession, ProjectSettings, SessionError, SessionSnapshot, StepPayload, SymbolKind,
    WizardStep,
};
use crate::state::AppState;

/// 创建偏好路由
pub fn preferences_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/projects/:id/session",
            post(open_session).get(get_session).delete(close_session),
        )
        .route("/api/projects/:id/session/paths", post(set_path_included))
        .route("/api/projects/:id/session/defaults", post(apply_defaults))
        .route("/api/projects/:id/session/symbols/toggle", post(toggle_symbol))
        .route("/api/projects/:id/session/symbols/bulk", post(bulk_set_symbols))
        .route("/api/projects/:id/session/symbols/reset", post(reset_file_symbols))
        .route("/api/projects/:id/session/format", post(set_format))
        .route("/api/projects/:id/session/steps/:step", post(complete_step))
        .route("/api/projects/:id/session/steps/:step/goto", post(go_to_step))
        .route("/api/projects/:id/session/reset", post(reset_all))
        .route("/api/projects/:id/session/plan", get(preview_plan))
        .route("/api/projects/:id/plan", get(remote_plan))
}

/// 从请求头取 Bearer 令牌，没有时使用配置中的默认令牌
pub(crate) fn credentials_from(headers: &HeaderMap) -> Credentials {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token.trim())
        .filter(|token| !token.is_empty())
        .map(Credentials::new)
        .unwrap_or_else(|| Credentials::new(get_config().api_token))
}

pub(crate) fn validate_project_id(project_id: &str) -> AppResult<()> {
    if is_valid_project_id(project_id) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("无效的项目 ID: {}", project_id)))
    }
}

fn session_for(state: &AppState, project_id: &str) -> AppResult<Arc<PreferenceSession>> {
    validate_project_id(project_id)?;
    state
        .session(project_id)
        .ok_or_else(|| AppError::NotFound(format!("Session not found for project: {}", project_id)))
}

/// 保存类操作的统一结果：成功返回快照，失败返回会话记录的错误
fn save_outcome(session: &PreferenceSession, saved: bool) -> AppResult<Json<SessionSnapshot>> {
    if saved {
        Ok(Json(session.snapshot()))
    } else {
        Err(AppError::Session(
            session.error().unwrap_or_else(|| "保存失败".to_string()),
        ))
    }
}

fn ensure_idle(session: &PreferenceSession) -> AppResult<()> {
    if session.is_saving() {
        Err(SessionError::SaveInProgress.into())
    } else {
        Ok(())
    }
}

/// 打开（或重新打开）项目的偏好会话
async fn open_session(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<SessionSnapshot>> {
    validate_project_id(&project_id)?;
    let credentials = credentials_from(&headers);

    let session = Arc::new(PreferenceSession::new(
        state.backend.clone(),
        get_config().exclusion_presets(),
    ));
    if let Some(previous) = state.sessions.insert(project_id.clone(), session.clone()) {
        previous.close();
    }

    info!("Opening preference session for project {}", project_id);
    // 初始化错误记录在快照的 error 字段中，会话仍可使用
    session.initialize(&project_id, credentials).await;
    Ok(Json(session.snapshot()))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> AppResult<Json<SessionSnapshot>> {
    let session = session_for(&state, &project_id)?;
    Ok(Json(session.snapshot()))
}

async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> AppResult<Json<Value>> {
    validate_project_id(&project_id)?;
    let (_, session) = state
        .sessions
        .remove(&project_id)
        .ok_or_else(|| AppError::NotFound(format!("Session not found for project: {}", project_id)))?;
    session.close();
    info!("Preference session closed for project {}", project_id);
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct PathInclusionRequest {
    path: String,
    included: bool,
}

async fn set_path_included(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<PathInclusionRequest>,
) -> AppResult<Json<Value>> {
    let session = session_for(&state, &project_id)?;
    if !session.set_path_included(&req.path, req.included) {
        return Err(AppError::NotFound(format!("路径不存在: {}", req.path)));
    }
    Ok(Json(json!({
        "success": true,
        "included_files_count": session.included_files_count(),
        "directory_exclusion": session.directory_exclusion(),
    })))
}

async fn apply_defaults(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> AppResult<Json<Value>> {
    let session = session_for(&state, &project_id)?;
    let added = session.apply_default_exclusions();
    Ok(Json(json!({
        "success": true,
        "added": added,
        "included_files_count": session.included_files_count(),
    })))
}

#[derive(Debug, Deserialize)]
struct ToggleSymbolRequest {
    file: String,
    kind: SymbolKind,
    name: String,
    /// 方法所属的类
    #[serde(default)]
    class: Option<String>,
}

async fn toggle_symbol(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<ToggleSymbolRequest>,
) -> AppResult<Json<Value>> {
    let session = session_for(&state, &project_id)?;
    let excluded = match req.kind {
        SymbolKind::Functions => session.toggle_function(&req.file, &req.name),
        SymbolKind::Classes => session.toggle_class(&req.file, &req.name),
        SymbolKind::Methods => session.toggle_method(&req.file, &req.name, req.class.as_deref()),
    }
    .ok_or(SessionError::NotInitialized)?;
    Ok(Json(json!({ "success": true, "excluded": excluded })))
}

#[derive(Debug, Deserialize)]
struct BulkSymbolsRequest {
    file: String,
    kind: SymbolKind,
    names: Vec<String>,
    exclude: bool,
}

async fn bulk_set_symbols(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<BulkSymbolsRequest>,
) -> AppResult<Json<Value>> {
    let session = session_for(&state, &project_id)?;
    if !session.bulk_set(&req.file, req.kind, &req.names, req.exclude) {
        return Err(SessionError::NotInitialized.into());
    }
    Ok(Json(json!({ "success": true, "counts": session.function_class_counts() })))
}

#[derive(Debug, Deserialize)]
struct ResetSymbolsRequest {
    file: String,
}

async fn reset_file_symbols(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<ResetSymbolsRequest>,
) -> AppResult<Json<Value>> {
    let session = session_for(&state, &project_id)?;
    if !session.reset_file_symbols(&req.file) {
        return Err(SessionError::NotInitialized.into());
    }
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct FormatRequest {
    format: String,
}

async fn set_format(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<FormatRequest>,
) -> AppResult<Json<Value>> {
    let session = session_for(&state, &project_id)?;
    let format: DocFormat = req.format.parse().map_err(AppError::BadRequest)?;
    if !session.set_doc_format(format) {
        return Err(SessionError::NotInitialized.into());
    }
    Ok(Json(json!({ "success": true, "format": format })))
}

/// 完成步骤请求，缺省字段取会话当前的工作状态
#[derive(Debug, Default, Deserialize)]
struct CompleteStepRequest {
    #[serde(default)]
    directory_exclusion: Option<DirectoryExclusionUpdate>,
    #[serde(default)]
    per_file_exclusion: Option<Vec<PerFileExclusionEntry>>,
    #[serde(default)]
    project_settings: Option<ProjectSettings>,
}

fn parse_step(step: u8) -> AppResult<WizardStep> {
    WizardStep::try_from(step).map_err(|n| SessionError::InvalidStep(n).into())
}

async fn complete_step(
    State(state): State<Arc<AppState>>,
    Path((project_id, step)): Path<(String, u8)>,
    body: Option<Json<CompleteStepRequest>>,
) -> AppResult<Json<SessionSnapshot>> {
    let session = session_for(&state, &project_id)?;
    let step = parse_step(step)?;
    ensure_idle(&session)?;
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let saved = match step {
        WizardStep::FilePreferences => match req.directory_exclusion {
            Some(exclusion) => {
                session
                    .complete_step(step, StepPayload::Directory(exclusion))
                    .await
            }
            None => session.save_file_preferences().await,
        },
        WizardStep::SymbolPreferences => match req.per_file_exclusion {
            Some(entries) => session.complete_step(step, StepPayload::Symbols(entries)).await,
            None => session.save_symbol_preferences().await,
        },
        WizardStep::Finalize => {
            let update = req.project_settings.unwrap_or_else(|| ProjectSettings {
                format: Some(session.doc_format()),
                ..Default::default()
            });
            session.save_project_settings(update).await
        }
    };
    save_outcome(&session, saved)
}

async fn go_to_step(
    State(state): State<Arc<AppState>>,
    Path((project_id, step)): Path<(String, u8)>,
) -> AppResult<Json<Value>> {
    let session = session_for(&state, &project_id)?;
    let step = parse_step(step)?;
    if !session.go_to_step(step) {
        return Err(AppError::Conflict(format!("步骤 {} 尚不可访问", step.index())));
    }
    Ok(Json(json!({ "success": true, "current_step": step })))
}

async fn reset_all(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> AppResult<Json<SessionSnapshot>> {
    let session = session_for(&state, &project_id)?;
    ensure_idle(&session)?;
    let saved = session.reset_all().await;
    save_outcome(&session, saved)
}

/// 按会话工作状态在本地预览文档计划
async fn preview_plan(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> AppResult<Json<DocumentationPlan>> {
    let session = session_for(&state, &project_id)?;
    Ok(Json(session.preview_plan()))
}

/// 获取远端计算的文档计划
async fn remote_plan(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<DocumentationPlan>> {
    validate_project_id(&project_id)?;
    let credentials = credentials_from(&headers);
    let plan = state
        .backend
        .fetch_documentation_plan(&project_id, &credentials)
        .await?;
    Ok(Json(plan))
}
