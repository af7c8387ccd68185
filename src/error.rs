//! 统一错误处理模块
//!
//! 定义应用级错误类型，并实现 axum 的 IntoResponse trait 以便自动转换为 HTTP 响应。

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::remote::RemoteError;
use crate::services::generation::GenerationError;
use crate::services::preferences::SessionError;

/// 应用错误枚举
#[derive(Error, Debug)]
pub enum AppError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 远端存储错误
    #[error("远端错误: {0}")]
    Remote(String),

    /// 偏好会话错误
    #[error("会话错误: {0}")]
    Session(String),

    /// 文档生成错误
    #[error("生成错误: {0}")]
    Generation(String),

    /// 请求参数错误
    #[error("请求错误: {0}")]
    BadRequest(String),

    /// 资源未找到
    #[error("未找到: {0}")]
    NotFound(String),

    /// 与当前状态冲突
    #[error("冲突: {0}")]
    Conflict(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<RemoteError> for AppError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::NotFound => AppError::NotFound(e.to_string()),
            RemoteError::Config(msg) => AppError::Config(msg),
            other => AppError::Remote(other.to_string()),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::SaveInProgress => AppError::Conflict(e.to_string()),
            SessionError::InvalidStep(_) | SessionError::PayloadMismatch(_) => {
                AppError::BadRequest(e.to_string())
            }
            other => AppError::Session(other.to_string()),
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Busy => AppError::Conflict(e.to_string()),
            other => AppError::Generation(other.user_message()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Remote(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Session(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::Generation(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "success": false,
            "error": error_message
        }));

        (status, body).into_response()
    }
}

/// 便捷类型别名
pub type AppResult<T> = Result<T, AppError>;
