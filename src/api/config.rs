//! 配置管理端点

use axum::{routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{get_config, update_config, AppConfig};
use crate::error::{AppError, AppResult};
use crate::remote::fix_base_url;
use crate::state::AppState;

/// 配置响应（隐藏 api_token 的实际值）
#[derive(Serialize)]
pub struct ConfigResponse {
    /// 是否已设置默认令牌
    pub api_token_set: bool,
    pub remote_base_url: String,
    pub request_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_backoff_secs: Vec<u64>,
    pub warm_up_threshold_secs: u64,
    pub revision_poll_interval_secs: u64,
    pub revision_poll_timeout_secs: u64,
    pub exclude_file_presets: Vec<String>,
    pub exclude_dir_presets: Vec<String>,
}

impl From<AppConfig> for ConfigResponse {
    fn from(config: AppConfig) -> Self {
        Self {
            api_token_set: !config.api_token.is_empty(),
            remote_base_url: config.remote_base_url,
            request_timeout_secs: config.request_timeout_secs,
            generation_timeout_secs: config.generation_timeout_secs,
            retry_max_attempts: config.retry_max_attempts,
            retry_backoff_secs: config.retry_backoff_secs,
            warm_up_threshold_secs: config.warm_up_threshold_secs,
            revision_poll_interval_secs: config.revision_poll_interval_secs,
            revision_poll_timeout_secs: config.revision_poll_timeout_secs,
            exclude_file_presets: config.exclude_file_presets,
            exclude_dir_presets: config.exclude_dir_presets,
        }
    }
}

/// 配置更新请求
///
/// 远端地址和超时在进程启动时读取，修改后需重启生效
#[derive(Deserialize)]
pub struct ConfigUpdateRequest {
    pub api_token: Option<String>,
    pub remote_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub generation_timeout_secs: Option<u64>,
    pub retry_max_attempts: Option<u32>,
    pub retry_backoff_secs: Option<Vec<u64>>,
    pub warm_up_threshold_secs: Option<u64>,
    pub revision_poll_interval_secs: Option<u64>,
    pub revision_poll_timeout_secs: Option<u64>,
    pub exclude_file_presets: Option<Vec<String>>,
    pub exclude_dir_presets: Option<Vec<String>>,
}

/// 配置更新响应
#[derive(Serialize)]
pub struct ConfigUpdateResponse {
    pub success: bool,
    pub message: String,
}

/// 获取当前配置
async fn get_config_handler() -> Json<ConfigResponse> {
    let config = get_config();
    Json(ConfigResponse::from(config))
}

/// 更新配置
async fn update_config_handler(
    Json(req): Json<ConfigUpdateRequest>,
) -> AppResult<Json<ConfigUpdateResponse>> {
    if req.retry_max_attempts == Some(0) {
        return Err(AppError::BadRequest("retry_max_attempts must be at least 1".to_string()));
    }
    let remote_base_url = match req.remote_base_url {
        Some(url) if url.trim().is_empty() => {
            return Err(AppError::BadRequest("remote_base_url is required".to_string()));
        }
        Some(url) => Some(fix_base_url(&url)),
        None => None,
    };

    update_config(|config| {
        if let Some(api_token) = req.api_token {
            config.api_token = api_token;
        }
        if let Some(url) = remote_base_url {
            config.remote_base_url = url;
        }
        if let Some(secs) = req.request_timeout_secs {
            config.request_timeout_secs = secs;
        }
        if let Some(secs) = req.generation_timeout_secs {
            config.generation_timeout_secs = secs;
        }
        if let Some(attempts) = req.retry_max_attempts {
            config.retry_max_attempts = attempts;
        }
        if let Some(backoff) = req.retry_backoff_secs {
            config.retry_backoff_secs = backoff;
        }
        if let Some(secs) = req.warm_up_threshold_secs {
            config.warm_up_threshold_secs = secs;
        }
        if let Some(secs) = req.revision_poll_interval_secs {
            config.revision_poll_interval_secs = secs;
        }
        if let Some(secs) = req.revision_poll_timeout_secs {
            config.revision_poll_timeout_secs = secs;
        }
        if let Some(presets) = req.exclude_file_presets {
            config.exclude_file_presets = presets;
        }
        if let Some(presets) = req.exclude_dir_presets {
            config.exclude_dir_presets = presets;
        }
    })?;

    Ok(Json(ConfigUpdateResponse {
        success: true,
        message: "Config updated successfully".to_string(),
    }))
}

/// 创建配置路由
pub fn config_routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/config",
        get(get_config_handler).put(update_config_handler),
    )
}
