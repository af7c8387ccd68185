//! 文档生成类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::{RemoteError, Revision};

/// 生成参数（原样透传给生成服务）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default)]
    pub temperature: f64,
    #[serde(default)]
    pub top_p: f64,
    #[serde(default)]
    pub top_k: u32,
}

impl GenerationParams {
    /// 限制到界面允许的范围：temperature 0-2，top_p 0-1，top_k 0-100
    pub fn clamped(self) -> Self {
        let finite_or_zero = |v: f64| if v.is_finite() { v } else { 0.0 };
        Self {
            temperature: finite_or_zero(self.temperature).clamp(0.0, 2.0),
            top_p: finite_or_zero(self.top_p).clamp(0.0, 1.0),
            top_k: self.top_k.min(100),
        }
    }
}

/// 模型服务状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    #[default]
    Idle,
    Processing,
    /// 冷启动中
    WarmingUp,
    Paused,
}

impl ModelStatus {
    /// 解析 `x-model-status` 响应头
    pub fn from_header(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "booting" | "warming_up" | "loading" => Some(ModelStatus::WarmingUp),
            "paused" => Some(ModelStatus::Paused),
            _ => None,
        }
    }
}

/// 冷启动提示的触发原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmUpReason {
    /// 某次尝试返回 5xx
    ServerError,
    /// 单次尝试耗时超过阈值
    SlowResponse,
    /// 服务端通过响应头声明
    ModelHeader,
}

/// 生成进度事件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    Started {
        run_id: String,
        project_id: String,
    },
    AttemptStarted {
        attempt: u32,
        max_attempts: u32,
    },
    StatusChanged {
        status: ModelStatus,
    },
    WarmingUp {
        attempt: u32,
        reason: WarmUpReason,
    },
    Retrying {
        attempt: u32,
        delay_secs: u64,
        message: String,
    },
    Generated {
        result_count: usize,
        generation_time_seconds: f64,
    },
    RevisionReady {
        revision: Revision,
    },
    Completed {
        report: GenerationReport,
    },
    Failed {
        message: String,
        attempts: u32,
        warmed_up: bool,
    },
    Cancelled,
}

/// 生成结果报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub project_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// 实际尝试次数
    pub attempts: u32,
    /// 是否出现过冷启动提示
    pub warmed_up: bool,
    pub result_count: usize,
    /// 服务端报告的耗时，缺失时使用本地计时
    pub generation_time_seconds: f64,
    /// 最新修订版本（轮询超时则为空）
    pub revision: Option<Revision>,
}

/// 生成错误
#[derive(Debug, Error)]
pub enum GenerationError {
    /// 多次 5xx 后放弃
    #[error("生成服务不可用（已尝试 {attempts} 次）: {message}")]
    ServiceUnavailable { attempts: u32, message: String },

    /// 非 5xx 的服务端拒绝
    #[error("生成请求被拒绝 ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// 网络或未知错误
    #[error("网络错误: {0}")]
    Network(String),

    #[error("生成已取消")]
    Cancelled,

    /// 该项目已有生成任务在运行
    #[error("项目已有生成任务在运行")]
    Busy,
}

impl GenerationError {
    /// 用户可见的错误消息
    pub fn user_message(&self) -> String {
        match self {
            GenerationError::ServiceUnavailable { message, .. }
            | GenerationError::Rejected { message, .. }
            | GenerationError::Network(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// 从远端错误中取出最合适的消息
///
/// 优先服务端 detail，其次传输层错误信息，最后使用通用提示
pub(crate) fn best_message(error: &RemoteError) -> String {
    let message = match error {
        RemoteError::Api { message, .. } => message.trim().to_string(),
        RemoteError::Http(e) => e.to_string(),
        RemoteError::NotFound => String::new(),
        other => other.to_string(),
    };
    if message.is_empty() {
        "Generation failed".to_string()
    } else {
        message
    }
}
