//! 远端存储的错误与响应类型

use serde::{Deserialize, Serialize};

use crate::services::preferences::deserialize_opt_id;

/// 远端存储错误
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// 资源不存在（404）
    #[error("资源不存在")]
    NotFound,

    /// 服务端返回非 2xx 状态
    #[error("API 错误 ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        /// `x-model-status` 响应头
        model_status: Option<String>,
    },

    /// HTTP 传输错误
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON 解析错误
    #[error("JSON 解析失败: {0}")]
    Json(#[from] serde_json::Error),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound)
    }

    /// HTTP 状态码（传输错误没有状态码）
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::NotFound => Some(404),
            RemoteError::Api { status, .. } => Some(*status),
            RemoteError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| s >= 500)
    }

    pub fn model_status(&self) -> Option<&str> {
        match self {
            RemoteError::Api { model_status, .. } => model_status.as_deref(),
            _ => None,
        }
    }
}

/// 生成接口响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationResponse {
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
    #[serde(default)]
    pub generation_time_seconds: Option<f64>,
}

/// 文档修订版本摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    #[serde(alias = "id", deserialize_with = "deserialize_opt_id", default)]
    pub revision_id: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// 修订版本列表（最新在前）
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RevisionList {
    #[serde(default)]
    pub revisions: Vec<Revision>,
}

/// FastAPI 错误响应体
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub detail: serde_json::Value,
}

impl ErrorBody {
    /// `detail` 可能是字符串，也可能是校验错误数组
    pub fn message(&self) -> Option<String> {
        match &self.detail {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => {
                let messages: Vec<String> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .map(str::to_string)
                    .collect();
                if messages.is_empty() {
                    None
                } else {
                    Some(messages.join("; "))
                }
            }
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(RemoteError::NotFound.is_not_found());
        let api = RemoteError::Api {
            status: 502,
            message: "Bad Gateway".to_string(),
            model_status: Some("booting".to_string()),
        };
        assert!(api.is_server_error());
        assert_eq!(api.model_status(), Some("booting"));
        assert!(!RemoteError::Config("x".to_string()).is_server_error());
    }

    #[test]
    fn test_error_body_message() {
        let body: ErrorBody = serde_json::from_str(r#"{"detail": "Project not found"}"#).unwrap();
        assert_eq!(body.message().as_deref(), Some("Project not found"));

        let body: ErrorBody = serde_json::from_str(
            r#"{"detail": [{"loc": ["body", "format"], "msg": "field required"}]}"#,
        )
        .unwrap();
        assert_eq!(body.message().as_deref(), Some("field required"));
    }

    #[test]
    fn test_revision_accepts_id_alias() {
        let list: RevisionList =
            serde_json::from_str(r#"{"revisions": [{"id": "r2", "format": "HTML"}, {"revision_id": "r1"}]}"#)
                .unwrap();
        assert_eq!(list.revisions[0].revision_id.as_deref(), Some("r2"));
        assert_eq!(list.revisions[1].revision_id.as_deref(), Some("r1"));
    }
}
