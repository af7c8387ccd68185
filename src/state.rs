//! 应用状态管理
//!
//! 定义在请求处理器之间共享的状态。

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::remote::{PreferenceBackend, RemoteClient, RemoteError};
use crate::services::generation::{
    GenerationDriver, GenerationEvent, GenerationReport, ModelStatus,
};
use crate::services::preferences::PreferenceSession;

/// 生成任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTaskStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// 生成任务进度，供状态查询和 WebSocket 连接时回放
#[derive(Debug, Clone, Serialize)]
pub struct GenerationProgress {
    pub status: GenerationTaskStatus,
    pub started_at: DateTime<Utc>,
    pub report: Option<GenerationReport>,
    pub error: Option<String>,
    /// 已发布的事件，按顺序
    pub events: Vec<GenerationEvent>,
}

/// 一个项目的生成任务
pub struct GenerationTask {
    pub driver: Arc<GenerationDriver>,
    pub cancel: CancellationToken,
    pub progress: RwLock<GenerationProgress>,
}

impl GenerationTask {
    pub fn new(driver: Arc<GenerationDriver>) -> Self {
        Self {
            driver,
            cancel: CancellationToken::new(),
            progress: RwLock::new(GenerationProgress {
                status: GenerationTaskStatus::Running,
                started_at: Utc::now(),
                report: None,
                error: None,
                events: Vec::new(),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.driver.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.progress.read().status == GenerationTaskStatus::Running
    }

    pub fn model_status(&self) -> ModelStatus {
        self.driver.model_status()
    }

    /// 记录已发布的事件
    pub fn record_event(&self, event: GenerationEvent) {
        self.progress.write().events.push(event);
    }

    pub fn finish(&self, status: GenerationTaskStatus, report: Option<GenerationReport>, error: Option<String>) {
        let mut progress = self.progress.write();
        progress.status = status;
        progress.report = report;
        progress.error = error;
    }

    pub fn snapshot(&self) -> GenerationProgress {
        self.progress.read().clone()
    }
}

/// 偏好会话注册表（按项目 ID）
pub type SessionRegistry = DashMap<String, Arc<PreferenceSession>>;

/// 生成任务注册表（按项目 ID）
pub type GenerationRegistry = DashMap<String, Arc<GenerationTask>>;

/// 应用共享状态
///
/// 使用 Arc 包裹以便在多个处理器之间安全共享
#[derive(Clone)]
pub struct AppState {
    /// 远端存储
    pub backend: Arc<dyn PreferenceBackend>,
    /// 偏好会话注册表
    pub sessions: Arc<SessionRegistry>,
    /// 生成任务注册表
    pub generations: Arc<GenerationRegistry>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(backend: Arc<dyn PreferenceBackend>) -> Self {
        Self {
            backend,
            sessions: Arc::new(DashMap::new()),
            generations: Arc::new(DashMap::new()),
        }
    }

    /// 按配置创建远端客户端
    pub fn from_config(config: &AppConfig) -> Result<Self, RemoteError> {
        let client = RemoteClient::new(
            &config.remote_base_url,
            config.request_timeout_secs,
            config.generation_timeout_secs,
        )?;
        Ok(Self::new(Arc::new(client)))
    }

    pub fn session(&self, project_id: &str) -> Option<Arc<PreferenceSession>> {
        self.sessions.get(project_id).map(|entry| entry.value().clone())
    }

    pub fn generation(&self, project_id: &str) -> Option<Arc<GenerationTask>> {
        self.generations.get(project_id).map(|entry| entry.value().clone())
    }
}

/// 创建可共享的应用状态
pub fn create_shared_state(config: &AppConfig) -> Result<Arc<AppState>, RemoteError> {
    Ok(Arc::new(AppState::from_config(config)?))
}
