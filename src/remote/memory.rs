//! 内存中的远端存储实现（测试用）

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use super::backend::PreferenceBackend;
use super::types::{GenerationResponse, RemoteError, Revision};
use crate::services::generation::GenerationParams;
use crate::services::preferences::{
    Credentials, DocFormat, DocumentationPlan, FileRecord, FileTreeNode, PreferenceDocument,
};

/// 预设的失败响应
#[derive(Debug, Clone)]
pub(crate) struct Failure {
    pub status: u16,
    pub message: String,
    pub model_status: Option<String>,
}

impl Failure {
    pub fn status(status: u16, message: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
            model_status: None,
        }
    }

    fn to_error(&self) -> RemoteError {
        if self.status == 404 {
            RemoteError::NotFound
        } else {
            RemoteError::Api {
                status: self.status,
                message: self.message.clone(),
                model_status: self.model_status.clone(),
            }
        }
    }
}

/// 一次生成调用的脚本
#[derive(Debug, Clone)]
pub(crate) struct GenerateStep {
    pub delay: Duration,
    pub outcome: Result<GenerationResponse, Failure>,
}

impl GenerateStep {
    pub fn ok(result_count: usize) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Ok(GenerationResponse {
                results: vec![serde_json::json!({"status": "completed"}); result_count],
                generation_time_seconds: Some(1.5),
            }),
        }
    }

    pub fn fail(status: u16, message: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Err(Failure::status(status, message)),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// 暂停更新请求，直到测试放行
#[derive(Default)]
pub(crate) struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Default)]
pub(crate) struct MemoryBackend {
    pub tree: Mutex<Option<FileTreeNode>>,
    pub files: Mutex<Vec<FileRecord>>,
    pub document: Mutex<Option<PreferenceDocument>>,
    pub fetch_failure: Mutex<Option<Failure>>,
    pub update_failure: Mutex<Option<Failure>>,
    /// 服务端写入时强制使用的格式
    pub clamp_format: Mutex<Option<DocFormat>>,
    pub update_gate: Mutex<Option<Arc<Gate>>>,
    pub generate_script: Mutex<VecDeque<GenerateStep>>,
    pub revisions: Mutex<Vec<Revision>>,
    pub status_failure: Mutex<Option<Failure>>,
    pub status_updates: Mutex<Vec<String>>,
    /// 调用日志
    pub calls: Mutex<Vec<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tree(self, tree: FileTreeNode) -> Self {
        *self.tree.lock() = Some(tree);
        self
    }

    pub fn with_files(self, files: Vec<FileRecord>) -> Self {
        *self.files.lock() = files;
        self
    }

    pub fn with_document(self, document: PreferenceDocument) -> Self {
        *self.document.lock() = Some(document);
        self
    }

    pub fn script_generate(&self, steps: Vec<GenerateStep>) {
        self.generate_script.lock().extend(steps);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count_calls(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == name).count()
    }

    fn record(&self, name: &str) {
        self.calls.lock().push(name.to_string());
    }

    fn store(&self, document: &PreferenceDocument) {
        let mut stored = document.clone();
        if let Some(format) = *self.clamp_format.lock() {
            stored.set_format(format);
        }
        *self.document.lock() = Some(stored);
    }
}

#[async_trait]
impl PreferenceBackend for MemoryBackend {
    async fn fetch_file_tree(
        &self,
        _project_id: &str,
        _credentials: &Credentials,
    ) -> Result<FileTreeNode, RemoteError> {
        self.record("fetch_file_tree");
        self.tree
            .lock()
            .clone()
            .map(FileTreeNode::anchored)
            .ok_or(RemoteError::NotFound)
    }

    async fn fetch_all_files(
        &self,
        _project_id: &str,
        _credentials: &Credentials,
    ) -> Result<Vec<FileRecord>, RemoteError> {
        self.record("fetch_all_files");
        Ok(self.files.lock().clone())
    }

    async fn fetch_preference_document(
        &self,
        _project_id: &str,
        _credentials: &Credentials,
    ) -> Result<PreferenceDocument, RemoteError> {
        self.record("fetch_preference_document");
        if let Some(failure) = self.fetch_failure.lock().clone() {
            return Err(failure.to_error());
        }
        self.document.lock().clone().ok_or(RemoteError::NotFound)
    }

    async fn create_preference_document(
        &self,
        _project_id: &str,
        _credentials: &Credentials,
        document: &PreferenceDocument,
    ) -> Result<(), RemoteError> {
        self.record("create_preference_document");
        self.store(document);
        Ok(())
    }

    async fn update_preference_document(
        &self,
        _project_id: &str,
        _credentials: &Credentials,
        document: &PreferenceDocument,
    ) -> Result<(), RemoteError> {
        self.record("update_preference_document");
        let gate = self.update_gate.lock().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if let Some(failure) = self.update_failure.lock().clone() {
            return Err(failure.to_error());
        }
        if self.document.lock().is_none() {
            return Err(RemoteError::NotFound);
        }
        self.store(document);
        Ok(())
    }

    async fn fetch_documentation_plan(
        &self,
        _project_id: &str,
        _credentials: &Credentials,
    ) -> Result<DocumentationPlan, RemoteError> {
        self.record("fetch_documentation_plan");
        let format = self
            .document
            .lock()
            .as_ref()
            .map(|d| d.doc_format())
            .unwrap_or_default();
        Ok(DocumentationPlan {
            format,
            ..Default::default()
        })
    }

    async fn generate_documentation(
        &self,
        _project_id: &str,
        _credentials: &Credentials,
        _params: &GenerationParams,
    ) -> Result<GenerationResponse, RemoteError> {
        self.record("generate_documentation");
        let step = self
            .generate_script
            .lock()
            .pop_front()
            .unwrap_or_else(|| GenerateStep::ok(0));
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.outcome.map_err(|failure| failure.to_error())
    }

    async fn update_project_status(
        &self,
        _project_id: &str,
        _credentials: &Credentials,
        status: &str,
    ) -> Result<(), RemoteError> {
        self.record("update_project_status");
        if let Some(failure) = self.status_failure.lock().clone() {
            return Err(failure.to_error());
        }
        self.status_updates.lock().push(status.to_string());
        Ok(())
    }

    async fn list_revisions(
        &self,
        _project_id: &str,
        _credentials: &Credentials,
    ) -> Result<Vec<Revision>, RemoteError> {
        self.record("list_revisions");
        Ok(self.revisions.lock().clone())
    }
}
