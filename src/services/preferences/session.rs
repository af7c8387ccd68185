//! 偏好会话
//!
//! 会话持有一个项目在偏好向导中的全部状态：只读的文件树和符号元数据、
//! 目录排除与符号排除的工作状态、向导进度，以及两阶段的文档副本
//! （`pending_local` 为乐观写入的候选，`confirmed_remote` 为服务端确认的版本）。
//!
//! 状态放在 `parking_lot::RwLock` 中，锁从不跨越 `.await`。
//! 每个异步结果在写回前都会检查会话纪元，会话关闭后到达的结果直接丢弃。

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::inclusion::{DirectoryExclusion, DirectoryExclusionUpdate, ExclusionPresets, InclusionResolver};
use super::path::node_path;
use super::plan::{self, AllItemCounts, FunctionClassCounts};
use super::symbols::{PerFileExclusionEntry, SymbolExclusionStore, SymbolKind};
use super::tree::{find_by_path, FileTreeNode};
use super::types::{
    Credentials, DocFormat, DocumentationPlan, FileRecord, PreferenceDocument, ProjectSettings,
};
use super::wizard::{StepStatus, WizardState, WizardStep};
use crate::remote::{PreferenceBackend, RemoteError};

/// 会话错误
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("会话尚未初始化")]
    NotInitialized,

    #[error("已有保存操作正在进行")]
    SaveInProgress,

    #[error("无效的步骤: {0}")]
    InvalidStep(u8),

    #[error("提交内容与步骤 {0:?} 不匹配")]
    PayloadMismatch(WizardStep),

    #[error("远端存储错误: {0}")]
    Remote(#[from] RemoteError),
}

/// 会话阶段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Loading,
    Ready,
}

/// 各步骤保存的内容
#[derive(Debug, Clone)]
pub enum StepPayload {
    Directory(DirectoryExclusionUpdate),
    Symbols(Vec<PerFileExclusionEntry>),
    Settings(ProjectSettings),
}

impl StepPayload {
    fn owner(&self) -> WizardStep {
        match self {
            StepPayload::Directory(_) => WizardStep::FilePreferences,
            StepPayload::Symbols(_) => WizardStep::SymbolPreferences,
            StepPayload::Settings(_) => WizardStep::Finalize,
        }
    }
}

struct SessionInner {
    phase: SessionPhase,
    project_id: Option<String>,
    credentials: Credentials,
    error: Option<String>,
    tree: Arc<FileTreeNode>,
    files: Arc<Vec<FileRecord>>,
    resolver: InclusionResolver,
    symbols: SymbolExclusionStore,
    settings: ProjectSettings,
    format: DocFormat,
    wizard: WizardState,
    pending_local: Option<PreferenceDocument>,
    confirmed_remote: Option<PreferenceDocument>,
}

impl Default for SessionInner {
    fn default() -> Self {
        let document = PreferenceDocument::default();
        Self {
            phase: SessionPhase::Uninitialized,
            project_id: None,
            credentials: Credentials::default(),
            error: None,
            tree: Arc::new(FileTreeNode::empty_root()),
            files: Arc::new(Vec::new()),
            resolver: InclusionResolver::default(),
            symbols: SymbolExclusionStore::default(),
            settings: document.project_settings,
            format: document.format,
            wizard: WizardState::default(),
            pending_local: None,
            confirmed_remote: None,
        }
    }
}

impl SessionInner {
    fn is_ready(&self) -> bool {
        self.phase == SessionPhase::Ready && self.project_id.is_some()
    }

    /// 以文档覆盖工作状态
    fn apply_document(&mut self, document: &PreferenceDocument) {
        self.resolver.replace(document.directory_exclusion.clone());
        self.symbols.replace_entries(document.per_file_exclusion.clone());
        self.settings = document.project_settings.clone();
        self.format = document.format;
    }

    /// 由工作状态组装文档
    fn working_document(&self) -> PreferenceDocument {
        let mut settings = self.settings.clone();
        settings.format = Some(self.format);
        PreferenceDocument {
            directory_exclusion: self.resolver.exclusion().clone(),
            per_file_exclusion: self.symbols.serialize(),
            project_settings: settings,
            format: self.format,
            current_step: self.wizard.current().index(),
        }
    }
}

/// 在离开作用域时清除保存中标记
struct SavingGuard<'a>(&'a AtomicBool);

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 偏好会话
pub struct PreferenceSession {
    id: String,
    backend: Arc<dyn PreferenceBackend>,
    presets: ExclusionPresets,
    inner: RwLock<SessionInner>,
    saving: AtomicBool,
    epoch: AtomicU64,
}

impl PreferenceSession {
    pub fn new(backend: Arc<dyn PreferenceBackend>, presets: ExclusionPresets) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            backend,
            presets,
            inner: RwLock::new(SessionInner::default()),
            saving: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    // ========== 生命周期 ==========

    /// 初始化会话：并发获取文件树、文件元数据和偏好文档
    ///
    /// 文档不存在时使用全部包含的默认文档；其他错误会记录到会话错误，
    /// 偏好回到默认值，向导完全重置。返回是否没有错误。
    pub async fn initialize(&self, project_id: &str, credentials: Credentials) -> bool {
        let epoch = {
            let mut inner = self.inner.write();
            let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            *inner = SessionInner::default();
            inner.phase = SessionPhase::Loading;
            inner.project_id = Some(project_id.to_string());
            inner.credentials = credentials.clone();
            epoch
        };

        info!("Initializing preference session {} for project {}", self.id, project_id);

        let (tree, files, document) = tokio::join!(
            self.backend.fetch_file_tree(project_id, &credentials),
            self.backend.fetch_all_files(project_id, &credentials),
            self.backend.fetch_preference_document(project_id, &credentials),
        );

        // 纪元只在持有写锁时变更，持锁检查后结果不会被 close 打断
        let mut guard = self.inner.write();
        if !self.is_current(epoch) {
            debug!("Discarding stale initialization result for project {}", project_id);
            return false;
        }

        let mut errors = Vec::new();
        let tree = tree.unwrap_or_else(|e| {
            warn!("Failed to fetch file tree for {}: {}", project_id, e);
            errors.push(format!("文件树获取失败: {}", e));
            FileTreeNode::empty_root()
        });
        let files = files.unwrap_or_else(|e| {
            warn!("Failed to fetch file metadata for {}: {}", project_id, e);
            errors.push(format!("文件元数据获取失败: {}", e));
            Vec::new()
        });

        let inner = &mut *guard;
        inner.tree = Arc::new(tree.anchored());
        inner.files = Arc::new(files);
        inner.symbols.set_catalog(&inner.files);

        match document {
            Ok(document) => {
                inner.apply_document(&document);
                inner.wizard = WizardState::restored(document.current_step);
                inner.confirmed_remote = Some(document);
            }
            Err(e) if e.is_not_found() => {
                debug!("No preference document for {}, using defaults", project_id);
                inner.apply_document(&PreferenceDocument::default());
                inner.wizard.reset();
            }
            Err(e) => {
                warn!("Failed to fetch preferences for {}: {}", project_id, e);
                errors.push(SessionError::Remote(e).to_string());
                inner.apply_document(&PreferenceDocument::default());
                inner.wizard.reset();
                inner.confirmed_remote = None;
            }
        }

        inner.phase = SessionPhase::Ready;
        inner.error = if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        };

        info!(
            "Preference session ready: {} files, {} symbol records",
            inner.tree.file_count(),
            inner.files.len()
        );
        inner.error.is_none()
    }

    /// 关闭会话，之后到达的异步结果会被丢弃
    pub fn close(&self) {
        let mut inner = self.inner.write();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *inner = SessionInner::default();
        debug!("Preference session {} closed", self.id);
    }

    // ========== 保存 ==========

    fn record_error(&self, epoch: u64, error: &SessionError) {
        warn!("Preference session {}: {}", self.id, error);
        let mut inner = self.inner.write();
        if self.is_current(epoch) {
            inner.error = Some(error.to_string());
        }
    }

    /// 获取保存权，并返回调用时的纪元和远端参数
    fn begin_save(&self) -> Result<(SavingGuard<'_>, u64, String, Credentials), SessionError> {
        let (epoch, project_id, credentials) = {
            let inner = self.inner.read();
            match (&inner.project_id, inner.is_ready()) {
                (Some(project_id), true) => (
                    self.epoch.load(Ordering::SeqCst),
                    project_id.clone(),
                    inner.credentials.clone(),
                ),
                _ => return Err(SessionError::NotInitialized),
            }
        };

        if self
            .saving
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::SaveInProgress);
        }

        Ok((SavingGuard(&self.saving), epoch, project_id, credentials))
    }

    /// 写入远端（更新失败且不存在时改为创建），再取回权威版本
    async fn persist(
        &self,
        project_id: &str,
        credentials: &Credentials,
        candidate: &PreferenceDocument,
    ) -> Result<PreferenceDocument, SessionError> {
        match self
            .backend
            .update_preference_document(project_id, credentials, candidate)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!("Preference document missing for {}, creating", project_id);
                self.backend
                    .create_preference_document(project_id, credentials, candidate)
                    .await?;
            }
            Err(e) => return Err(e.into()),
        }

        Ok(self
            .backend
            .fetch_preference_document(project_id, credentials)
            .await?)
    }

    /// 完成某个步骤
    ///
    /// 将提交内容合并到该步骤负责的部分得到候选文档，先乐观地应用到本地，
    /// 再写入远端并以服务端版本为准合并回来。只有成功时才标记步骤完成；
    /// 失败时记录错误并返回 false，乐观状态不回滚。
    pub async fn complete_step(&self, step: WizardStep, payload: StepPayload) -> bool {
        let (_guard, epoch, project_id, credentials) = match self.begin_save() {
            Ok(save) => save,
            Err(e) => {
                self.record_error(self.epoch.load(Ordering::SeqCst), &e);
                return false;
            }
        };

        if payload.owner() != step {
            self.record_error(epoch, &SessionError::PayloadMismatch(step));
            return false;
        }

        let candidate = {
            let mut inner = self.inner.write();
            if !self.is_current(epoch) {
                return false;
            }
            let mut candidate = inner.working_document();
            match payload {
                StepPayload::Directory(update) => {
                    candidate.directory_exclusion =
                        candidate.directory_exclusion.merged(update).sanitized();
                }
                StepPayload::Symbols(entries) => {
                    candidate.per_file_exclusion = PerFileExclusionEntry::sanitize_list(entries);
                }
                StepPayload::Settings(update) => {
                    candidate.project_settings.merge(update);
                    let format = candidate.project_settings.format.unwrap_or(candidate.format);
                    candidate.set_format(format);
                }
            }
            candidate.current_step = step.index();

            inner.apply_document(&candidate);
            inner.pending_local = Some(candidate.clone());
            candidate
        };

        debug!("Saving step {:?} for project {}", step, project_id);

        let result = self.persist(&project_id, &credentials, &candidate).await;
        let mut inner = self.inner.write();
        if !self.is_current(epoch) {
            debug!("Discarding stale save result for project {}", project_id);
            return false;
        }

        match result {
            Ok(confirmed) => {
                inner.apply_document(&confirmed);
                inner.confirmed_remote = Some(confirmed);
                inner.wizard.mark_completed(step);
                inner.error = None;
                info!("Step {:?} saved for project {}", step, project_id);
                true
            }
            Err(e) => {
                warn!("Preference session {}: {}", self.id, e);
                inner.error = Some(e.to_string());
                false
            }
        }
    }

    /// 以当前目录排除状态完成步骤 0
    pub async fn save_file_preferences(&self) -> bool {
        let exclusion = self.inner.read().resolver.exclusion().clone();
        self.complete_step(
            WizardStep::FilePreferences,
            StepPayload::Directory(exclusion.into()),
        )
        .await
    }

    /// 以当前符号排除状态完成步骤 1
    pub async fn save_symbol_preferences(&self) -> bool {
        let entries = self.inner.read().symbols.serialize();
        self.complete_step(WizardStep::SymbolPreferences, StepPayload::Symbols(entries))
            .await
    }

    /// 合并设置更新并完成步骤 2
    pub async fn save_project_settings(&self, update: ProjectSettings) -> bool {
        self.complete_step(WizardStep::Finalize, StepPayload::Settings(update))
            .await
    }

    /// 写入空文档，重置全部偏好和向导
    pub async fn reset_all(&self) -> bool {
        let (_guard, epoch, project_id, credentials) = match self.begin_save() {
            Ok(save) => save,
            Err(e) => {
                self.record_error(self.epoch.load(Ordering::SeqCst), &e);
                return false;
            }
        };

        let empty = PreferenceDocument::default();
        {
            let mut inner = self.inner.write();
            if !self.is_current(epoch) {
                return false;
            }
            inner.pending_local = Some(empty.clone());
        }

        let result = self.persist(&project_id, &credentials, &empty).await;
        let mut inner = self.inner.write();
        if !self.is_current(epoch) {
            debug!("Discarding stale reset result for project {}", project_id);
            return false;
        }

        match result {
            Ok(confirmed) => {
                inner.resolver.clear();
                inner.symbols.clear();
                inner.apply_document(&confirmed);
                inner.wizard.reset();
                inner.confirmed_remote = Some(confirmed);
                inner.error = None;
                info!("Preferences reset for project {}", project_id);
                true
            }
            Err(e) => {
                warn!("Preference session {}: {}", self.id, e);
                inner.error = Some(e.to_string());
                false
            }
        }
    }

    // ========== 工作状态修改 ==========

    /// 设置路径的包含状态，路径不存在或会话未就绪时返回 false
    pub fn set_path_included(&self, path: &str, included: bool) -> bool {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if !inner.is_ready() {
            return false;
        }
        let tree = Arc::clone(&inner.tree);
        match find_by_path(&tree, path) {
            Some(entry) => {
                inner.resolver.set_included(entry.node, &entry.parent_path, included);
                true
            }
            None => false,
        }
    }

    /// 应用默认排除模式，返回新增的排除路径数
    pub fn apply_default_exclusions(&self) -> usize {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if !inner.is_ready() {
            return 0;
        }
        let tree = Arc::clone(&inner.tree);
        inner.resolver.apply_default_exclusions(&tree, &self.presets)
    }

    fn with_symbols<T>(&self, f: impl FnOnce(&mut SymbolExclusionStore) -> T) -> Option<T> {
        let mut inner = self.inner.write();
        if !inner.is_ready() {
            return None;
        }
        Some(f(&mut inner.symbols))
    }

    pub fn toggle_function(&self, file: &str, name: &str) -> Option<bool> {
        self.with_symbols(|s| s.toggle_function(file, name))
    }

    pub fn toggle_class(&self, file: &str, name: &str) -> Option<bool> {
        self.with_symbols(|s| s.toggle_class(file, name))
    }

    pub fn toggle_method(&self, file: &str, method: &str, owning_class: Option<&str>) -> Option<bool> {
        self.with_symbols(|s| s.toggle_method(file, method, owning_class))
    }

    pub fn bulk_set(&self, file: &str, kind: SymbolKind, names: &[String], exclude: bool) -> bool {
        self.with_symbols(|s| s.bulk_set(file, kind, names, exclude))
            .is_some()
    }

    pub fn reset_file_symbols(&self, file: &str) -> bool {
        self.with_symbols(|s| s.reset_file(file)).is_some()
    }

    pub fn set_doc_format(&self, format: DocFormat) -> bool {
        let mut inner = self.inner.write();
        if !inner.is_ready() {
            return false;
        }
        inner.format = format;
        inner.settings.format = Some(format);
        true
    }

    // ========== 向导 ==========

    pub fn is_step_accessible(&self, step: WizardStep) -> bool {
        self.inner.read().wizard.is_accessible(step)
    }

    pub fn is_step_completed(&self, step: WizardStep) -> bool {
        self.inner.read().wizard.is_completed(step)
    }

    pub fn step_status(&self, step: WizardStep) -> StepStatus {
        self.inner.read().wizard.status(step)
    }

    pub fn go_to_step(&self, step: WizardStep) -> bool {
        self.inner.write().wizard.go_to(step)
    }

    pub fn current_step(&self) -> WizardStep {
        self.inner.read().wizard.current()
    }

    // ========== 派生查询 ==========

    /// 被包含的文件路径（按遍历顺序）
    pub fn included_files(&self) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .tree
            .walk()
            .filter(|e| e.node.is_file() && inner.resolver.is_included(e.node, &e.parent_path))
            .map(|e| e.path)
            .collect()
    }

    pub fn included_files_count(&self) -> usize {
        let inner = self.inner.read();
        inner
            .tree
            .walk()
            .filter(|e| e.node.is_file() && inner.resolver.is_included(e.node, &e.parent_path))
            .count()
    }

    pub fn is_path_included(&self, path: &str) -> bool {
        self.inner.read().resolver.is_path_included(path)
    }

    /// 被包含且至少有一个函数或类的文件
    pub fn files_with_symbol_content(&self) -> Vec<FileRecord> {
        let inner = self.inner.read();
        plan::included_records(&inner.files, &inner.resolver)
            .filter(|(_, record)| record.has_symbols())
            .map(|(_, record)| record.clone())
            .collect()
    }

    pub fn function_class_counts(&self) -> FunctionClassCounts {
        let inner = self.inner.read();
        plan::function_class_counts(&inner.files, &inner.resolver, &inner.symbols)
    }

    pub fn all_item_counts(&self) -> AllItemCounts {
        let inner = self.inner.read();
        plan::all_item_counts(&inner.files, &inner.resolver, &inner.symbols)
    }

    /// 按当前工作状态预览文档计划
    pub fn preview_plan(&self) -> DocumentationPlan {
        let inner = self.inner.read();
        plan::preview_plan(&inner.files, &inner.resolver, &inner.symbols, inner.format)
    }

    pub fn is_function_excluded(&self, file: &str, name: &str) -> bool {
        self.inner.read().symbols.is_function_excluded(file, name)
    }

    pub fn is_class_excluded(&self, file: &str, name: &str) -> bool {
        self.inner.read().symbols.is_class_excluded(file, name)
    }

    pub fn is_method_excluded(&self, file: &str, name: &str, owning_class: Option<&str>) -> bool {
        self.inner.read().symbols.is_method_excluded(file, name, owning_class)
    }

    // ========== 状态访问 ==========

    pub fn phase(&self) -> SessionPhase {
        self.inner.read().phase
    }

    pub fn error(&self) -> Option<String> {
        self.inner.read().error.clone()
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::SeqCst)
    }

    pub fn doc_format(&self) -> DocFormat {
        self.inner.read().format
    }

    pub fn directory_exclusion(&self) -> DirectoryExclusion {
        self.inner.read().resolver.exclusion().clone()
    }

    /// 乐观写入的候选文档
    pub fn pending_local(&self) -> Option<PreferenceDocument> {
        self.inner.read().pending_local.clone()
    }

    /// 服务端确认的文档
    pub fn confirmed_remote(&self) -> Option<PreferenceDocument> {
        self.inner.read().confirmed_remote.clone()
    }

    /// 当前工作状态对应的文档
    pub fn working_document(&self) -> PreferenceDocument {
        self.inner.read().working_document()
    }

    /// 生成用于渲染的纯数据快照
    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.read();

        let steps = WizardStep::ALL
            .iter()
            .map(|&step| StepSnapshot {
                step,
                index: step.index(),
                status: inner.wizard.status(step),
            })
            .collect();

        let files = inner
            .files
            .iter()
            .filter_map(|record| {
                let key = record.key()?;
                Some(file_snapshot(&key, record, &inner.resolver, &inner.symbols))
            })
            .collect();

        let included_files_count = inner
            .tree
            .walk()
            .filter(|e| e.node.is_file() && inner.resolver.is_included(e.node, &e.parent_path))
            .count();

        SessionSnapshot {
            session_id: self.id.clone(),
            project_id: inner.project_id.clone(),
            phase: inner.phase,
            error: inner.error.clone(),
            saving: self.saving.load(Ordering::SeqCst),
            doc_format: inner.format,
            current_step: inner.wizard.current(),
            steps,
            tree: tree_snapshot(&inner.tree, "", &inner.resolver),
            files,
            included_files_count,
            counts: plan::all_item_counts(&inner.files, &inner.resolver, &inner.symbols),
        }
    }
}

// ========== 快照 ==========

/// 会话快照
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub project_id: Option<String>,
    pub phase: SessionPhase,
    pub error: Option<String>,
    pub saving: bool,
    pub doc_format: DocFormat,
    pub current_step: WizardStep,
    pub steps: Vec<StepSnapshot>,
    pub tree: TreeNodeSnapshot,
    pub files: Vec<FileSnapshot>,
    pub included_files_count: usize,
    pub counts: AllItemCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepSnapshot {
    pub step: WizardStep,
    pub index: u8,
    pub status: StepStatus,
}

/// 带包含标记的树节点
#[derive(Debug, Clone, Serialize)]
pub struct TreeNodeSnapshot {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: super::tree::NodeKind,
    pub included: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNodeSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolFlag {
    pub name: String,
    pub excluded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassFlag {
    pub name: String,
    pub excluded: bool,
    pub methods: Vec<SymbolFlag>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSnapshot {
    pub path: String,
    pub included: bool,
    pub functions: Vec<SymbolFlag>,
    pub classes: Vec<ClassFlag>,
}

fn tree_snapshot(node: &FileTreeNode, parent_path: &str, resolver: &InclusionResolver) -> TreeNodeSnapshot {
    let path = node_path(node, parent_path);
    let children = node
        .children
        .iter()
        .map(|child| tree_snapshot(child, &path, resolver))
        .collect();
    TreeNodeSnapshot {
        name: node.name.clone(),
        included: resolver.is_included(node, parent_path),
        path,
        kind: node.kind,
        children,
    }
}

fn file_snapshot(
    key: &str,
    record: &FileRecord,
    resolver: &InclusionResolver,
    symbols: &SymbolExclusionStore,
) -> FileSnapshot {
    FileSnapshot {
        path: key.to_string(),
        included: resolver.is_path_included(key),
        functions: record
            .functions
            .iter()
            .map(|f| SymbolFlag {
                name: f.name.clone(),
                excluded: symbols.is_function_excluded(key, &f.name),
            })
            .collect(),
        classes: record
            .classes
            .iter()
            .map(|c| ClassFlag {
                name: c.name.clone(),
                excluded: symbols.is_class_excluded(key, &c.name),
                methods: c
                    .methods
                    .iter()
                    .map(|m| SymbolFlag {
                        name: m.name.clone(),
                        excluded: symbols.is_method_excluded(key, &m.name, Some(&c.name)),
                    })
                    .collect(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::{Failure, Gate, MemoryBackend};
    use crate::services::preferences::types::{ClassInfo, SymbolInfo};

    fn sample_tree() -> FileTreeNode {
        FileTreeNode::dir(
            "root",
            None,
            vec![
                FileTreeNode::file("a.py", None, Some("1")),
                FileTreeNode::dir(
                    "lib",
                    None,
                    vec![
                        FileTreeNode::file("b.py", None, Some("2")),
                        FileTreeNode::file("c.py", None, Some("3")),
                    ],
                ),
            ],
        )
    }

    fn sample_files() -> Vec<FileRecord> {
        let symbol = |name: &str| SymbolInfo {
            name: name.to_string(),
            code: None,
        };
        vec![
            FileRecord {
                path: Some("a.py".to_string()),
                functions: vec![symbol("main")],
                classes: vec![ClassInfo {
                    name: "App".to_string(),
                    code: None,
                    methods: vec![symbol("run"), symbol("stop")],
                }],
                ..Default::default()
            },
            FileRecord {
                path: Some("lib/b.py".to_string()),
                functions: vec![symbol("util")],
                ..Default::default()
            },
            FileRecord {
                path: Some("lib/c.py".to_string()),
                ..Default::default()
            },
        ]
    }

    fn backend() -> Arc<MemoryBackend> {
        Arc::new(
            MemoryBackend::new()
                .with_tree(sample_tree())
                .with_files(sample_files()),
        )
    }

    fn session(backend: &Arc<MemoryBackend>) -> PreferenceSession {
        PreferenceSession::new(backend.clone(), ExclusionPresets::default())
    }

    #[tokio::test]
    async fn test_missing_document_uses_defaults() {
        let backend = backend();
        let session = session(&backend);
        assert!(session.initialize("p1", Credentials::new("token")).await);

        assert_eq!(session.phase(), SessionPhase::Ready);
        assert!(session.error().is_none());
        assert_eq!(session.included_files_count(), 3);
        assert!(session.confirmed_remote().is_none());
        assert_eq!(session.doc_format(), DocFormat::Html);
    }

    #[tokio::test]
    async fn test_fetch_error_resets_state_and_wizard() {
        let backend = backend();
        let session = session(&backend);
        *backend.document.lock() = Some(PreferenceDocument::default());
        assert!(session.initialize("p1", Credentials::default()).await);
        assert!(session.save_file_preferences().await);
        assert!(session.is_step_completed(WizardStep::FilePreferences));

        *backend.fetch_failure.lock() = Some(Failure::status(500, "database unavailable"));
        assert!(!session.initialize("p1", Credentials::default()).await);

        assert_eq!(session.phase(), SessionPhase::Ready);
        assert!(session.error().unwrap().contains("database unavailable"));
        assert!(!session.is_step_completed(WizardStep::FilePreferences));
        assert_eq!(session.current_step(), WizardStep::FilePreferences);
        assert!(session.directory_exclusion().is_empty());
    }

    #[tokio::test]
    async fn test_mutation_before_initialize_is_rejected() {
        let backend = backend();
        let session = session(&backend);
        assert!(!session.set_path_included("lib", false));
        assert_eq!(session.toggle_function("a.py", "main"), None);
        assert!(!session.save_file_preferences().await);
        assert_eq!(session.error().as_deref(), Some("会话尚未初始化"));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_step_zero_gates_other_steps() {
        let backend = backend();
        let session = session(&backend);
        session.initialize("p1", Credentials::default()).await;

        assert!(!session.is_step_accessible(WizardStep::SymbolPreferences));
        assert!(!session.go_to_step(WizardStep::Finalize));

        session.set_path_included("lib", false);
        assert!(session.save_file_preferences().await);

        assert!(session.is_step_accessible(WizardStep::SymbolPreferences));
        assert!(session.is_step_accessible(WizardStep::Finalize));
        assert!(!session.is_step_completed(WizardStep::SymbolPreferences));
        assert_eq!(session.step_status(WizardStep::FilePreferences), StepStatus::Completed);
        assert!(session.go_to_step(WizardStep::Finalize));
        assert_eq!(session.step_status(WizardStep::Finalize), StepStatus::Active);
    }

    #[tokio::test]
    async fn test_update_not_found_falls_back_to_create() {
        let backend = backend();
        let session = session(&backend);
        session.initialize("p1", Credentials::default()).await;
        session.set_path_included("lib/c.py", false);

        assert!(session.save_file_preferences().await);
        assert_eq!(backend.count_calls("update_preference_document"), 1);
        assert_eq!(backend.count_calls("create_preference_document"), 1);

        let stored = backend.document.lock().clone().unwrap();
        assert!(stored.directory_exclusion.exclude_files.contains("lib/c.py"));
        assert_eq!(stored.current_step, 0);
    }

    #[tokio::test]
    async fn test_server_wins_reconciliation() {
        let backend = backend();
        *backend.clamp_format.lock() = Some(DocFormat::Html);
        let session = session(&backend);
        session.initialize("p1", Credentials::default()).await;

        let update = ProjectSettings {
            format: Some(DocFormat::Pdf),
            ..Default::default()
        };
        assert!(session.save_project_settings(update).await);

        let pending = session.pending_local().unwrap();
        assert_eq!(pending.format, DocFormat::Pdf);
        assert_eq!(pending.project_settings.format, Some(DocFormat::Pdf));

        let confirmed = session.confirmed_remote().unwrap();
        assert_eq!(confirmed.format, DocFormat::Html);
        assert_eq!(session.doc_format(), DocFormat::Html);
        assert_eq!(session.working_document().project_settings, confirmed.project_settings);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_optimistic_state() {
        let backend = backend();
        let session = session(&backend);
        session.initialize("p1", Credentials::default()).await;
        *backend.update_failure.lock() = Some(Failure::status(422, "invalid document"));

        session.set_path_included("lib", false);
        assert!(!session.save_file_preferences().await);

        assert!(session.error().unwrap().contains("invalid document"));
        assert!(!session.is_step_completed(WizardStep::FilePreferences));
        assert!(!session.is_path_included("lib/b.py"));
        assert!(session.pending_local().is_some());
        assert!(session.confirmed_remote().is_none());
    }

    #[tokio::test]
    async fn test_payload_must_match_step() {
        let backend = backend();
        let session = session(&backend);
        session.initialize("p1", Credentials::default()).await;
        let ok = session
            .complete_step(
                WizardStep::SymbolPreferences,
                StepPayload::Directory(DirectoryExclusion::default().into()),
            )
            .await;
        assert!(!ok);
        assert_eq!(backend.count_calls("update_preference_document"), 0);
    }

    #[tokio::test]
    async fn test_concurrent_save_rejected_and_stale_result_discarded() {
        let backend = backend();
        *backend.document.lock() = Some(PreferenceDocument::default());
        let gate = Arc::new(Gate::default());
        let session = Arc::new(session(&backend));
        session.initialize("p1", Credentials::default()).await;
        *backend.update_gate.lock() = Some(gate.clone());

        session.set_path_included("lib", false);
        let saving = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.save_file_preferences().await })
        };
        gate.entered.notified().await;

        assert!(session.is_saving());
        assert!(!session.save_symbol_preferences().await);
        assert!(session.error().unwrap().contains("保存"));

        session.close();
        gate.release.notify_one();
        assert!(!saving.await.unwrap());

        assert_eq!(session.phase(), SessionPhase::Uninitialized);
        assert!(session.error().is_none());
        assert!(!session.is_step_completed(WizardStep::FilePreferences));
        assert!(!session.is_saving());
    }

    #[tokio::test]
    async fn test_stale_result_not_applied_after_reopen() {
        let backend = backend();
        *backend.document.lock() = Some(PreferenceDocument::default());
        *backend.update_failure.lock() = Some(Failure::status(500, "write failed"));
        let gate = Arc::new(Gate::default());
        let session = Arc::new(session(&backend));
        session.initialize("p1", Credentials::default()).await;
        *backend.update_gate.lock() = Some(gate.clone());

        let saving = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.save_file_preferences().await })
        };
        gate.entered.notified().await;

        session.close();
        *backend.update_gate.lock() = None;
        assert!(session.initialize("p1", Credentials::default()).await);
        gate.release.notify_one();
        assert!(!saving.await.unwrap());

        assert_eq!(session.phase(), SessionPhase::Ready);
        assert!(session.error().is_none());
        assert!(session.pending_local().is_none());
        assert!(!session.is_step_completed(WizardStep::FilePreferences));
    }

    #[tokio::test]
    async fn test_restored_step_is_always_accessible() {
        let backend = backend();
        *backend.document.lock() = Some(PreferenceDocument {
            current_step: 2,
            ..Default::default()
        });
        let session = session(&backend);
        assert!(session.initialize("p1", Credentials::default()).await);

        let current = session.current_step();
        assert!(session.is_step_accessible(current));
        assert_eq!(current, WizardStep::FilePreferences);
        assert_eq!(session.step_status(current), StepStatus::Active);
        assert_eq!(session.step_status(WizardStep::Finalize), StepStatus::Locked);
    }

    #[tokio::test]
    async fn test_partial_directory_payload_keeps_other_set() {
        let backend = backend();
        let session = session(&backend);
        session.initialize("p1", Credentials::default()).await;
        session.set_path_included("lib", false);

        let update = DirectoryExclusionUpdate {
            exclude_files: Some(["a.py".to_string()].into_iter().collect()),
            exclude_dirs: None,
        };
        assert!(
            session
                .complete_step(WizardStep::FilePreferences, StepPayload::Directory(update))
                .await
        );

        let stored = backend.document.lock().clone().unwrap();
        assert!(stored.directory_exclusion.exclude_dirs.contains("lib"));
        assert_eq!(
            stored.directory_exclusion.exclude_files.iter().collect::<Vec<_>>(),
            vec!["a.py"]
        );
        assert_eq!(session.included_files_count(), 0);
    }

    #[tokio::test]
    async fn test_symbol_step_sanitizes_and_persists() {
        let backend = backend();
        let session = session(&backend);
        session.initialize("p1", Credentials::default()).await;

        assert_eq!(session.toggle_class("a.py", "App"), Some(true));
        assert!(session.is_method_excluded("a.py", "run", Some("App")));
        session.toggle_function("lib/b.py", "util");
        session.toggle_function("lib/b.py", "util");
        assert!(session.save_symbol_preferences().await);

        let stored = backend.document.lock().clone().unwrap();
        assert_eq!(stored.per_file_exclusion.len(), 1);
        assert_eq!(stored.per_file_exclusion[0].filename, "a.py");
        assert_eq!(
            stored.per_file_exclusion[0].exclude_methods,
            vec!["run".to_string(), "stop".to_string()]
        );

        let counts = session.function_class_counts();
        assert_eq!(counts.classes.included, 0);
        assert_eq!(counts.methods.excluded, 2);
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let backend = backend();
        let session = session(&backend);
        session.initialize("p1", Credentials::default()).await;

        session.set_path_included("lib", false);
        assert_eq!(session.included_files_count(), 1);

        session.set_path_included("lib", true);
        session.set_path_included("lib/c.py", false);
        assert_eq!(session.included_files_count(), 2);
        assert!(!session.is_path_included("lib/c.py"));
        assert!(session.is_path_included("lib/b.py"));

        let with_content: Vec<String> = session
            .files_with_symbol_content()
            .iter()
            .filter_map(FileRecord::key)
            .collect();
        assert_eq!(with_content, vec!["a.py".to_string(), "lib/b.py".to_string()]);
    }

    #[tokio::test]
    async fn test_reset_all_restores_defaults() {
        let backend = backend();
        let session = session(&backend);
        session.initialize("p1", Credentials::default()).await;
        session.set_path_included("lib", false);
        assert!(session.save_file_preferences().await);
        session.toggle_function("a.py", "main");

        assert!(session.reset_all().await);
        assert_eq!(session.included_files_count(), 3);
        assert!(!session.is_function_excluded("a.py", "main"));
        assert!(!session.is_step_completed(WizardStep::FilePreferences));
        assert_eq!(backend.document.lock().clone().unwrap(), PreferenceDocument::default());
    }

    #[tokio::test]
    async fn test_snapshot() {
        let backend = backend();
        let session = session(&backend);
        session.initialize("p1", Credentials::default()).await;
        session.set_path_included("lib", false);
        session.toggle_method("a.py", "stop", Some("App"));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.tree.path, "");
        assert!(snapshot.tree.children[0].included);
        assert!(!snapshot.tree.children[1].included);
        assert!(!snapshot.tree.children[1].children[0].included);
        assert_eq!(snapshot.included_files_count, 1);
        assert_eq!(snapshot.steps[0].status, StepStatus::Active);
        assert_eq!(snapshot.steps[1].status, StepStatus::Locked);

        let a = &snapshot.files[0];
        assert!(a.classes[0].methods[1].excluded);
        assert!(!a.classes[0].methods[0].excluded);

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["phase"], "ready");
        assert_eq!(value["doc_format"], "HTML");
    }

    #[tokio::test]
    async fn test_default_exclusions_through_session() {
        let backend = Arc::new(MemoryBackend::new().with_tree(FileTreeNode::dir(
            "root",
            None,
            vec![
                FileTreeNode::file("setup.py", None, None),
                FileTreeNode::file("app.py", None, None),
            ],
        )));
        let session = session(&backend);
        session.initialize("p1", Credentials::default()).await;
        assert_eq!(session.apply_default_exclusions(), 1);
        assert_eq!(session.included_files(), vec!["app.py".to_string()]);
    }
}
