//! 远端存储抽象

use async_trait::async_trait;

use super::types::{GenerationResponse, RemoteError, Revision};
use crate::services::generation::GenerationParams;
use crate::services::preferences::{
    Credentials, DocumentationPlan, FileRecord, FileTreeNode, PreferenceDocument,
};

/// 偏好会话与生成驱动依赖的远端操作
///
/// 生产环境由 [`super::RemoteClient`] 实现，测试使用内存实现
#[async_trait]
pub trait PreferenceBackend: Send + Sync {
    /// 获取项目文件树
    async fn fetch_file_tree(
        &self,
        project_id: &str,
        credentials: &Credentials,
    ) -> Result<FileTreeNode, RemoteError>;

    /// 获取所有文件的符号元数据
    async fn fetch_all_files(
        &self,
        project_id: &str,
        credentials: &Credentials,
    ) -> Result<Vec<FileRecord>, RemoteError>;

    /// 获取偏好文档，不存在时返回 [`RemoteError::NotFound`]
    async fn fetch_preference_document(
        &self,
        project_id: &str,
        credentials: &Credentials,
    ) -> Result<PreferenceDocument, RemoteError>;

    async fn create_preference_document(
        &self,
        project_id: &str,
        credentials: &Credentials,
        document: &PreferenceDocument,
    ) -> Result<(), RemoteError>;

    /// 更新偏好文档，不存在时返回 [`RemoteError::NotFound`]
    async fn update_preference_document(
        &self,
        project_id: &str,
        credentials: &Credentials,
        document: &PreferenceDocument,
    ) -> Result<(), RemoteError>;

    async fn fetch_documentation_plan(
        &self,
        project_id: &str,
        credentials: &Credentials,
    ) -> Result<DocumentationPlan, RemoteError>;

    async fn generate_documentation(
        &self,
        project_id: &str,
        credentials: &Credentials,
        params: &GenerationParams,
    ) -> Result<GenerationResponse, RemoteError>;

    async fn update_project_status(
        &self,
        project_id: &str,
        credentials: &Credentials,
        status: &str,
    ) -> Result<(), RemoteError>;

    /// 修订版本列表，最新在前
    async fn list_revisions(
        &self,
        project_id: &str,
        credentials: &Credentials,
    ) -> Result<Vec<Revision>, RemoteError>;
}
