//! URL 构建工具

/// 修复 base_url
///
/// - 移除末尾斜杠
/// - 修复双斜杠（保留协议部分）
pub fn fix_base_url(base_url: &str) -> String {
    let mut url = base_url.trim().trim_end_matches('/').to_string();

    // 修复双斜杠（跳过协议部分）
    if let Some(pos) = url.find("://") {
        let (protocol, rest) = url.split_at(pos + 3);
        let fixed_rest = rest.replace("//", "/");
        url = format!("{}{}", protocol, fixed_rest);
    }

    url
}

/// 项目 ID 只允许字母、数字、`-` 和 `_`，避免拼接路径时越界
pub fn is_valid_project_id(project_id: &str) -> bool {
    !project_id.is_empty()
        && project_id.len() <= 128
        && project_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// 远端存储端点
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Self {
        Self {
            base: fix_base_url(base_url),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn project(&self, project_id: &str) -> String {
        format!("{}/projects/{}", self.base, project_id)
    }

    pub fn file_tree(&self, project_id: &str) -> String {
        format!("{}/files/tree", self.project(project_id))
    }

    pub fn all_files(&self, project_id: &str) -> String {
        format!("{}/files/all", self.project(project_id))
    }

    /// 偏好文档（末尾斜杠与存储的路由保持一致）
    pub fn preferences(&self, project_id: &str) -> String {
        format!("{}/preferences/", self.project(project_id))
    }

    pub fn plan(&self, project_id: &str) -> String {
        format!("{}/documentation/projects/{}/plan", self.base, project_id)
    }

    pub fn generate(&self, project_id: &str) -> String {
        format!("{}/documentation/projects/{}/generate", self.base, project_id)
    }

    pub fn revisions(&self, project_id: &str) -> String {
        format!("{}/documentation/projects/{}/revisions", self.base, project_id)
    }
}
