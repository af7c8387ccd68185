//! 基于 reqwest 的远端存储客户端

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

use super::backend::PreferenceBackend;
use super::format::Endpoints;
use super::types::{ErrorBody, GenerationResponse, RemoteError, Revision, RevisionList};
use crate::services::generation::GenerationParams;
use crate::services::preferences::{
    Credentials, DocumentationPlan, FileRecord, FileTreeNode, PreferenceDocument,
};

/// 远端存储客户端
pub struct RemoteClient {
    client: Client,
    endpoints: Endpoints,
    request_timeout: Duration,
    /// 生成请求的超时，`None` 表示不限制
    generation_timeout: Option<Duration>,
}

#[derive(Serialize)]
struct StatusUpdate<'a> {
    status: &'a str,
}

impl RemoteClient {
    /// 创建客户端
    pub fn new(
        base_url: &str,
        request_timeout_secs: u64,
        generation_timeout_secs: u64,
    ) -> Result<Self, RemoteError> {
        if base_url.trim().is_empty() {
            return Err(RemoteError::Config("remote base URL is required".to_string()));
        }

        // 不设置客户端级超时，生成请求可能持续很久
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            client,
            endpoints: Endpoints::new(base_url),
            request_timeout: Duration::from_secs(request_timeout_secs.max(1)),
            generation_timeout: (generation_timeout_secs > 0)
                .then(|| Duration::from_secs(generation_timeout_secs)),
        })
    }

    pub fn base_url(&self) -> &str {
        self.endpoints.base()
    }

    fn authorized(&self, request: RequestBuilder, credentials: &Credentials) -> RequestBuilder {
        let request = request.header("Accept", "application/json");
        if credentials.is_empty() {
            request
        } else {
            request.bearer_auth(credentials.token())
        }
    }

    /// 发送请求并检查状态码
    async fn send(
        &self,
        request: RequestBuilder,
        credentials: &Credentials,
    ) -> Result<Response, RemoteError> {
        let response = self.authorized(request, credentials).send().await?;
        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        credentials: &Credentials,
    ) -> Result<T, RemoteError> {
        debug!("Remote GET {}", url);
        let request = self.client.get(url).timeout(self.request_timeout);
        let response = self.send(request, credentials).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// 非 2xx 响应转换为 [`RemoteError`]
async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(RemoteError::NotFound);
    }

    let model_status = response
        .headers()
        .get("x-model-status")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_lowercase());
    let status_code = status.as_u16();
    let text = response.text().await.unwrap_or_default();
    error!(
        "Remote API error: status={}, body={}",
        status_code,
        text.chars().take(500).collect::<String>()
    );

    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_default()
        });

    Err(RemoteError::Api {
        status: status_code,
        message,
        model_status,
    })
}

#[async_trait]
impl PreferenceBackend for RemoteClient {
    async fn fetch_file_tree(
        &self,
        project_id: &str,
        credentials: &Credentials,
    ) -> Result<FileTreeNode, RemoteError> {
        let tree: FileTreeNode = self
            .get_json(&self.endpoints.file_tree(project_id), credentials)
            .await?;
        Ok(tree.anchored())
    }

    async fn fetch_all_files(
        &self,
        project_id: &str,
        credentials: &Credentials,
    ) -> Result<Vec<FileRecord>, RemoteError> {
        self.get_json(&self.endpoints.all_files(project_id), credentials)
            .await
    }

    async fn fetch_preference_document(
        &self,
        project_id: &str,
        credentials: &Credentials,
    ) -> Result<PreferenceDocument, RemoteError> {
        self.get_json(&self.endpoints.preferences(project_id), credentials)
            .await
    }

    async fn create_preference_document(
        &self,
        project_id: &str,
        credentials: &Credentials,
        document: &PreferenceDocument,
    ) -> Result<(), RemoteError> {
        let url = self.endpoints.preferences(project_id);
        debug!("Remote POST {}", url);
        let request = self.client.post(&url).timeout(self.request_timeout).json(document);
        self.send(request, credentials).await?;
        Ok(())
    }

    async fn update_preference_document(
        &self,
        project_id: &str,
        credentials: &Credentials,
        document: &PreferenceDocument,
    ) -> Result<(), RemoteError> {
        let url = self.endpoints.preferences(project_id);
        debug!("Remote PATCH {}", url);
        let request = self.client.patch(&url).timeout(self.request_timeout).json(document);
        self.send(request, credentials).await?;
        Ok(())
    }

    async fn fetch_documentation_plan(
        &self,
        project_id: &str,
        credentials: &Credentials,
    ) -> Result<DocumentationPlan, RemoteError> {
        let url = self.endpoints.plan(project_id);
        debug!("Remote GET {}", url);
        let request = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .header("Cache-Control", "no-cache");
        let response = self.send(request, credentials).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn generate_documentation(
        &self,
        project_id: &str,
        credentials: &Credentials,
        params: &GenerationParams,
    ) -> Result<GenerationResponse, RemoteError> {
        let url = self.endpoints.generate(project_id);
        debug!(
            "Remote POST {} (temperature={}, top_p={}, top_k={})",
            url, params.temperature, params.top_p, params.top_k
        );
        let mut request = self.client.post(&url).json(params);
        if let Some(timeout) = self.generation_timeout {
            request = request.timeout(timeout);
        }
        let response = self.send(request, credentials).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn update_project_status(
        &self,
        project_id: &str,
        credentials: &Credentials,
        status: &str,
    ) -> Result<(), RemoteError> {
        let url = self.endpoints.project(project_id);
        debug!("Remote PATCH {} status={}", url, status);
        let request = self
            .client
            .patch(&url)
            .timeout(self.request_timeout)
            .json(&StatusUpdate { status });
        self.send(request, credentials).await?;
        Ok(())
    }

    async fn list_revisions(
        &self,
        project_id: &str,
        credentials: &Credentials,
    ) -> Result<Vec<Revision>, RemoteError> {
        let list: RevisionList = self
            .get_json(&self.endpoints.revisions(project_id), credentials)
            .await?;
        Ok(list.revisions)
    }
}
