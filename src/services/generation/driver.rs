//! 文档生成驱动
//!
//! 发起生成请求，5xx 视为模型冷启动并按退避策略重试，
//! 成功后尽力更新项目状态并轮询最新修订版本。
//! 每个驱动实例同一时间只跑一个生成任务，进度通过广播通道发布。

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::retry::{cancellable_sleep, RetryPolicy};
use super::types::{
    best_message, GenerationError, GenerationEvent, GenerationParams, GenerationReport,
    ModelStatus, WarmUpReason,
};
use crate::remote::{GenerationResponse, PreferenceBackend, RemoteError, Revision};
use crate::services::preferences::Credentials;

/// 修订版本轮询参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionPolling {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for RevisionPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(60),
        }
    }
}

/// 单次尝试的结果
enum AttemptOutcome {
    Finished(Result<GenerationResponse, RemoteError>),
    Cancelled,
}

/// 文档生成驱动
pub struct GenerationDriver {
    backend: Arc<dyn PreferenceBackend>,
    policy: RetryPolicy,
    polling: RevisionPolling,
    events: broadcast::Sender<GenerationEvent>,
    status: RwLock<ModelStatus>,
}

impl GenerationDriver {
    pub fn new(
        backend: Arc<dyn PreferenceBackend>,
        policy: RetryPolicy,
        polling: RevisionPolling,
    ) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            backend,
            policy,
            polling,
            events,
            status: RwLock::new(ModelStatus::Idle),
        }
    }

    /// 订阅进度事件
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.events.subscribe()
    }

    pub fn model_status(&self) -> ModelStatus {
        *self.status.read()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn emit(&self, event: GenerationEvent) {
        // 没有订阅者时发送失败是正常的
        let _ = self.events.send(event);
    }

    fn set_status(&self, status: ModelStatus) {
        let changed = {
            let mut current = self.status.write();
            let changed = *current != status;
            *current = status;
            changed
        };
        if changed {
            self.emit(GenerationEvent::StatusChanged { status });
        }
    }

    fn warm_up(&self, attempt: u32, reason: WarmUpReason) {
        info!("Model warming up (attempt {}, reason {:?})", attempt, reason);
        self.emit(GenerationEvent::WarmingUp { attempt, reason });
        self.set_status(ModelStatus::WarmingUp);
    }

    /// 执行一次完整的生成流程
    pub async fn generate(
        &self,
        project_id: &str,
        credentials: &Credentials,
        params: GenerationParams,
        cancel: &CancellationToken,
    ) -> Result<GenerationReport, GenerationError> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let clock = Instant::now();

        info!(
            "Starting documentation generation: project={}, run={}",
            project_id, run_id
        );
        self.emit(GenerationEvent::Started {
            run_id: run_id.clone(),
            project_id: project_id.to_string(),
        });
        self.set_status(ModelStatus::Processing);

        let mut warmed_up = false;
        let mut attempt = 0u32;

        let response = loop {
            attempt += 1;
            self.emit(GenerationEvent::AttemptStarted {
                attempt,
                max_attempts: self.policy.max_attempts,
            });

            let outcome = self
                .run_attempt(project_id, credentials, &params, cancel, attempt, &mut warmed_up)
                .await;

            let error = match outcome {
                AttemptOutcome::Cancelled => return Err(self.cancelled(project_id)),
                AttemptOutcome::Finished(Ok(response)) => break response,
                AttemptOutcome::Finished(Err(e)) => e,
            };

            let header_status = error.model_status().and_then(ModelStatus::from_header);
            if header_status == Some(ModelStatus::WarmingUp) {
                warmed_up = true;
                self.warm_up(attempt, WarmUpReason::ModelHeader);
            }

            let message = best_message(&error);

            if error.is_server_error() {
                warn!(
                    "Generation attempt {}/{} failed with server error: {}",
                    attempt, self.policy.max_attempts, error
                );
                // 任何 5xx 都视为冷启动，响应头只用于细化模型状态
                if header_status != Some(ModelStatus::WarmingUp) {
                    warmed_up = true;
                    self.warm_up(attempt, WarmUpReason::ServerError);
                }
                if let Some(status) = header_status {
                    self.set_status(status);
                }

                match self.policy.delay_after(attempt) {
                    Some(delay) => {
                        self.emit(GenerationEvent::Retrying {
                            attempt,
                            delay_secs: delay.as_secs(),
                            message,
                        });
                        if !cancellable_sleep(delay, cancel).await {
                            return Err(self.cancelled(project_id));
                        }
                        continue;
                    }
                    None => {
                        return Err(self.fail(
                            GenerationError::ServiceUnavailable { attempts: attempt, message },
                            attempt,
                            warmed_up,
                        ));
                    }
                }
            }

            let failure = match error.status() {
                Some(status) => {
                    self.set_status(header_status.unwrap_or(ModelStatus::Paused));
                    GenerationError::Rejected { status, message }
                }
                None => {
                    self.set_status(ModelStatus::Idle);
                    GenerationError::Network(message)
                }
            };
            return Err(self.fail(failure, attempt, warmed_up));
        };

        let generation_time_seconds = response
            .generation_time_seconds
            .unwrap_or_else(|| clock.elapsed().as_secs_f64());
        let result_count = response.results.len();
        info!(
            "Documentation generated: {} results in {:.2}s",
            result_count, generation_time_seconds
        );
        self.emit(GenerationEvent::Generated {
            result_count,
            generation_time_seconds,
        });

        if let Err(e) = self
            .backend
            .update_project_status(project_id, credentials, "completed")
            .await
        {
            warn!("Failed to update project status for {}: {}", project_id, e);
        }

        let revision = self.await_revision(project_id, credentials, cancel).await;
        if let Some(revision) = &revision {
            self.emit(GenerationEvent::RevisionReady {
                revision: revision.clone(),
            });
        }

        self.set_status(ModelStatus::Idle);

        let report = GenerationReport {
            run_id,
            project_id: project_id.to_string(),
            started_at,
            finished_at: Utc::now(),
            attempts: attempt,
            warmed_up,
            result_count,
            generation_time_seconds,
            revision,
        };
        self.emit(GenerationEvent::Completed {
            report: report.clone(),
        });
        Ok(report)
    }

    /// 发起一次生成请求，与取消信号和冷启动计时器竞争
    async fn run_attempt(
        &self,
        project_id: &str,
        credentials: &Credentials,
        params: &GenerationParams,
        cancel: &CancellationToken,
        attempt: u32,
        warmed_up: &mut bool,
    ) -> AttemptOutcome {
        let request = self
            .backend
            .generate_documentation(project_id, credentials, params);
        tokio::pin!(request);

        let hint = tokio::time::sleep(self.policy.warm_up_threshold);
        tokio::pin!(hint);
        let mut hinted = false;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return AttemptOutcome::Cancelled,
                result = &mut request => return AttemptOutcome::Finished(result),
                _ = &mut hint, if !hinted => {
                    hinted = true;
                    *warmed_up = true;
                    self.warm_up(attempt, WarmUpReason::SlowResponse);
                }
            }
        }
    }

    /// 轮询修订版本列表，直到最新修订带有 ID 或超时
    ///
    /// 首次立即查询，之后每隔 `interval` 查询一次，总时长不超过 `timeout`
    async fn await_revision(
        &self,
        project_id: &str,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Option<Revision> {
        let interval = self.polling.interval.max(Duration::from_millis(1));
        let polls = self.polling.timeout.as_millis() / interval.as_millis() + 1;

        for poll in 0..polls {
            if poll > 0 && !cancellable_sleep(interval, cancel).await {
                return None;
            }
            match self.backend.list_revisions(project_id, credentials).await {
                Ok(revisions) => {
                    let newest = revisions.into_iter().next();
                    if let Some(newest) = newest.filter(|r| r.revision_id.is_some()) {
                        return Some(newest);
                    }
                    debug!("No revision yet for project {}", project_id);
                }
                Err(e) => debug!("Failed to list revisions for {}: {}", project_id, e),
            }
        }

        warn!("Timed out waiting for a revision of project {}", project_id);
        None
    }

    fn cancelled(&self, project_id: &str) -> GenerationError {
        info!("Generation cancelled: project={}", project_id);
        self.set_status(ModelStatus::Paused);
        self.emit(GenerationEvent::Cancelled);
        GenerationError::Cancelled
    }

    fn fail(&self, error: GenerationError, attempts: u32, warmed_up: bool) -> GenerationError {
        warn!("Generation failed after {} attempt(s): {}", attempts, error);
        self.emit(GenerationEvent::Failed {
            message: error.user_message(),
            attempts,
            warmed_up,
        });
        error
    }
}
