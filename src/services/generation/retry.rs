//! 重试策略与可取消等待

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 生成请求的重试策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数（含首次）
    pub max_attempts: u32,
    /// 第 n 次失败后的等待时间
    pub backoff: Vec<Duration>,
    /// 单次尝试超过该时长即提示冷启动
    pub warm_up_threshold: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: vec![Duration::from_secs(5), Duration::from_secs(10)],
            warm_up_threshold: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_secs: &[u64], warm_up_threshold_secs: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: backoff_secs.iter().map(|s| Duration::from_secs(*s)).collect(),
            warm_up_threshold: Duration::from_secs(warm_up_threshold_secs),
        }
    }

    /// 第 `attempt` 次（从 1 开始）失败后的等待时间
    ///
    /// 已是最后一次尝试时返回 `None`；退避列表不够长时沿用最后一项
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let index = (attempt - 1) as usize;
        Some(
            self.backoff
                .get(index)
                .or_else(|| self.backoff.last())
                .copied()
                .unwrap_or(Duration::ZERO),
        )
    }
}

/// 等待指定时长，期间被取消则提前返回 `false`
pub async fn cancellable_sleep(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
