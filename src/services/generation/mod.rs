//! 文档生成模块
//!
//! 驱动远端生成服务：冷启动重试、可取消退避、修订版本轮询。

pub mod driver;
pub mod retry;
pub mod types;

pub use driver::{GenerationDriver, RevisionPolling};
pub use retry::RetryPolicy;
pub use types::{
    GenerationError, GenerationEvent, GenerationParams, GenerationReport, ModelStatus,
};
