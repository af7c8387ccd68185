//! 远端存储模块
//!
//! 偏好文档、文件树和文档生成服务都由远端存储提供。

mod backend;
mod client;
mod format;
mod types;

#[cfg(test)]
pub(crate) mod memory;

pub use backend::PreferenceBackend;
pub use client::RemoteClient;
pub use format::{fix_base_url, is_valid_project_id};
pub use types::{GenerationResponse, RemoteError, Revision};
