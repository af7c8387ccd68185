//! 应用配置管理
//!
//! 提供配置的加载、保存、更新功能，使用全局单例模式管理配置状态。

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppError;
use crate::services::generation::{RetryPolicy, RevisionPolling};
use crate::services::preferences::inclusion::{DEFAULT_DIR_PRESETS, DEFAULT_FILE_PRESETS};
use crate::services::preferences::ExclusionPresets;

/// 覆盖配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "DOCGEN_PREFS_CONFIG";

/// 获取配置文件路径
fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    // 配置文件位于可执行文件同级目录
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.json")
}

/// 应用配置结构体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// 远端存储 API 基础 URL
    #[serde(default = "default_remote_base_url")]
    pub remote_base_url: String,

    /// 请求未携带 Authorization 时使用的令牌
    #[serde(default)]
    pub api_token: String,

    /// 普通请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// 生成请求超时（秒），0 表示不限
    #[serde(default)]
    pub generation_timeout_secs: u64,

    /// 监听地址
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// 生成请求最大尝试次数
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// 每次失败后的退避时间（秒）
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: Vec<u64>,

    /// 单次尝试超过该秒数即提示冷启动
    #[serde(default = "default_warm_up_threshold_secs")]
    pub warm_up_threshold_secs: u64,

    #[serde(default = "default_revision_poll_interval_secs")]
    pub revision_poll_interval_secs: u64,

    #[serde(default = "default_revision_poll_timeout_secs")]
    pub revision_poll_timeout_secs: u64,

    /// 默认排除的文件名模式
    #[serde(default = "default_exclude_file_presets")]
    pub exclude_file_presets: Vec<String>,

    /// 默认排除的目录名模式
    #[serde(default = "default_exclude_dir_presets")]
    pub exclude_dir_presets: Vec<String>,
}

fn default_remote_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_bind_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_secs() -> Vec<u64> {
    vec![5, 10]
}

fn default_warm_up_threshold_secs() -> u64 {
    5
}

fn default_revision_poll_interval_secs() -> u64 {
    2
}

fn default_revision_poll_timeout_secs() -> u64 {
    60
}

fn default_exclude_file_presets() -> Vec<String> {
    DEFAULT_FILE_PRESETS.iter().map(|s| s.to_string()).collect()
}

fn default_exclude_dir_presets() -> Vec<String> {
    DEFAULT_DIR_PRESETS.iter().map(|s| s.to_string()).collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            remote_base_url: default_remote_base_url(),
            api_token: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
            generation_timeout_secs: 0,
            bind_host: default_bind_host(),
            port: default_port(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_backoff_secs: default_retry_backoff_secs(),
            warm_up_threshold_secs: default_warm_up_threshold_secs(),
            revision_poll_interval_secs: default_revision_poll_interval_secs(),
            revision_poll_timeout_secs: default_revision_poll_timeout_secs(),
            exclude_file_presets: default_exclude_file_presets(),
            exclude_dir_presets: default_exclude_dir_presets(),
        }
    }
}

impl AppConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            &self.retry_backoff_secs,
            self.warm_up_threshold_secs,
        )
    }

    pub fn revision_polling(&self) -> RevisionPolling {
        RevisionPolling {
            interval: Duration::from_secs(self.revision_poll_interval_secs.max(1)),
            timeout: Duration::from_secs(self.revision_poll_timeout_secs),
        }
    }

    pub fn exclusion_presets(&self) -> ExclusionPresets {
        ExclusionPresets::new(&self.exclude_file_presets, &self.exclude_dir_presets)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

/// 全局配置单例
static CONFIG: Lazy<RwLock<AppConfig>> = Lazy::new(|| {
    RwLock::new(load_config_from_file().unwrap_or_default())
});

/// 从文件加载配置
fn load_config_from_file() -> Option<AppConfig> {
    load_config_from(&get_config_path())
}

fn load_config_from(path: &Path) -> Option<AppConfig> {
    if path.exists() {
        let content = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Ignoring invalid config file {}: {}", path.display(), e);
                None
            }
        }
    } else {
        None
    }
}

/// 保存配置到文件
fn save_config_to_file(config: &AppConfig) -> Result<(), AppError> {
    save_config_to(config, &get_config_path())
}

fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), AppError> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| AppError::Config(format!("序列化配置失败: {}", e)))?;
    fs::write(path, content)
        .map_err(|e| AppError::Config(format!("写入配置文件失败: {}", e)))?;
    Ok(())
}

/// 获取当前配置（克隆）
pub fn get_config() -> AppConfig {
    CONFIG.read().clone()
}

/// 更新配置
///
/// 接收一个闭包来修改配置，修改后自动保存到文件
pub fn update_config<F>(updater: F) -> Result<AppConfig, AppError>
where
    F: FnOnce(&mut AppConfig),
{
    let mut config = CONFIG.write();
    updater(&mut config);
    save_config_to_file(&config)?;
    Ok(config.clone())
}

/// 替换整个配置
pub fn set_config(new_config: AppConfig) -> Result<(), AppError> {
    save_config_to_file(&new_config)?;
    *CONFIG.write() = new_config;
    Ok(())
}

/// 重新从文件加载配置
pub fn reload_config() {
    if let Some(config) = load_config_from_file() {
        *CONFIG.write() = config;
    }
}
