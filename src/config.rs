//! 客户端配置
//!
//! 读取优先级：
//! 1. 显式路径 `ClientConfig::load_from(path)`
//! 2. 配置文件 `~/.config/notification-stream-client/config.json`
//! 3. 环境变量覆盖 `NSC_API_URL`、`NSC_STREAM_URL`、`NSC_MAX_NOTIFICATIONS`
//!
//! 缺失的字段使用默认值。

use crate::stream::ReconnectPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// 默认 REST API 地址
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";

/// 默认事件流地址（`/connect/{userId}` 会追加在后面）
pub const DEFAULT_STREAM_URL: &str = "http://localhost:8080/api/notifications/stream";

/// 本地最多保留的通知条数
pub const DEFAULT_MAX_NOTIFICATIONS: usize = 100;

/// 心跳超时（秒）：超过该时间没有收到任何事件视为连接失效
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 90;

/// REST 请求超时（毫秒）
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// 客户端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// REST API 基础 URL
    pub api_base_url: String,
    /// 事件流基础 URL
    pub stream_base_url: String,
    /// 本地存储上限，超出后淘汰最旧的记录
    pub max_notifications: usize,
    /// 重连退避策略
    pub reconnect: ReconnectPolicy,
    /// 心跳超时（秒）
    pub heartbeat_timeout_secs: u64,
    /// REST 请求超时（毫秒）
    pub request_timeout_ms: u64,
    /// 是否启用系统原生通知
    pub native_notifications: bool,
    /// 原生通知显示的应用名
    pub app_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            stream_base_url: DEFAULT_STREAM_URL.to_string(),
            max_notifications: DEFAULT_MAX_NOTIFICATIONS,
            reconnect: ReconnectPolicy::default(),
            heartbeat_timeout_secs: DEFAULT_HEARTBEAT_TIMEOUT_SECS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            native_notifications: true,
            app_name: "Notifications".to_string(),
        }
    }
}

impl ClientConfig {
    /// 默认配置文件路径
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| {
            home.join(".config")
                .join("notification-stream-client")
                .join("config.json")
        })
    }

    /// 从默认位置和环境变量自动加载
    ///
    /// 配置文件不存在时使用默认值；文件存在但格式错误时返回错误。
    pub fn auto_load() -> Result<Self> {
        let mut config = match Self::path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env();
        Ok(config)
    }

    /// 从指定 JSON 文件加载
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        debug!(path = %path.display(), "Loaded client config");
        Ok(config.normalized())
    }

    /// 应用环境变量覆盖
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("NSC_API_URL") {
            if !url.is_empty() {
                self.api_base_url = url;
            }
        }
        if let Ok(url) = std::env::var("NSC_STREAM_URL") {
            if !url.is_empty() {
                self.stream_base_url = url;
            }
        }
        if let Ok(max) = std::env::var("NSC_MAX_NOTIFICATIONS") {
            match max.parse::<usize>() {
                Ok(n) if n > 0 => self.max_notifications = n,
                _ => warn!(value = %max, "Ignoring invalid NSC_MAX_NOTIFICATIONS"),
            }
        }
        *self = std::mem::take(self).normalized();
    }

    /// 规范化：去掉 URL 末尾斜杠，修正为 0 的上限
    fn normalized(mut self) -> Self {
        self.api_base_url = self.api_base_url.trim_end_matches('/').to_string();
        self.stream_base_url = self.stream_base_url.trim_end_matches('/').to_string();
        if self.max_notifications == 0 {
            self.max_notifications = DEFAULT_MAX_NOTIFICATIONS;
        }
        self
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
