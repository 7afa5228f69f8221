//! 原生通知桥接 - 尽力而为的旁路
//!
//! 桥接只负责把新通知交给宿主的通知设施，任何失败（无权限、平台不支持、命令出错）
//! 都在这里记录日志后吞掉，不会影响 store 或连接状态机。

pub mod desktop;

pub use desktop::DesktopNotifier;

use crate::notification::NotificationRecord;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 记住已展示 tag 的数量上限
const SHOWN_TAG_LIMIT: usize = 512;

/// 通知权限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    /// 尚未询问
    #[default]
    Unknown,
    Granted,
    Denied,
    /// 宿主没有可用的通知设施
    Unsupported,
}

/// 一条原生通知
#[derive(Debug, Clone, PartialEq)]
pub struct NativeAlert {
    /// 去重 tag（通知 ID）
    pub tag: String,
    pub title: String,
    pub body: String,
    /// 自动消失时间，`None` 表示常驻
    pub timeout: Option<Duration>,
}

impl NativeAlert {
    pub fn from_record(record: &NotificationRecord) -> Self {
        let timeout = match record.display_duration_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            tag: record.id.clone(),
            title: record.title.clone(),
            body: record.message.clone(),
            timeout,
        }
    }
}

/// 宿主通知设施
pub trait NativeNotifier: Send + Sync {
    /// 后端名称（用于日志）
    fn name(&self) -> &str;

    /// 当前权限，不触发询问
    fn permission(&self) -> PermissionState;

    /// 询问权限
    fn request_permission(&self) -> Result<PermissionState>;

    /// 展示通知；同一 tag 的通知应替换而不是叠加
    fn show(&self, alert: &NativeAlert) -> Result<()>;

    /// 撤下通知
    fn dismiss(&self, tag: &str) -> Result<()>;
}

#[derive(Default)]
struct BridgeState {
    permission: PermissionState,
    requested: bool,
    shown: HashSet<String>,
    shown_order: VecDeque<String>,
}

impl BridgeState {
    fn remember(&mut self, tag: &str) {
        if !self.shown.insert(tag.to_string()) {
            return;
        }
        self.shown_order.push_back(tag.to_string());
        while self.shown_order.len() > SHOWN_TAG_LIMIT {
            if let Some(old) = self.shown_order.pop_front() {
                self.shown.remove(&old);
            }
        }
    }
}

/// 原生通知桥接
pub struct NativeBridge {
    notifier: Arc<dyn NativeNotifier>,
    state: Mutex<BridgeState>,
}

impl NativeBridge {
    pub fn new(notifier: Arc<dyn NativeNotifier>) -> Self {
        Self {
            notifier,
            state: Mutex::new(BridgeState::default()),
        }
    }

    /// 当前平台的桌面通知
    pub fn desktop(app_name: &str) -> Self {
        Self::new(Arc::new(DesktopNotifier::detect(app_name)))
    }

    fn lock(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn permission(&self) -> PermissionState {
        self.lock().permission
    }

    /// 确认有权限；每个会话最多询问一次，被拒后不再询问
    fn ensure_permission(&self, state: &mut BridgeState) -> bool {
        if state.permission == PermissionState::Unknown {
            state.permission = self.notifier.permission();
        }

        match state.permission {
            PermissionState::Granted => true,
            PermissionState::Denied | PermissionState::Unsupported => false,
            PermissionState::Unknown if state.requested => false,
            PermissionState::Unknown => {
                state.requested = true;
                state.permission = match self.notifier.request_permission() {
                    Ok(permission) => permission,
                    Err(e) => {
                        warn!(backend = %self.notifier.name(), error = %e, "Notification permission request failed");
                        PermissionState::Denied
                    }
                };
                info!(backend = %self.notifier.name(), permission = ?state.permission, "Notification permission resolved");
                state.permission == PermissionState::Granted
            }
        }
    }

    /// 展示一条通知，返回是否真正交给了宿主
    ///
    /// 同一 ID 只展示一次；`display_duration_seconds` 非零时到时自动撤下。
    pub fn show(&self, record: &NotificationRecord) -> bool {
        let alert = NativeAlert::from_record(record);
        {
            let mut state = self.lock();
            if state.shown.contains(&alert.tag) {
                debug!(id = %alert.tag, "Native alert already shown");
                return false;
            }
            if !self.ensure_permission(&mut state) {
                debug!(id = %alert.tag, permission = ?state.permission, "Native alert skipped");
                return false;
            }
            state.remember(&alert.tag);
        }

        if let Err(e) = self.notifier.show(&alert) {
            warn!(backend = %self.notifier.name(), id = %alert.tag, error = %e, "Failed to show native alert");
            return false;
        }

        if let Some(timeout) = alert.timeout {
            self.schedule_dismiss(alert.tag, timeout);
        }
        true
    }

    /// 撤下通知（例如本地已删除）
    pub fn dismiss(&self, id: &str) {
        if !self.lock().shown.contains(id) {
            return;
        }
        if let Err(e) = self.notifier.dismiss(id) {
            warn!(backend = %self.notifier.name(), id = %id, error = %e, "Failed to dismiss native alert");
        }
    }

    fn schedule_dismiss(&self, tag: String, timeout: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(id = %tag, "No runtime for auto-dismiss");
            return;
        };
        let notifier = Arc::clone(&self.notifier);
        handle.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Err(e) = notifier.dismiss(&tag) {
                warn!(backend = %notifier.name(), id = %tag, error = %e, "Failed to auto-dismiss native alert");
            }
        });
    }
}
