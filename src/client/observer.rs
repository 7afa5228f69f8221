//! 客户端观察者

use crate::error::ClientError;
use crate::notification::{NotificationRecord, StoreSnapshot};
use crate::stream::ConnectionState;

/// 客户端事件回调
///
/// 回调在客户端内部任务中同步调用，且不持有任何锁；实现应尽快返回。
pub trait ClientObserver: Send + Sync {
    /// 事件流送来一条新通知（已去重）
    fn on_notification(&self, _record: &NotificationRecord) {}

    /// 连接状态变化
    fn on_state_change(&self, _state: ConnectionState) {}

    /// 传输或远端调用错误（已在本地恢复）
    fn on_error(&self, _error: &ClientError) {}

    /// 本地视图发生变化
    fn on_store_change(&self, _snapshot: &StoreSnapshot) {}
}

/// 忽略所有事件
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ClientObserver for NoopObserver {}
