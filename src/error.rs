//! 客户端错误类型
//!
//! 只有 `Validation` 会作为 `Err` 直接返回给调用方；
//! 其余错误在本地恢复（回滚、退避重连），通过 `ClientObserver::on_error` 通知。

use thiserror::Error;

/// 客户端错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// 订阅者 ID 为空或是无效占位值，在任何网络请求之前拒绝
    #[error("invalid subscriber id: {0:?}")]
    Validation(String),

    /// 事件流打开失败、心跳超时或被对端关闭
    #[error("event stream transport error: {0}")]
    Transport(String),

    /// 远端通知存储调用失败
    #[error("remote call `{operation}` failed: {message}")]
    RemoteCall {
        operation: &'static str,
        message: String,
    },

    /// 自动重连次数耗尽，需要调用方显式重新 connect
    #[error("gave up reconnecting after {attempts} attempts, call connect to retry")]
    MaxAttemptsExceeded { attempts: u32 },
}

impl ClientError {
    /// 从 anyhow 错误构造远端调用错误（保留完整错误链）
    pub fn remote(operation: &'static str, err: &anyhow::Error) -> Self {
        Self::RemoteCall {
            operation,
            message: format!("{:#}", err),
        }
    }

    /// 从 anyhow 错误构造传输错误
    pub fn transport(err: &anyhow::Error) -> Self {
        Self::Transport(format!("{:#}", err))
    }

    /// 是否为终止性错误（需要调用方介入）
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::MaxAttemptsExceeded { .. })
    }
}
