//! 客户端构建器 - 默认使用 HTTP 远端和事件流，测试时可替换

use super::observer::{ClientObserver, NoopObserver};
use super::NotificationClient;
use crate::bridge::NativeBridge;
use crate::config::ClientConfig;
use crate::remote::{HttpNotificationRemote, NotificationRemote};
use crate::stream::{EventTransport, HttpEventTransport};
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

/// 客户端构建器
pub struct NotificationClientBuilder {
    config: ClientConfig,
    remote: Option<Arc<dyn NotificationRemote>>,
    transport: Option<Arc<dyn EventTransport>>,
    observer: Option<Arc<dyn ClientObserver>>,
    bridge: Option<NativeBridge>,
}

impl NotificationClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            remote: None,
            transport: None,
            observer: None,
            bridge: None,
        }
    }

    /// 替换远端存储
    pub fn remote(mut self, remote: Arc<dyn NotificationRemote>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// 替换事件流传输
    pub fn transport(mut self, transport: Arc<dyn EventTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ClientObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// 指定原生通知桥接（优先于 `native_notifications` 配置）
    pub fn bridge(mut self, bridge: NativeBridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// 构建客户端，需要在 Tokio 运行时内调用
    pub fn build(self) -> Result<NotificationClient> {
        let remote = match self.remote {
            Some(remote) => remote,
            None => Arc::new(HttpNotificationRemote::new(
                &self.config.api_base_url,
                self.config.request_timeout(),
            )?),
        };

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpEventTransport::new(
                &self.config.stream_base_url,
                self.config.request_timeout(),
            )?),
        };

        let bridge = match self.bridge {
            Some(bridge) => Some(bridge),
            None if self.config.native_notifications => Some(NativeBridge::desktop(&self.config.app_name)),
            None => None,
        };
        debug!(native = bridge.is_some(), "Building notification client");

        let observer = self.observer.unwrap_or_else(|| Arc::new(NoopObserver));
        Ok(NotificationClient::start(self.config, remote, transport, observer, bridge))
    }
}
