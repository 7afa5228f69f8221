//! 事件流传输层
//!
//! `EventTransport` 负责为某个订阅者打开一条事件流；`EventStream` 逐个产出事件。
//! 生产实现基于 reqwest 的 `text/event-stream` 长连接，测试中可替换为内存实现。

use super::event::{Frame, SseDecoder, StreamEvent};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info};

/// 已打开的事件流
#[async_trait]
pub trait EventStream: Send {
    /// 下一个事件；`Ok(None)` 表示对端正常关闭
    async fn next_event(&mut self) -> Result<Option<StreamEvent>>;
}

/// 事件流传输
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// 为订阅者打开事件流（返回即视为 open 信号）
    async fn open(&self, user_id: &str) -> Result<Box<dyn EventStream>>;
}

/// 基于 HTTP 的事件流传输
pub struct HttpEventTransport {
    client: reqwest::Client,
    stream_base_url: String,
}

impl HttpEventTransport {
    /// 创建传输，`connect_timeout` 只限制建立连接，不限制长连接时长
    pub fn new(stream_base_url: impl Into<String>, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| anyhow!("Cannot create HTTP client: {}", e))?;

        Ok(Self {
            client,
            stream_base_url: stream_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// 订阅者的事件流 URL
    pub fn stream_url(&self, user_id: &str) -> String {
        format!("{}/connect/{}", self.stream_base_url, user_id)
    }
}

#[async_trait]
impl EventTransport for HttpEventTransport {
    async fn open(&self, user_id: &str) -> Result<Box<dyn EventStream>> {
        let url = self.stream_url(user_id);
        debug!(url = %url, "Opening event stream");

        let response = self
            .client
            .get(&url)
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("event stream {} returned {}", url, status));
        }

        info!(user_id = %user_id, "Event stream opened");
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(anyhow::Error::from))
            .boxed();

        Ok(Box::new(SseEventStream::new(bytes)))
    }
}

/// 把字节流解码为事件
pub struct SseEventStream {
    bytes: BoxStream<'static, Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<StreamEvent>,
}

impl SseEventStream {
    pub fn new(bytes: BoxStream<'static, Result<Vec<u8>>>) -> Self {
        Self {
            bytes,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
        }
    }
}

#[async_trait]
impl EventStream for SseEventStream {
    async fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            let Some(chunk) = self.bytes.next().await else {
                return Ok(None);
            };
            let chunk = chunk.context("reading event stream")?;

            for frame in self.decoder.push(&chunk) {
                match frame {
                    Frame::Event(event) => self.pending.push_back(event),
                    // 注释行也算活跃信号
                    Frame::Comment => self.pending.push_back(StreamEvent::new("heartbeat", "")),
                }
            }
        }
    }
}
