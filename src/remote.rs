//! 远端通知存储客户端
//!
//! | 操作     | 请求                                       |
//! |----------|--------------------------------------------|
//! | 全部通知 | `GET {api}/notifications/user/{userId}`        |
//! | 未读通知 | `GET {api}/notifications/user/{userId}/unread` |
//! | 标记已读 | `PUT {api}/notifications/{id}/read`            |
//! | 删除     | `DELETE {api}/notifications/{id}`              |
//!
//! 列表响应可以是裸数组，也可以包在 `data`/`content`/`notifications` 字段里。

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// 远端通知存储
#[async_trait]
pub trait NotificationRemote: Send + Sync {
    /// 订阅者的全部通知（原始负载）
    async fn fetch_all(&self, user_id: &str) -> Result<Vec<Value>>;

    /// 订阅者的未读通知（原始负载）
    async fn fetch_unread(&self, user_id: &str) -> Result<Vec<Value>>;

    /// 标记已读，返回服务端更新后的通知（可能为空）
    async fn mark_read(&self, id: &str) -> Result<Option<Value>>;

    /// 删除通知
    async fn delete(&self, id: &str) -> Result<()>;
}

/// 基于 HTTP 的远端存储
#[derive(Debug, Clone)]
pub struct HttpNotificationRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNotificationRemote {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Cannot create HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_list(&self, url: String) -> Result<Vec<Value>> {
        debug!(url = %url, "Fetching notifications");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("reading response of GET {}", url))?;
        if !status.is_success() {
            return Err(anyhow!("GET {} returned {}: {}", url, status, body));
        }

        let value: Value = serde_json::from_str(&body)
            .with_context(|| format!("parsing response of GET {}", url))?;
        extract_list(value).ok_or_else(|| anyhow!("GET {} did not return a list", url))
    }
}

#[async_trait]
impl NotificationRemote for HttpNotificationRemote {
    async fn fetch_all(&self, user_id: &str) -> Result<Vec<Value>> {
        self.get_list(format!("{}/notifications/user/{}", self.base_url, user_id))
            .await
    }

    async fn fetch_unread(&self, user_id: &str) -> Result<Vec<Value>> {
        self.get_list(format!("{}/notifications/user/{}/unread", self.base_url, user_id))
            .await
    }

    async fn mark_read(&self, id: &str) -> Result<Option<Value>> {
        let url = format!("{}/notifications/{}/read", self.base_url, id);
        let response = self
            .client
            .put(&url)
            .send()
            .await
            .with_context(|| format!("PUT {}", url))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!("PUT {} returned {}: {}", url, status, body));
        }

        // 服务端可能不返回内容
        Ok(serde_json::from_str::<Value>(&body)
            .ok()
            .map(unwrap_data)
            .filter(|v| v.is_object()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let url = format!("{}/notifications/{}", self.base_url, id);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .with_context(|| format!("DELETE {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("DELETE {} returned {}: {}", url, status, body));
        }
        Ok(())
    }
}

/// 从响应中取出通知列表
fn extract_list(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => ["data", "content", "notifications"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                Some(inner @ Value::Object(_)) => extract_list(inner),
                _ => None,
            }),
        _ => None,
    }
}

/// `{ "data": {...} }` → `{...}`
fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 && map.get("data").map(|d| d.is_object()).unwrap_or(false) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
