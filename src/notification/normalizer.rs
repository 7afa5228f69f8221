//! 通知规范化 - 原始负载 → `NotificationRecord`
//!
//! `normalize` 是全函数：任何缺失或格式错误的字段都用默认值填充，从不报错。
//!
//! ## 默认规则
//! 1. `title` 缺失时按 kind 查表
//! 2. `category` 缺失时按 kind 子串分类
//! 3. `isRead` 优先，其次兼容旧字段 `read`，默认 false
//! 4. `dismissible` 只有显式为 false 时才为 false
//! 5. 显示时长默认 0（常驻）
//! 6. 缺少 `id` 时用负载内容哈希生成稳定 ID，保证重复投递仍能去重
//!
//! 连接控制类事件（`CONNECTION_*`）必须在进入这里之前被拦截，见 `is_control_kind`。

use super::kind::{Category, NotificationKind, Priority};
use super::record::{NotificationContext, NotificationRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::debug;

const ID_KEYS: &[&str] = &["id", "notificationId"];
const USER_KEYS: &[&str] = &["userId", "user_id", "recipientId"];
const KIND_KEYS: &[&str] = &["kind", "type", "notificationType"];
const TITLE_KEYS: &[&str] = &["title"];
const MESSAGE_KEYS: &[&str] = &["message", "content", "body"];
const CREATED_KEYS: &[&str] = &["createdAt", "created_at", "timestamp"];
const EXPIRES_KEYS: &[&str] = &["expiresAt", "expires_at"];
const DURATION_KEYS: &[&str] = &["displayDurationSeconds", "displayDuration", "duration"];

/// 记录自身消费的字段，不进入上下文的 `extra`
const RECORD_KEYS: &[&str] = &[
    "id", "notificationId", "userId", "user_id", "recipientId", "kind", "type",
    "notificationType", "title", "message", "content", "body", "priority", "category",
    "createdAt", "created_at", "timestamp", "expiresAt", "expires_at", "isRead", "read",
    "dismissible", "displayDurationSeconds", "displayDuration", "duration", "data", "metadata",
];

const CONTEXT_KEYS: &[&str] = &[
    "productId", "productName", "currentStock", "stock", "stockQuantity", "threshold",
    "minStock", "orderId", "orderStatus", "discountValue", "discountType",
];

/// 原始负载中的 kind 字符串（用于控制事件过滤）
///
/// 查找顺序与 `normalize` 相同：先顶层，再嵌套的 `data`/`metadata`。
pub fn raw_kind(raw: &Value) -> Option<&str> {
    let obj = raw.as_object()?;
    Fields::new(obj).get(KIND_KEYS).and_then(|v| v.as_str())
}

/// 规范化原始通知
pub fn normalize(raw: &Value) -> NotificationRecord {
    let empty = Map::new();
    let top = raw.as_object().unwrap_or(&empty);
    let fields = Fields::new(top);

    let kind_str = fields.string(KIND_KEYS).unwrap_or_default();
    let kind = NotificationKind::parse(&kind_str);

    let id = fields
        .string(ID_KEYS)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| synthetic_id(raw));

    let title = fields
        .string(TITLE_KEYS)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| kind.default_title().to_string());

    let category = fields
        .string(&["category"])
        .and_then(|c| Category::parse(&c))
        .unwrap_or_else(|| Category::classify(&kind_str));

    let priority = fields
        .string(&["priority"])
        .and_then(|p| Priority::parse(&p))
        .unwrap_or_default();

    // isRead 优先于旧字段 read
    let is_read = fields
        .boolean(&["isRead"])
        .or_else(|| fields.boolean(&["read"]))
        .unwrap_or(false);

    let dismissible = fields.boolean(&["dismissible"]) != Some(false);

    let display_duration_seconds = fields
        .integer(DURATION_KEYS)
        .map(|d| d.max(0) as u64)
        .unwrap_or(0);

    let created_at = fields
        .get(CREATED_KEYS)
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);

    let expires_at = fields.get(EXPIRES_KEYS).and_then(parse_timestamp);

    let record = NotificationRecord {
        id,
        user_id: fields.string(USER_KEYS).unwrap_or_default(),
        kind,
        title,
        message: fields.string(MESSAGE_KEYS).unwrap_or_default(),
        priority,
        category,
        created_at,
        expires_at,
        is_read,
        dismissible,
        display_duration_seconds,
        context: fields.context(),
    };

    debug!(id = %record.id, kind = %record.kind, raw_kind = %kind_str, "Normalized notification");
    record
}

/// 顶层字段 + 嵌套 `data`/`metadata` 字段的合并视图（顶层优先）
struct Fields<'a> {
    top: &'a Map<String, Value>,
    nested: Vec<&'a Map<String, Value>>,
}

impl<'a> Fields<'a> {
    fn new(top: &'a Map<String, Value>) -> Self {
        let nested = ["data", "metadata"]
            .iter()
            .filter_map(|k| top.get(*k).and_then(|v| v.as_object()))
            .collect();
        Self { top, nested }
    }

    fn get(&self, keys: &[&str]) -> Option<&'a Value> {
        std::iter::once(self.top)
            .chain(self.nested.iter().copied())
            .find_map(|map| {
                keys.iter()
                    .find_map(|k| map.get(*k).filter(|v| !v.is_null()))
            })
    }

    fn string(&self, keys: &[&str]) -> Option<String> {
        match self.get(keys)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn integer(&self, keys: &[&str]) -> Option<i64> {
        match self.get(keys)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
            _ => None,
        }
    }

    fn float(&self, keys: &[&str]) -> Option<f64> {
        match self.get(keys)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn boolean(&self, keys: &[&str]) -> Option<bool> {
        match self.get(keys)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_i64().map(|i| i != 0),
            _ => None,
        }
    }

    fn context(&self) -> NotificationContext {
        let mut extra = Map::new();
        for map in std::iter::once(self.top).chain(self.nested.iter().copied()) {
            for (key, value) in map {
                if RECORD_KEYS.contains(&key.as_str()) || CONTEXT_KEYS.contains(&key.as_str()) {
                    continue;
                }
                extra.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        NotificationContext {
            product_id: self.string(&["productId"]),
            product_name: self.string(&["productName"]),
            current_stock: self.integer(&["currentStock", "stock", "stockQuantity"]),
            threshold: self.integer(&["threshold", "minStock"]),
            order_id: self.string(&["orderId"]),
            order_status: self.string(&["orderStatus"]),
            discount_value: self.float(&["discountValue"]),
            discount_type: self.string(&["discountType"]),
            extra,
        }
    }
}

/// 解析时间戳，支持：
/// - RFC 3339（`2024-01-15T10:30:00Z`）
/// - 无时区 ISO 时间（按 UTC 处理）
/// - 纯日期
/// - 毫秒时间戳
/// - JVM 序列化器输出的数组 `[y, m, d, h, min, s, nanos]`
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(Utc.from_utc_datetime(&naive));
                }
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
            }
            s.parse::<i64>().ok().and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        }
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::Array(parts) => {
            let part = |i: usize| parts.get(i).and_then(|v| v.as_i64()).unwrap_or(0);
            if parts.len() < 3 {
                return None;
            }
            let date = NaiveDate::from_ymd_opt(part(0) as i32, part(1) as u32, part(2) as u32)?;
            let naive = date.and_hms_nano_opt(part(3) as u32, part(4) as u32, part(5) as u32, part(6) as u32)?;
            Some(Utc.from_utc_datetime(&naive))
        }
        _ => None,
    }
}

/// 基于负载内容的稳定 ID（serde_json 的对象键有序，序列化结果稳定）
fn synthetic_id(raw: &Value) -> String {
    let mut hasher = DefaultHasher::new();
    raw.to_string().hash(&mut hasher);
    format!("local-{:016x}", hasher.finish())
}
