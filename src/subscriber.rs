//! 订阅者 ID 校验
//!
//! 订阅者 ID 会拼进 REST 路径和事件流 URL，因此在任何网络请求之前校验。

use crate::error::ClientError;
use regex::Regex;
use std::sync::OnceLock;

/// 前端遗留的无效占位值（大小写不敏感）
const INVALID_SENTINELS: &[&str] = &["undefined", "null", "nan", "0"];

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.@:-]+$").expect("subscriber id pattern"))
}

/// 校验订阅者 ID，返回去除首尾空白后的 ID
pub fn validate_subscriber_id(user_id: &str) -> Result<&str, ClientError> {
    let trimmed = user_id.trim();

    if trimmed.is_empty() {
        return Err(ClientError::Validation(user_id.to_string()));
    }

    if INVALID_SENTINELS
        .iter()
        .any(|s| trimmed.eq_ignore_ascii_case(s))
    {
        return Err(ClientError::Validation(user_id.to_string()));
    }

    if !id_pattern().is_match(trimmed) {
        return Err(ClientError::Validation(user_id.to_string()));
    }

    Ok(trimmed)
}
