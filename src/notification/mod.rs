//! 通知模型层 - 规范化、分类和去重存储
//!
//! # 数据流
//! 原始负载 → `normalize` → `NotificationRecord` → `NotificationStore::insert`
//!
//! # 使用示例
//! ```
//! use notification_stream_client::notification::{normalize, NotificationStore};
//! use serde_json::json;
//!
//! let mut store = NotificationStore::new(100);
//! let record = normalize(&json!({"id": "n1", "kind": "INVENTORY_LOW_STOCK"}));
//! assert_eq!(record.title, "Low Stock Alert");
//!
//! store.insert(record.clone());
//! store.insert(record); // 重复插入被忽略
//! assert_eq!(store.unread_count(), 1);
//! ```

pub mod kind;
pub mod normalizer;
pub mod record;
pub mod store;

pub use kind::{is_control_kind, Category, NotificationKind, Priority, CONNECTION_ESTABLISHED, CONNECTION_LOST};
pub use normalizer::{normalize, raw_kind};
pub use record::{NotificationContext, NotificationRecord};
pub use store::{InsertOutcome, NotificationStore, StoreSnapshot, UndoToken};
