//! Notification Stream Client - 实时通知流客户端
//!
//! 维护到服务端的事件流连接，把异构的通知负载规范化为统一记录，
//! 在本地保存去重、有序、带未读计数的视图，并以乐观更新的方式把已读/删除同步回远端。

pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod notification;
pub mod remote;
pub mod stream;
pub mod subscriber;

pub use bridge::{DesktopNotifier, NativeAlert, NativeBridge, NativeNotifier, PermissionState};
pub use client::{
    BulkOutcome, ClientObserver, LoadOutcome, MutationOutcome, NoopObserver, NotificationClient,
    NotificationClientBuilder,
};
pub use config::ClientConfig;
pub use error::ClientError;
pub use notification::{
    normalize, Category, NotificationContext, NotificationKind, NotificationRecord, NotificationStore,
    Priority, StoreSnapshot, UndoToken,
};
pub use remote::{HttpNotificationRemote, NotificationRemote};
pub use stream::{
    ConnectOutcome, ConnectionState, ConnectionStateMachine, EventStream, EventTransport,
    HttpEventTransport, ReconnectPolicy, StreamEvent,
};
pub use subscriber::validate_subscriber_id;
