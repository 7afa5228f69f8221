//! 通知客户端 - 组合事件流、本地存储、远端存储和原生通知
//!
//! 数据流：
//! ```text
//! 事件流 → ConnectionStateMachine → StreamOutput → pump 任务
//!        → normalize → NotificationStore::insert（去重）→ 观察者 + 原生通知
//! ```
//!
//! 变更流：乐观更新本地存储 → 调用远端 → 失败时用撤销令牌回滚。
//!
//! 所有公开操作都先检查 `closed` 标志，关闭后的调用是空操作。

mod builder;
mod observer;

pub use builder::NotificationClientBuilder;
pub use observer::{ClientObserver, NoopObserver};

use crate::bridge::NativeBridge;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::notification::{
    is_control_kind, normalize, raw_kind, InsertOutcome, NotificationRecord, NotificationStore,
    StoreSnapshot, UndoToken,
};
use crate::remote::NotificationRemote;
use crate::stream::{ConnectOutcome, ConnectionState, ConnectionStateMachine, EventTransport, StreamOutput};
use crate::subscriber::validate_subscriber_id;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// `load` 结果
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// 已替换本地视图
    Loaded { total: usize, unread: usize },
    /// 加载期间订阅者已切换，结果被丢弃
    Stale,
    /// 远端调用失败，本地视图未变
    Failed(ClientError),
    ClientClosed,
}

/// `mark_read` / `delete` 结果
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// 本地和远端都已生效
    Applied,
    /// 本地没有这条通知
    NotFound,
    /// 远端失败，本地已回滚
    RolledBack(ClientError),
    ClientClosed,
}

/// `mark_all_read` 结果
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOutcome {
    Applied { count: usize },
    /// 没有未读通知
    NothingToDo,
    /// 部分远端调用失败，已从远端重新加载
    Reloaded { failed: usize, error: ClientError },
    ClientClosed,
}

struct View {
    user_id: Option<String>,
    store: NotificationStore,
}

impl View {
    fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot(self.user_id.as_deref())
    }
}

struct Inner {
    remote: Arc<dyn NotificationRemote>,
    observer: Arc<dyn ClientObserver>,
    bridge: Option<NativeBridge>,
    view: Mutex<View>,
    closed: AtomicBool,
}

/// 通知客户端
pub struct NotificationClient {
    config: ClientConfig,
    inner: Arc<Inner>,
    machine: ConnectionStateMachine,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationClient {
    pub fn builder(config: ClientConfig) -> NotificationClientBuilder {
        NotificationClientBuilder::new(config)
    }

    fn start(
        config: ClientConfig,
        remote: Arc<dyn NotificationRemote>,
        transport: Arc<dyn EventTransport>,
        observer: Arc<dyn ClientObserver>,
        bridge: Option<NativeBridge>,
    ) -> Self {
        let (machine, output) =
            ConnectionStateMachine::new(transport, config.reconnect, config.heartbeat_timeout());

        let inner = Arc::new(Inner {
            remote,
            observer,
            bridge,
            view: Mutex::new(View {
                user_id: None,
                store: NotificationStore::new(config.max_notifications),
            }),
            closed: AtomicBool::new(false),
        });
        let pump = tokio::spawn(pump(Arc::clone(&inner), output));

        Self {
            config,
            inner,
            machine,
            pump: Mutex::new(Some(pump)),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    /// 当前订阅者
    pub fn user_id(&self) -> Option<String> {
        self.inner.lock().user_id.clone()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.inner.lock().snapshot()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.lock().store.unread_count()
    }

    /// 从远端加载全部和未读通知，替换本地视图
    ///
    /// 订阅者变化时先清空本地视图；返回前订阅者又变了则丢弃结果。
    pub async fn load(&self, user_id: &str) -> Result<LoadOutcome, ClientError> {
        if self.is_closed() {
            return Ok(LoadOutcome::ClientClosed);
        }
        let user_id = validate_subscriber_id(user_id)?.to_string();
        self.inner.switch_user(&user_id);
        Ok(self.refresh(&user_id).await)
    }

    /// 为 `user_id` 拉取远端列表并替换本地视图，不切换订阅者
    ///
    /// 订阅者已经不是 `user_id` 时结果被丢弃（`Stale`）。
    async fn refresh(&self, user_id: &str) -> LoadOutcome {
        if !self.inner.is_current(user_id) {
            debug!(user_id = %user_id, "Subscriber changed, skipping load");
            return LoadOutcome::Stale;
        }

        let remote = &self.inner.remote;
        let (all, unread) = tokio::join!(remote.fetch_all(user_id), remote.fetch_unread(user_id));
        if self.is_closed() {
            return LoadOutcome::ClientClosed;
        }
        if !self.inner.is_current(user_id) {
            debug!(user_id = %user_id, "Subscriber changed during load, discarding result");
            return LoadOutcome::Stale;
        }

        let all = match all {
            Ok(all) => all,
            Err(e) => {
                let error = ClientError::remote("load", &e);
                warn!(user_id = %user_id, error = %error, "Failed to load notifications");
                self.inner.report(&error);
                return LoadOutcome::Failed(error);
            }
        };
        let unread = unread.unwrap_or_else(|e| {
            let error = ClientError::remote("load_unread", &e);
            warn!(user_id = %user_id, error = %error, "Unread list unavailable, using read flags from full list");
            self.inner.report(&error);
            Vec::new()
        });

        let records = merge_lists(&all, &unread);
        let outcome = self.inner.mutate(Some(user_id), |store| {
            store.replace_all(records);
            LoadOutcome::Loaded {
                total: store.len(),
                unread: store.unread_count(),
            }
        });

        match outcome {
            Some(outcome) => {
                info!(user_id = %user_id, outcome = ?outcome, "Notifications loaded");
                outcome
            }
            None if self.is_closed() => LoadOutcome::ClientClosed,
            None => {
                debug!(user_id = %user_id, "Subscriber changed during load, discarding result");
                LoadOutcome::Stale
            }
        }
    }

    /// 订阅事件流
    ///
    /// 连接在后台建立，状态通过 `ClientObserver::on_state_change` 报告。
    pub fn connect(&self, user_id: &str) -> Result<ConnectOutcome, ClientError> {
        if self.is_closed() {
            return Ok(ConnectOutcome::ClientClosed);
        }
        let user_id = validate_subscriber_id(user_id)?;
        self.inner.switch_user(user_id);
        self.machine.connect(user_id)
    }

    /// 断开事件流并取消待触发的重连
    pub fn disconnect(&self) {
        if self.is_closed() {
            return;
        }
        self.machine.disconnect();
    }

    /// 标记已读（乐观更新，远端失败时回滚）
    pub async fn mark_read(&self, id: &str) -> MutationOutcome {
        if self.is_closed() {
            return MutationOutcome::ClientClosed;
        }

        let user_id = self.user_id();
        let Some(mut token) = self
            .inner
            .mutate(user_id.as_deref(), |store| store.apply_optimistic_read(id))
            .filter(|token| !token.is_noop())
        else {
            return MutationOutcome::NotFound;
        };

        match self.inner.remote.mark_read(id).await {
            Ok(updated) => {
                // 服务端返回的记录为准，但保持已读
                if let Some(mut record) = updated.as_ref().map(normalize).filter(|r| r.id == id) {
                    record.is_read = true;
                    self.inner.mutate(user_id.as_deref(), |store| store.replace_record(record));
                }
                debug!(id = %id, "Notification marked read");
                MutationOutcome::Applied
            }
            Err(_) if self.is_closed() => MutationOutcome::ClientClosed,
            Err(e) => {
                let error = ClientError::remote("mark_read", &e);
                warn!(id = %id, error = %error, "Mark read failed, rolling back");
                self.inner.mutate(user_id.as_deref(), |store| store.rollback(&mut token));
                self.inner.report(&error);
                MutationOutcome::RolledBack(error)
            }
        }
    }

    /// 删除通知（乐观更新，远端失败时回滚）
    pub async fn delete(&self, id: &str) -> MutationOutcome {
        if self.is_closed() {
            return MutationOutcome::ClientClosed;
        }

        let user_id = self.user_id();
        let Some(mut token) = self
            .inner
            .mutate(user_id.as_deref(), |store| store.apply_optimistic_delete(id))
            .filter(|token| !token.is_noop())
        else {
            return MutationOutcome::NotFound;
        };

        match self.inner.remote.delete(id).await {
            Ok(()) => {
                if let Some(bridge) = &self.inner.bridge {
                    bridge.dismiss(id);
                }
                debug!(id = %id, "Notification deleted");
                MutationOutcome::Applied
            }
            Err(_) if self.is_closed() => MutationOutcome::ClientClosed,
            Err(e) => {
                let error = ClientError::remote("delete", &e);
                warn!(id = %id, error = %error, "Delete failed, rolling back");
                self.inner.mutate(user_id.as_deref(), |store| store.rollback(&mut token));
                self.inner.report(&error);
                MutationOutcome::RolledBack(error)
            }
        }
    }

    /// 全部标记已读
    ///
    /// 批量操作不做部分回滚：任一远端调用失败就从远端重新加载。
    pub async fn mark_all_read(&self) -> BulkOutcome {
        if self.is_closed() {
            return BulkOutcome::ClientClosed;
        }

        let user_id = self.user_id();
        let ids = self
            .inner
            .mutate(user_id.as_deref(), |store| store.mark_all_read())
            .unwrap_or_default();
        if ids.is_empty() {
            return BulkOutcome::NothingToDo;
        }

        let remote = &self.inner.remote;
        let results = join_all(ids.iter().map(|id| remote.mark_read(id))).await;
        let failures: Vec<anyhow::Error> = results.into_iter().filter_map(Result::err).collect();
        if failures.is_empty() {
            info!(count = ids.len(), "All notifications marked read");
            return BulkOutcome::Applied { count: ids.len() };
        }

        let error = ClientError::RemoteCall {
            operation: "mark_all_read",
            message: format!("{} of {} calls failed: {:#}", failures.len(), ids.len(), failures[0]),
        };
        warn!(failed = failures.len(), total = ids.len(), "Mark all read partially failed, reloading");
        self.inner.report(&error);

        // 只为发起批量操作的订阅者重新加载，期间切换了订阅者就不再触碰视图
        if let Some(user_id) = user_id {
            match self.refresh(&user_id).await {
                LoadOutcome::Loaded { .. } => {}
                other => debug!(outcome = ?other, "Reload after mark all read did not complete"),
            }
        }
        BulkOutcome::Reloaded {
            failed: failures.len(),
            error,
        }
    }

    /// 关闭客户端：断开连接，停止分发，之后所有操作都是空操作
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Closing notification client");
        self.machine.disconnect();
        let pump = self.pump.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(pump) = pump {
            pump.abort();
        }
    }
}

impl Drop for NotificationClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, View> {
        self.view.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 在订阅者仍为 `user_id` 时修改存储，并把新快照交给观察者
    ///
    /// 订阅者已变化或客户端已关闭时返回 `None`，存储不变。
    fn mutate<T>(&self, user_id: Option<&str>, f: impl FnOnce(&mut NotificationStore) -> T) -> Option<T>
    where
        T: StoreResult,
    {
        if self.is_closed() {
            return None;
        }
        let (result, snapshot) = {
            let mut view = self.lock();
            if user_id.is_none() || view.user_id.as_deref() != user_id {
                return None;
            }
            let result = f(&mut view.store);
            let snapshot = result.changed().then(|| view.snapshot());
            (result, snapshot)
        };
        if let Some(snapshot) = snapshot {
            self.observer.on_store_change(&snapshot);
        }
        Some(result)
    }

    fn is_current(&self, user_id: &str) -> bool {
        self.lock().user_id.as_deref() == Some(user_id)
    }

    fn report(&self, error: &ClientError) {
        if !self.is_closed() {
            self.observer.on_error(error);
        }
    }

    /// 切换订阅者时清空本地视图
    fn switch_user(&self, user_id: &str) {
        let snapshot = {
            let mut view = self.lock();
            if view.user_id.as_deref() == Some(user_id) {
                return;
            }
            info!(from = ?view.user_id, to = %user_id, "Subscriber changed, resetting store");
            let had_records = !view.store.is_empty();
            view.store.clear();
            view.user_id = Some(user_id.to_string());
            had_records.then(|| view.snapshot())
        };
        if let Some(snapshot) = snapshot {
            self.observer.on_store_change(&snapshot);
        }
    }

    fn handle_output(&self, output: StreamOutput) {
        match output {
            StreamOutput::State { state, .. } => self.observer.on_state_change(state),
            StreamOutput::Error { user_id, state, error } => {
                debug!(user_id = ?user_id, state = %state, error = %error, "Stream error reported");
                self.observer.on_error(&error);
            }
            StreamOutput::Notification { user_id, payload } => self.accept(&user_id, &payload),
        }
    }

    /// 事件流送来的通知：规范化、去重插入、通知观察者和原生桥接
    fn accept(&self, user_id: &str, payload: &Value) {
        if is_control_payload(payload) {
            return;
        }
        let record = normalize(payload);
        let inserted = self
            .mutate(Some(user_id), |store| store.insert(record.clone()))
            .map(|outcome| outcome.is_inserted())
            .unwrap_or(false);
        if !inserted {
            return;
        }

        info!(user_id = %user_id, id = %record.id, kind = %record.kind.as_str(), "Notification received");
        self.observer.on_notification(&record);
        if let Some(bridge) = &self.bridge {
            bridge.show(&record);
        }
    }
}

/// 存储操作是否改变了内容（决定是否发送快照）
trait StoreResult {
    fn changed(&self) -> bool;
}

impl StoreResult for bool {
    fn changed(&self) -> bool {
        *self
    }
}

impl StoreResult for InsertOutcome {
    fn changed(&self) -> bool {
        self.is_inserted()
    }
}

impl StoreResult for UndoToken {
    fn changed(&self) -> bool {
        !self.is_noop()
    }
}

impl StoreResult for LoadOutcome {
    fn changed(&self) -> bool {
        matches!(self, LoadOutcome::Loaded { .. })
    }
}

impl StoreResult for Vec<String> {
    fn changed(&self) -> bool {
        !self.is_empty()
    }
}

async fn pump(inner: Arc<Inner>, mut output: mpsc::UnboundedReceiver<StreamOutput>) {
    while let Some(item) = output.recv().await {
        if inner.is_closed() {
            break;
        }
        inner.handle_output(item);
    }
    debug!("Stream output pump stopped");
}

fn is_control_payload(payload: &Value) -> bool {
    raw_kind(payload).map(is_control_kind).unwrap_or(false)
}

/// 合并全部列表和未读列表：未读列表中的记录以未读为准，只在未读列表出现的也保留
fn merge_lists(all: &[Value], unread: &[Value]) -> Vec<NotificationRecord> {
    let unread: Vec<NotificationRecord> = unread
        .iter()
        .filter(|v| !is_control_payload(v))
        .map(normalize)
        .collect();
    let unread_ids: HashSet<String> = unread.iter().map(|r| r.id.clone()).collect();

    let mut records: Vec<NotificationRecord> = all
        .iter()
        .filter(|v| !is_control_payload(v))
        .map(normalize)
        .collect();
    let known: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();

    for record in records.iter_mut() {
        if unread_ids.contains(&record.id) {
            record.is_read = false;
        }
    }
    for mut record in unread {
        if !known.contains(&record.id) {
            record.is_read = false;
            records.push(record);
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_lists_unread_wins() {
        let all = vec![
            json!({"id": "n1", "kind": "ORDER_CREATED", "isRead": true}),
            json!({"id": "n2", "kind": "ORDER_CREATED", "isRead": true}),
        ];
        let unread = vec![json!({"id": "n2", "kind": "ORDER_CREATED"})];

        let records = merge_lists(&all, &unread);
        assert_eq!(records.len(), 2);
        assert!(records.iter().find(|r| r.id == "n1").unwrap().is_read);
        assert!(!records.iter().find(|r| r.id == "n2").unwrap().is_read);
    }

    #[test]
    fn test_merge_lists_keeps_unread_only_records() {
        let all = vec![json!({"id": "n1", "isRead": true})];
        let unread = vec![json!({"id": "n9", "kind": "SYSTEM_ALERT"})];

        let records = merge_lists(&all, &unread);
        assert_eq!(records.len(), 2);
        assert!(!records.iter().find(|r| r.id == "n9").unwrap().is_read);
    }

    #[test]
    fn test_merge_lists_drops_control_payloads() {
        let all = vec![
            json!({"id": "c1", "type": "CONNECTION_ESTABLISHED"}),
            json!({"id": "n1", "type": "ORDER_CREATED"}),
        ];
        let records = merge_lists(&all, &[]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "n1");
    }

    #[test]
    fn test_store_result_changed() {
        assert!(!false.changed());
        assert!(!InsertOutcome::Duplicate.changed());
        assert!(!Vec::<String>::new().changed());
        assert!(!UndoToken::Noop.changed());
    }
}
