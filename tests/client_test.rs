//! NotificationClient 集成测试
//!
//! 远端存储和事件流都用内存实现替换。

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use notification_stream_client::bridge::{NativeAlert, NativeBridge, NativeNotifier, PermissionState};
use notification_stream_client::notification::Category;
use notification_stream_client::stream::{EventStream, EventTransport, StreamEvent};
use notification_stream_client::{
    BulkOutcome, ClientConfig, ClientError, ClientObserver, ConnectOutcome, ConnectionState,
    LoadOutcome, MutationOutcome, NotificationClient, NotificationRecord, NotificationRemote,
    ReconnectPolicy, StoreSnapshot,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ==================== 测试替身 ====================

/// 内存远端：成功的 mark_read/delete 会修改自身数据
#[derive(Default)]
struct MockRemote {
    records: Mutex<Vec<Value>>,
    fail_fetch: AtomicBool,
    fail_unread_fetch: AtomicBool,
    fail_delete: AtomicBool,
    fail_mark_read: Mutex<HashSet<String>>,
    /// 该订阅者的 fetch 会延迟返回
    slow_user: Mutex<Option<(String, Duration)>>,
    fetches: AtomicUsize,
    mark_read_calls: Mutex<Vec<String>>,
    delete_calls: Mutex<Vec<String>>,
    /// mark_read 成功时额外覆盖的字段
    updated_title: Mutex<Option<String>>,
}

impl MockRemote {
    fn with_records(records: Vec<Value>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    fn fail_mark_read_for(&self, id: &str) {
        self.fail_mark_read.lock().unwrap().insert(id.to_string());
    }

    async fn maybe_delay(&self, user_id: &str) {
        let delay = self
            .slow_user
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(user, _)| user == user_id)
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl NotificationRemote for MockRemote {
    async fn fetch_all(&self, user_id: &str) -> Result<Vec<Value>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.maybe_delay(user_id).await;
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(anyhow!("503 Service Unavailable"));
        }
        Ok(self.records.lock().unwrap().clone())
    }

    async fn fetch_unread(&self, user_id: &str) -> Result<Vec<Value>> {
        self.maybe_delay(user_id).await;
        if self.fail_fetch.load(Ordering::SeqCst) || self.fail_unread_fetch.load(Ordering::SeqCst) {
            return Err(anyhow!("503 Service Unavailable"));
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !r["isRead"].as_bool().or(r["read"].as_bool()).unwrap_or(false))
            .cloned()
            .collect())
    }

    async fn mark_read(&self, id: &str) -> Result<Option<Value>> {
        self.mark_read_calls.lock().unwrap().push(id.to_string());
        tokio::task::yield_now().await;
        if self.fail_mark_read.lock().unwrap().contains(id) {
            return Err(anyhow!("500 Internal Server Error"));
        }

        let mut records = self.records.lock().unwrap();
        let Some(record) = records.iter_mut().find(|r| r["id"] == id) else {
            return Ok(None);
        };
        record["isRead"] = json!(true);
        if let Some(title) = self.updated_title.lock().unwrap().clone() {
            record["title"] = json!(title);
        }
        Ok(Some(record.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.delete_calls.lock().unwrap().push(id.to_string());
        tokio::task::yield_now().await;
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(anyhow!("500 Internal Server Error"));
        }
        self.records.lock().unwrap().retain(|r| r["id"] != id);
        Ok(())
    }
}

struct ChannelStream {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
}

#[async_trait]
impl EventStream for ChannelStream {
    async fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        Ok(self.rx.recv().await)
    }
}

#[derive(Default)]
struct MockTransport {
    opens: AtomicUsize,
    senders: Mutex<Vec<mpsc::UnboundedSender<StreamEvent>>>,
}

impl MockTransport {
    fn send(&self, event: StreamEvent) {
        let sender = self.senders.lock().unwrap().last().cloned().expect("no stream opened");
        sender.send(event).unwrap();
    }
}

#[async_trait]
impl EventTransport for MockTransport {
    async fn open(&self, _user_id: &str) -> Result<Box<dyn EventStream>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().push(tx);
        Ok(Box::new(ChannelStream { rx }))
    }
}

#[derive(Default)]
struct Recorder {
    notifications: Mutex<Vec<NotificationRecord>>,
    states: Mutex<Vec<ConnectionState>>,
    errors: Mutex<Vec<ClientError>>,
    snapshots: Mutex<Vec<StoreSnapshot>>,
}

impl ClientObserver for Recorder {
    fn on_notification(&self, record: &NotificationRecord) {
        self.notifications.lock().unwrap().push(record.clone());
    }

    fn on_state_change(&self, state: ConnectionState) {
        self.states.lock().unwrap().push(state);
    }

    fn on_error(&self, error: &ClientError) {
        self.errors.lock().unwrap().push(error.clone());
    }

    fn on_store_change(&self, snapshot: &StoreSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }
}

/// 总是失败的原生通知
#[derive(Default)]
struct BrokenNotifier {
    attempts: Mutex<Vec<String>>,
}

impl NativeNotifier for BrokenNotifier {
    fn name(&self) -> &str {
        "broken"
    }

    fn permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    fn request_permission(&self) -> Result<PermissionState> {
        Ok(PermissionState::Granted)
    }

    fn show(&self, alert: &NativeAlert) -> Result<()> {
        self.attempts.lock().unwrap().push(alert.tag.clone());
        Err(anyhow!("notification daemon not running"))
    }

    fn dismiss(&self, _tag: &str) -> Result<()> {
        Err(anyhow!("notification daemon not running"))
    }
}

struct Harness {
    client: NotificationClient,
    remote: Arc<MockRemote>,
    transport: Arc<MockTransport>,
    recorder: Arc<Recorder>,
}

fn config() -> ClientConfig {
    ClientConfig {
        max_notifications: 50,
        native_notifications: false,
        reconnect: ReconnectPolicy {
            base_delay_ms: 20,
            max_delay_ms: 200,
            max_attempts: 3,
        },
        ..ClientConfig::default()
    }
}

fn harness(records: Vec<Value>) -> Harness {
    harness_with_bridge(records, None)
}

fn harness_with_bridge(records: Vec<Value>, bridge: Option<NativeBridge>) -> Harness {
    let remote = Arc::new(MockRemote::with_records(records));
    let transport = Arc::new(MockTransport::default());
    let recorder = Arc::new(Recorder::default());

    let mut builder = NotificationClient::builder(config())
        .remote(remote.clone())
        .transport(transport.clone())
        .observer(recorder.clone());
    if let Some(bridge) = bridge {
        builder = builder.bridge(bridge);
    }

    Harness {
        client: builder.build().unwrap(),
        remote,
        transport,
        recorder,
    }
}

fn sample_records() -> Vec<Value> {
    vec![
        json!({"id": "n1", "type": "ORDER_CREATED", "message": "Order #1", "createdAt": "2024-03-01T10:00:00Z", "isRead": true}),
        json!({"id": "n3", "type": "INVENTORY_LOW_STOCK", "message": "Widget low", "createdAt": "2024-03-03T10:00:00Z", "isRead": false}),
        json!({"id": "n2", "type": "DISCOUNT_CREATED", "message": "10% off", "createdAt": "2024-03-02T10:00:00Z", "read": true}),
    ]
}

async fn wait_for(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

fn ids(snapshot: &StoreSnapshot) -> Vec<&str> {
    snapshot.records.iter().map(|r| r.id.as_str()).collect()
}

// ==================== load ====================

#[tokio::test]
async fn test_load_populates_store_newest_first() {
    let h = harness(sample_records());

    let outcome = h.client.load("u1").await.unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded { total: 3, unread: 1 });

    let snapshot = h.client.snapshot();
    assert_eq!(ids(&snapshot), vec!["n3", "n2", "n1"]);
    assert_eq!(snapshot.unread_count, 1);
    assert_eq!(snapshot.user_id.as_deref(), Some("u1"));
    assert_eq!(snapshot.records[0].title, "Low Stock Alert");
    assert_eq!(snapshot.records[0].category, Category::Inventory);
    assert_eq!(h.recorder.snapshots.lock().unwrap().last(), Some(&snapshot));
}

#[tokio::test]
async fn test_load_rejects_invalid_subscriber_before_network() {
    let h = harness(sample_records());

    let err = h.client.load("undefined").await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert_eq!(h.remote.fetches.load(Ordering::SeqCst), 0);
    assert!(h.recorder.errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_load_failure_is_reported_not_thrown() {
    let h = harness(sample_records());
    h.client.load("u1").await.unwrap();

    h.remote.fail_fetch.store(true, Ordering::SeqCst);
    let outcome = h.client.load("u1").await.unwrap();

    assert!(matches!(outcome, LoadOutcome::Failed(ClientError::RemoteCall { operation: "load", .. })));
    assert_eq!(h.client.snapshot().records.len(), 3);
    assert_eq!(h.recorder.errors.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_load_survives_missing_unread_list() {
    let h = harness(sample_records());
    h.remote.fail_unread_fetch.store(true, Ordering::SeqCst);

    let outcome = h.client.load("u1").await.unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded { total: 3, unread: 1 });

    // 退回使用全部列表的已读标记，但要让调用方知道
    let errors = h.recorder.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ClientError::RemoteCall { operation: "load_unread", .. }));
}

#[tokio::test]
async fn test_stale_load_is_discarded_after_subscriber_switch() {
    let h = harness(sample_records());
    *h.remote.slow_user.lock().unwrap() = Some(("u1".to_string(), Duration::from_millis(100)));

    let (outcome, connected) = tokio::join!(h.client.load("u1"), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.client.connect("u2")
    });

    assert_eq!(outcome.unwrap(), LoadOutcome::Stale);
    assert_eq!(connected.unwrap(), ConnectOutcome::Started);
    let snapshot = h.client.snapshot();
    assert_eq!(snapshot.user_id.as_deref(), Some("u2"));
    assert!(snapshot.records.is_empty());
    assert_eq!(snapshot.unread_count, 0);
}

// ==================== mark_read / delete ====================

#[tokio::test]
async fn test_mark_read_applies_and_merges_server_record() {
    let h = harness(sample_records());
    h.client.load("u1").await.unwrap();
    *h.remote.updated_title.lock().unwrap() = Some("Restock Widget".to_string());

    assert_eq!(h.client.mark_read("n3").await, MutationOutcome::Applied);

    let snapshot = h.client.snapshot();
    let n3 = snapshot.records.iter().find(|r| r.id == "n3").unwrap();
    assert!(n3.is_read);
    assert_eq!(n3.title, "Restock Widget");
    assert_eq!(snapshot.unread_count, 0);
    assert_eq!(*h.remote.mark_read_calls.lock().unwrap(), vec!["n3".to_string()]);
}

#[tokio::test]
async fn test_mark_read_rolls_back_on_remote_failure() {
    let h = harness(sample_records());
    h.client.load("u1").await.unwrap();
    h.remote.fail_mark_read_for("n3");
    let before = h.client.snapshot();

    let outcome = h.client.mark_read("n3").await;

    assert!(matches!(
        outcome,
        MutationOutcome::RolledBack(ClientError::RemoteCall { operation: "mark_read", .. })
    ));
    let after = h.client.snapshot();
    assert_eq!(after, before);
    assert!(!after.records.iter().find(|r| r.id == "n3").unwrap().is_read);
    assert_eq!(after.unread_count, 1);
    assert_eq!(h.recorder.errors.lock().unwrap().len(), 1);

    // 中间曾出现过乐观的已读状态
    let snapshots = h.recorder.snapshots.lock().unwrap();
    assert!(snapshots.iter().any(|s| s.unread_count == 0));
}

#[tokio::test]
async fn test_mark_read_unknown_id_is_not_found() {
    let h = harness(sample_records());
    h.client.load("u1").await.unwrap();

    assert_eq!(h.client.mark_read("missing").await, MutationOutcome::NotFound);
    assert!(h.remote.mark_read_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_removes_record() {
    let h = harness(sample_records());
    h.client.load("u1").await.unwrap();

    assert_eq!(h.client.delete("n3").await, MutationOutcome::Applied);
    let snapshot = h.client.snapshot();
    assert_eq!(ids(&snapshot), vec!["n2", "n1"]);
    assert_eq!(snapshot.unread_count, 0);
}

#[tokio::test]
async fn test_delete_rolls_back_to_original_position() {
    let h = harness(sample_records());
    h.client.load("u1").await.unwrap();
    h.remote.fail_delete.store(true, Ordering::SeqCst);
    let before = h.client.snapshot();

    let outcome = h.client.delete("n2").await;

    assert!(matches!(outcome, MutationOutcome::RolledBack(_)));
    assert_eq!(h.client.snapshot(), before);
    assert_eq!(ids(&before), vec!["n3", "n2", "n1"]);
}

// ==================== mark_all_read ====================

#[tokio::test]
async fn test_mark_all_read_marks_every_unread() {
    let mut records = sample_records();
    records.push(json!({"id": "n4", "type": "SYSTEM_ALERT", "createdAt": "2024-03-04T10:00:00Z"}));
    let h = harness(records);
    h.client.load("u1").await.unwrap();
    assert_eq!(h.client.unread_count(), 2);

    assert_eq!(h.client.mark_all_read().await, BulkOutcome::Applied { count: 2 });
    assert_eq!(h.client.unread_count(), 0);

    let mut calls = h.remote.mark_read_calls.lock().unwrap().clone();
    calls.sort();
    assert_eq!(calls, vec!["n3".to_string(), "n4".to_string()]);

    assert_eq!(h.client.mark_all_read().await, BulkOutcome::NothingToDo);
}

#[tokio::test]
async fn test_mark_all_read_partial_failure_reloads() {
    let mut records = sample_records();
    records.push(json!({"id": "n4", "type": "SYSTEM_ALERT", "createdAt": "2024-03-04T10:00:00Z"}));
    let h = harness(records);
    h.client.load("u1").await.unwrap();
    let fetches_before = h.remote.fetches.load(Ordering::SeqCst);
    h.remote.fail_mark_read_for("n4");

    let outcome = h.client.mark_all_read().await;

    match outcome {
        BulkOutcome::Reloaded { failed, error } => {
            assert_eq!(failed, 1);
            assert!(matches!(error, ClientError::RemoteCall { operation: "mark_all_read", .. }));
        }
        other => panic!("expected reload, got {:?}", other),
    }
    assert_eq!(h.remote.fetches.load(Ordering::SeqCst), fetches_before + 1);

    // 远端状态为准：n3 已读成功，n4 仍未读
    let snapshot = h.client.snapshot();
    assert!(snapshot.records.iter().find(|r| r.id == "n3").unwrap().is_read);
    assert!(!snapshot.records.iter().find(|r| r.id == "n4").unwrap().is_read);
    assert_eq!(snapshot.unread_count, 1);
}

// ==================== 订阅者切换 ====================

#[tokio::test]
async fn test_mark_all_read_reload_keeps_new_subscriber() {
    let h = harness(sample_records());
    h.client.load("u1").await.unwrap();
    let fetches_before = h.remote.fetches.load(Ordering::SeqCst);
    h.remote.fail_mark_read_for("n3");

    let (outcome, connected) = tokio::join!(h.client.mark_all_read(), async { h.client.connect("u2") });

    assert!(matches!(outcome, BulkOutcome::Reloaded { failed: 1, .. }));
    assert_eq!(connected.unwrap(), ConnectOutcome::Started);
    assert_eq!(h.remote.fetches.load(Ordering::SeqCst), fetches_before);

    let snapshot = h.client.snapshot();
    assert_eq!(snapshot.user_id.as_deref(), Some("u2"));
    assert!(snapshot.records.is_empty());
    assert_eq!(snapshot.unread_count, 0);

    // u2 的事件流仍然写入视图
    wait_for("open", || h.client.state() == ConnectionState::Open).await;
    h.transport.send(StreamEvent::new("notification", r#"{"id":"u2-1","type":"ORDER_CREATED"}"#));
    wait_for("u2 notification", || h.client.snapshot().records.len() == 1).await;
    assert_eq!(ids(&h.client.snapshot()), vec!["u2-1"]);
}

#[tokio::test]
async fn test_mark_read_rollback_skipped_after_subscriber_switch() {
    let h = harness(sample_records());
    h.client.load("u1").await.unwrap();
    h.remote.fail_mark_read_for("n3");

    let (outcome, connected) = tokio::join!(h.client.mark_read("n3"), async { h.client.connect("u2") });

    assert!(matches!(outcome, MutationOutcome::RolledBack(_)));
    assert_eq!(connected.unwrap(), ConnectOutcome::Started);
    let snapshot = h.client.snapshot();
    assert_eq!(snapshot.user_id.as_deref(), Some("u2"));
    assert!(snapshot.records.is_empty());
    assert_eq!(snapshot.unread_count, 0);
}

#[tokio::test]
async fn test_delete_rollback_skipped_after_subscriber_switch() {
    let h = harness(sample_records());
    h.client.load("u1").await.unwrap();
    h.remote.fail_delete.store(true, Ordering::SeqCst);

    let (outcome, connected) = tokio::join!(h.client.delete("n2"), async { h.client.connect("u2") });

    assert!(matches!(outcome, MutationOutcome::RolledBack(_)));
    assert_eq!(connected.unwrap(), ConnectOutcome::Started);
    let snapshot = h.client.snapshot();
    assert_eq!(snapshot.user_id.as_deref(), Some("u2"));
    assert!(!snapshot.records.iter().any(|r| r.id == "n2"));
    assert!(snapshot.records.is_empty());
}

// ==================== 事件流 ====================

#[tokio::test]
async fn test_stream_notification_is_normalized_and_deduplicated() {
    let h = harness(Vec::new());
    h.client.load("u1").await.unwrap();
    h.client.connect("u1").unwrap();
    wait_for("open", || h.client.state() == ConnectionState::Open).await;

    let payload = r#"{"id":"n1","kind":"INVENTORY_LOW_STOCK","message":"Widget has 2 left"}"#;
    h.transport.send(StreamEvent::new("notification", payload));
    h.transport.send(StreamEvent::new("notification", payload));
    h.transport.send(StreamEvent::message(r#"{"id":"n2","type":"ORDER_CREATED"}"#));
    wait_for("two notifications", || h.client.snapshot().records.len() == 2).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let notifications = h.recorder.notifications.lock().unwrap();
    assert_eq!(notifications.len(), 2);
    let n1 = &notifications[0];
    assert_eq!(n1.id, "n1");
    assert_eq!(n1.title, "Low Stock Alert");
    assert_eq!(n1.category, Category::Inventory);
    assert!(!n1.is_read);

    let snapshot = h.client.snapshot();
    assert_eq!(ids(&snapshot), vec!["n2", "n1"]);
    assert_eq!(snapshot.unread_count, 2);
}

#[tokio::test]
async fn test_control_events_never_reach_store() {
    let h = harness(Vec::new());
    h.client.connect("u1").unwrap();
    wait_for("open", || h.client.state() == ConnectionState::Open).await;

    h.transport.send(StreamEvent::new("connection", r#"{"type":"CONNECTION_ESTABLISHED"}"#));
    h.transport.send(StreamEvent::message(r#"{"id":"c1","type":"CONNECTION_ESTABLISHED"}"#));
    h.transport.send(StreamEvent::new("notification", r#"{"id":"c2","notificationType":"USER_CONNECTION_STATUS"}"#));
    h.transport.send(StreamEvent::message(r#"{"id":"c3","data":{"type":"CONNECTION_ESTABLISHED"}}"#));
    h.transport.send(StreamEvent::new("heartbeat", ""));
    h.transport.send(StreamEvent::new("notification", r#"{"id":"n1","type":"ORDER_CREATED"}"#));
    wait_for("n1", || h.client.snapshot().records.len() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(ids(&h.client.snapshot()), vec!["n1"]);
    assert_eq!(h.recorder.notifications.lock().unwrap().len(), 1);
    assert_eq!(h.client.state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_state_changes_are_reported() {
    let h = harness(Vec::new());
    h.client.connect("u1").unwrap();
    wait_for("open", || h.recorder.states.lock().unwrap().contains(&ConnectionState::Open)).await;

    h.client.disconnect();
    wait_for("disconnected", || {
        h.recorder.states.lock().unwrap().last() == Some(&ConnectionState::Disconnected)
    })
    .await;

    assert_eq!(
        *h.recorder.states.lock().unwrap(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Open,
            ConnectionState::Disconnected
        ]
    );
}

#[tokio::test]
async fn test_connect_for_new_subscriber_resets_store() {
    let h = harness(sample_records());
    h.client.load("u1").await.unwrap();
    assert_eq!(h.client.snapshot().records.len(), 3);

    h.client.connect("u2").unwrap();
    let snapshot = h.client.snapshot();
    assert_eq!(snapshot.user_id.as_deref(), Some("u2"));
    assert!(snapshot.records.is_empty());
    assert_eq!(snapshot.unread_count, 0);
}

#[tokio::test]
async fn test_bridge_failures_do_not_affect_store() {
    let notifier = Arc::new(BrokenNotifier::default());
    let h = harness_with_bridge(Vec::new(), Some(NativeBridge::new(notifier.clone())));
    h.client.connect("u1").unwrap();
    wait_for("open", || h.client.state() == ConnectionState::Open).await;

    h.transport.send(StreamEvent::new(
        "notification",
        r#"{"id":"n1","type":"ORDER_CREATED","displayDurationSeconds":1}"#,
    ));
    h.transport.send(StreamEvent::new("notification", r#"{"id":"n1","type":"ORDER_CREATED"}"#));
    wait_for("n1", || h.client.snapshot().records.len() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(*notifier.attempts.lock().unwrap(), vec!["n1".to_string()]);
    assert_eq!(h.client.unread_count(), 1);
    assert_eq!(h.client.state(), ConnectionState::Open);
    assert!(h.recorder.errors.lock().unwrap().is_empty());
}

// ==================== 关闭 ====================

#[tokio::test]
async fn test_operations_after_close_are_noops() {
    let h = harness(sample_records());
    h.client.load("u1").await.unwrap();
    h.client.connect("u1").unwrap();
    wait_for("open", || h.client.state() == ConnectionState::Open).await;
    let before = h.client.snapshot();
    let fetches = h.remote.fetches.load(Ordering::SeqCst);

    h.client.close();
    h.client.close();
    assert!(h.client.is_closed());
    assert_eq!(h.client.state(), ConnectionState::Disconnected);

    assert_eq!(h.client.load("u1").await.unwrap(), LoadOutcome::ClientClosed);
    assert_eq!(h.client.connect("u1").unwrap(), ConnectOutcome::ClientClosed);
    assert_eq!(h.client.mark_read("n3").await, MutationOutcome::ClientClosed);
    assert_eq!(h.client.delete("n3").await, MutationOutcome::ClientClosed);
    assert_eq!(h.client.mark_all_read().await, BulkOutcome::ClientClosed);
    h.client.disconnect();

    assert_eq!(h.client.snapshot(), before);
    assert_eq!(h.remote.fetches.load(Ordering::SeqCst), fetches);
    assert!(h.remote.mark_read_calls.lock().unwrap().is_empty());
    assert!(h.remote.delete_calls.lock().unwrap().is_empty());
    assert_eq!(h.transport.opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_close_during_mutation_skips_rollback() {
    let h = harness(sample_records());
    h.client.load("u1").await.unwrap();
    h.remote.fail_mark_read_for("n3");

    // mark_read 在远端调用处让出，此时关闭客户端
    let (outcome, _) = tokio::join!(h.client.mark_read("n3"), async {
        h.client.close();
    });

    assert_eq!(outcome, MutationOutcome::ClientClosed);
    assert!(h.recorder.errors.lock().unwrap().is_empty());
    assert!(h.client.snapshot().records.iter().find(|r| r.id == "n3").unwrap().is_read);
}
