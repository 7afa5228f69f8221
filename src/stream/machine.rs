//! 连接状态机 - 每个客户端一条事件流，断线后指数退避重连
//!
//! # 设计
//! - 状态、重连计数、流任务句柄和重连定时器都放在同一把锁里，所有迁移串行
//! - `epoch` 在每次 connect/disconnect 时递增；旧任务在锁内比较 epoch，
//!   不匹配就不再产生任何输出
//! - 任意时刻最多一个流任务和一个重连定时器，开新流前先 abort 旧的
//! - 输出通过无界 mpsc 通道按投递顺序交给唯一的消费者

use super::classify::{classify, Classified, ControlSignal};
use super::policy::ReconnectPolicy;
use super::state::ConnectionState;
use super::transport::EventTransport;
use crate::error::ClientError;
use crate::subscriber::validate_subscriber_id;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 状态机输出
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutput {
    /// 状态迁移
    State {
        user_id: Option<String>,
        state: ConnectionState,
    },
    /// 通知负载（尚未规范化），带上发起连接时的订阅者 ID
    Notification { user_id: String, payload: Value },
    /// 错误，以及进入的状态
    Error {
        user_id: Option<String>,
        state: ConnectionState,
        error: ClientError,
    },
}

/// connect 结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// 开始建立新连接
    Started,
    /// 同一订阅者已在 Connecting/Open，忽略
    AlreadyActive,
    /// 客户端已关闭，忽略
    ClientClosed,
}

/// 流任务的结束原因
type SessionResult = Result<(), ClientError>;

struct Shared {
    state: ConnectionState,
    user_id: Option<String>,
    attempt: u32,
    epoch: u64,
    stream_task: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

struct Core {
    transport: Arc<dyn EventTransport>,
    policy: ReconnectPolicy,
    heartbeat_timeout: Duration,
    output: mpsc::UnboundedSender<StreamOutput>,
    shared: Mutex<Shared>,
}

/// 连接状态机
///
/// `connect` 会 spawn 任务，必须在 Tokio 运行时内调用。
pub struct ConnectionStateMachine {
    core: Arc<Core>,
}

impl ConnectionStateMachine {
    /// 创建状态机，返回输出接收端
    pub fn new(
        transport: Arc<dyn EventTransport>,
        policy: ReconnectPolicy,
        heartbeat_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<StreamOutput>) {
        let (output, rx) = mpsc::unbounded_channel();
        let core = Arc::new(Core {
            transport,
            policy,
            heartbeat_timeout,
            output,
            shared: Mutex::new(Shared {
                state: ConnectionState::Disconnected,
                user_id: None,
                attempt: 0,
                epoch: 0,
                stream_task: None,
                reconnect_timer: None,
            }),
        });
        (Self { core }, rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.core.lock().state
    }

    pub fn user_id(&self) -> Option<String> {
        self.core.lock().user_id.clone()
    }

    /// 当前重连计数（Open 后归零）
    pub fn attempt(&self) -> u32 {
        self.core.lock().attempt
    }

    /// 是否有待触发的重连定时器
    pub fn has_pending_reconnect(&self) -> bool {
        self.core
            .lock()
            .reconnect_timer
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// 为订阅者建立连接
    ///
    /// - 无效 ID 返回 `ClientError::Validation`，不发起任何网络请求
    /// - 同一订阅者已在 Connecting/Open 时是空操作
    /// - 其他订阅者的旧连接会先被关闭
    pub fn connect(&self, user_id: &str) -> Result<ConnectOutcome, ClientError> {
        let user_id = validate_subscriber_id(user_id)?;
        let mut shared = self.core.lock();

        if shared.user_id.as_deref() == Some(user_id) && shared.state.is_active() {
            debug!(user_id = %user_id, state = %shared.state, "Connection already active, ignoring connect");
            return Ok(ConnectOutcome::AlreadyActive);
        }

        self.core.teardown(&mut shared);
        if shared.state.is_active() {
            self.core.transition(&mut shared, ConnectionState::Disconnected);
        }

        shared.epoch += 1;
        shared.attempt = 0;
        shared.user_id = Some(user_id.to_string());
        info!(user_id = %user_id, "Connecting event stream");

        self.core.transition(&mut shared, ConnectionState::Connecting);
        self.core.spawn_stream(&mut shared);
        Ok(ConnectOutcome::Started)
    }

    /// 断开连接并取消待触发的重连；可重复调用
    pub fn disconnect(&self) {
        let mut shared = self.core.lock();
        shared.epoch += 1;
        self.core.teardown(&mut shared);
        shared.attempt = 0;
        if let Some(user_id) = shared.user_id.as_deref() {
            info!(user_id = %user_id, "Disconnecting event stream");
        }
        self.core.transition(&mut shared, ConnectionState::Disconnected);
        shared.user_id = None;
    }
}

impl Drop for ConnectionStateMachine {
    fn drop(&mut self) {
        let mut shared = self.core.lock();
        shared.epoch += 1;
        self.core.teardown(&mut shared);
    }
}

impl Core {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, output: StreamOutput) {
        // 接收端被丢弃说明客户端已关闭
        let _ = self.output.send(output);
    }

    fn transition(&self, shared: &mut Shared, next: ConnectionState) {
        if shared.state == next {
            return;
        }
        if !shared.state.can_transition_to(next) {
            warn!(from = %shared.state, to = %next, "Unexpected connection state transition");
        }
        debug!(from = %shared.state, to = %next, "Connection state changed");
        shared.state = next;
        self.emit(StreamOutput::State {
            user_id: shared.user_id.clone(),
            state: next,
        });
    }

    fn emit_error(&self, shared: &Shared, error: ClientError) {
        self.emit(StreamOutput::Error {
            user_id: shared.user_id.clone(),
            state: shared.state,
            error,
        });
    }

    /// 关闭旧流任务并取消重连定时器
    fn teardown(&self, shared: &mut Shared) {
        if let Some(task) = shared.stream_task.take() {
            task.abort();
        }
        if let Some(timer) = shared.reconnect_timer.take() {
            timer.abort();
        }
    }

    fn spawn_stream(self: &Arc<Self>, shared: &mut Shared) {
        if let Some(old) = shared.stream_task.take() {
            old.abort();
        }
        let core = Arc::clone(self);
        let epoch = shared.epoch;
        let user_id = shared.user_id.clone().unwrap_or_default();
        shared.stream_task = Some(tokio::spawn(async move {
            let result = core.run_session(epoch, &user_id).await;
            core.on_session_end(epoch, &user_id, result);
        }));
    }

    async fn run_session(&self, epoch: u64, user_id: &str) -> SessionResult {
        let mut stream = self
            .transport
            .open(user_id)
            .await
            .map_err(|e| ClientError::transport(&e))?;

        {
            let mut shared = self.lock();
            if shared.epoch != epoch {
                return Ok(());
            }
            shared.attempt = 0;
            self.transition(&mut shared, ConnectionState::Open);
        }

        loop {
            let event = match tokio::time::timeout(self.heartbeat_timeout, stream.next_event()).await {
                Err(_) => {
                    return Err(ClientError::Transport(format!(
                        "no heartbeat within {}s",
                        self.heartbeat_timeout.as_secs_f64()
                    )))
                }
                Ok(Err(e)) => return Err(ClientError::transport(&e)),
                Ok(Ok(None)) => return Err(ClientError::Transport("stream closed by server".to_string())),
                Ok(Ok(Some(event))) => event,
            };

            match classify(&event) {
                Classified::Heartbeat => {}
                Classified::Control(ControlSignal::Established) => {
                    debug!(user_id = %user_id, "Server confirmed subscription");
                }
                Classified::Control(ControlSignal::Lost) => {
                    return Err(ClientError::Transport("server reported connection lost".to_string()));
                }
                Classified::Control(ControlSignal::Other(status)) => {
                    debug!(user_id = %user_id, status = %status, "Connection status event");
                }
                Classified::Notification(payload) => {
                    let shared = self.lock();
                    if shared.epoch != epoch {
                        return Ok(());
                    }
                    self.emit(StreamOutput::Notification {
                        user_id: user_id.to_string(),
                        payload,
                    });
                }
                Classified::Ignored(reason) => {
                    debug!(user_id = %user_id, reason = %reason, "Stream event ignored");
                }
            }
        }
    }

    fn on_session_end(self: &Arc<Self>, epoch: u64, user_id: &str, result: SessionResult) {
        let Err(error) = result else {
            return;
        };

        let mut shared = self.lock();
        if shared.epoch != epoch {
            return;
        }
        shared.stream_task = None;

        warn!(user_id = %user_id, error = %error, "Event stream closed unexpectedly");
        self.transition(&mut shared, ConnectionState::Closed);
        self.emit_error(&shared, error);
        self.schedule_reconnect(&mut shared);
    }

    fn schedule_reconnect(self: &Arc<Self>, shared: &mut Shared) {
        if !self.policy.allows(shared.attempt) {
            warn!(attempts = shared.attempt, "Max reconnection attempts reached, giving up");
            let error = ClientError::MaxAttemptsExceeded {
                attempts: shared.attempt,
            };
            self.emit_error(shared, error);
            return;
        }

        let delay = self.policy.delay_for(shared.attempt);
        shared.attempt += 1;
        info!(
            attempt = shared.attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );

        let core = Arc::clone(self);
        let epoch = shared.epoch;
        if let Some(old) = shared.reconnect_timer.take() {
            old.abort();
        }
        shared.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            core.reconnect(epoch);
        }));
    }

    fn reconnect(self: &Arc<Self>, epoch: u64) {
        let mut shared = self.lock();
        if shared.epoch != epoch || shared.state != ConnectionState::Closed {
            return;
        }
        // 定时器就是当前任务，不能 abort 自己
        shared.reconnect_timer = None;
        self.transition(&mut shared, ConnectionState::Connecting);
        self.spawn_stream(&mut shared);
    }
}
