//! 事件流层 - 连接管理、事件分类和退避重连

pub mod classify;
pub mod event;
pub mod machine;
pub mod policy;
pub mod state;
pub mod transport;

pub use classify::{classify, Classified, ControlSignal};
pub use event::{Frame, SseDecoder, StreamEvent};
pub use machine::{ConnectOutcome, ConnectionStateMachine, StreamOutput};
pub use policy::ReconnectPolicy;
pub use state::ConnectionState;
pub use transport::{EventStream, EventTransport, HttpEventTransport, SseEventStream};
