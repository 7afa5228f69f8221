//! 事件流帧和 `text/event-stream` 解码

/// 未标注事件名时的默认名称
pub const DEFAULT_EVENT_NAME: &str = "message";

/// 事件流中的一个事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    /// 事件名（`notification`、`heartbeat` 等），未标注时为 `message`
    pub name: String,
    /// 负载（多行 data 以 `\n` 连接）
    pub data: String,
    /// 服务端事件 ID
    pub id: Option<String>,
}

impl StreamEvent {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            id: None,
        }
    }

    /// 未标注事件类型的通用消息
    pub fn message(data: impl Into<String>) -> Self {
        Self::new(DEFAULT_EVENT_NAME, data)
    }
}

/// 解码器输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Event(StreamEvent),
    /// `:` 开头的注释行，服务端常用作保活
    Comment,
}

/// 增量 `text/event-stream` 解码器
///
/// 字节块可以在任意位置切断（包括多字节字符内部），未完成的行以原始字节留在缓冲区，
/// 只有完整的行才做 UTF-8 解码。
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    name: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个字节块，返回已完成的帧
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<Frame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return Some(Frame::Comment);
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.name = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            // retry 等字段不影响客户端行为
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<Frame> {
        let name = self.name.take();
        let id = self.id.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(Frame::Event(StreamEvent {
            name: name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string()),
            data,
            id,
        }))
    }
}
