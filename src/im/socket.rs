//! 实时消息 socket（Socket.IO over WebSocket）
//!
//! 只实现聊天需要的部分：websocket 传输、默认命名空间、文本事件。
//! 不做自动重连，断开后由调用方决定是否重新 `connect`。
//!
//! 帧结构分两层：
//! - Engine.IO：首字符为包类型（0 open, 1 close, 2 ping, 3 pong, 4 message, 5 upgrade, 6 noop）
//! - Socket.IO：位于 Engine.IO message 包内（0 connect, 1 disconnect, 2 event, 3 ack, 4 connect_error）

use crate::im::message::types::{decode_socket_payload, Message};
use anyhow::{Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

/// WebSocket 写入端类型别名
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// WebSocket 读取端类型别名
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// 服务器推送新消息时使用的事件名
pub const MESSAGE_EVENT: &str = "message";

/// Engine.IO 协议版本
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EngineVersion {
    /// 客户端按 pingInterval 主动发 ping
    V3,
    /// 服务器发 ping，客户端回 pong；需要显式发送命名空间 connect
    #[default]
    V4,
}

impl EngineVersion {
    pub fn from_number(version: u8) -> Result<Self> {
        match version {
            3 => Ok(Self::V3),
            4 => Ok(Self::V4),
            other => Err(anyhow::anyhow!("不支持的 Engine.IO 版本: {}", other)),
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Self::V3 => 3,
            Self::V4 => 4,
        }
    }
}

/// 构建 socket 连接 URL，token 作为查询参数传递
///
/// `http://host:8099` -> `ws://host:8099/socket.io/?EIO=4&transport=websocket&token=...`
pub fn build_socket_url(base: &str, token: &str, version: EngineVersion) -> Result<String> {
    let mut url = reqwest::Url::parse(base).with_context(|| format!("无效的 socket 地址: {base}"))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(anyhow::anyhow!("不支持的 socket 协议: {}", other)),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow::anyhow!("无法切换 socket 协议: {}", base))?;

    let path = format!("{}/socket.io/", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", &version.number().to_string())
        .append_pair("transport", "websocket")
        .append_pair("token", token);
    Ok(url.to_string())
}

/// Engine.IO open 包携带的握手参数
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPayload {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// 毫秒
    pub ping_interval: u64,
    /// 毫秒
    pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(OpenPayload),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn parse(frame: &str) -> Result<Self> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| anyhow::anyhow!("空的 Engine.IO 帧"))?;
        let body = chars.as_str();
        let packet = match kind {
            '0' => Self::Open(serde_json::from_str(body).context("解析 open 包失败")?),
            '1' => Self::Close,
            '2' => Self::Ping(body.to_string()),
            '3' => Self::Pong(body.to_string()),
            '4' => Self::Message(body.to_string()),
            '5' => Self::Upgrade,
            '6' => Self::Noop,
            other => return Err(anyhow::anyhow!("未知的 Engine.IO 包类型: {}", other)),
        };
        Ok(packet)
    }

    /// 编码为文本帧（open 包只由服务器发送，这里编码为空握手）
    pub fn encode(&self) -> String {
        match self {
            Self::Open(_) => "0".to_string(),
            Self::Close => "1".to_string(),
            Self::Ping(body) => format!("2{body}"),
            Self::Pong(body) => format!("3{body}"),
            Self::Message(body) => format!("4{body}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPacketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
}

impl SocketPacketKind {
    fn from_char(c: char) -> Result<Self> {
        match c {
            '0' => Ok(Self::Connect),
            '1' => Ok(Self::Disconnect),
            '2' => Ok(Self::Event),
            '3' => Ok(Self::Ack),
            '4' => Ok(Self::ConnectError),
            '5' | '6' => Err(anyhow::anyhow!("不支持二进制 Socket.IO 包")),
            other => Err(anyhow::anyhow!("未知的 Socket.IO 包类型: {}", other)),
        }
    }

    fn as_char(self) -> char {
        match self {
            Self::Connect => '0',
            Self::Disconnect => '1',
            Self::Event => '2',
            Self::Ack => '3',
            Self::ConnectError => '4',
        }
    }
}

/// Socket.IO 包：`<type>[<namespace>,][<ack id>][<json>]`
#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    pub kind: SocketPacketKind,
    pub namespace: String,
    pub id: Option<u64>,
    pub data: Option<Value>,
}

impl SocketPacket {
    pub fn new(kind: SocketPacketKind) -> Self {
        Self {
            kind,
            namespace: "/".to_string(),
            id: None,
            data: None,
        }
    }

    pub fn event(name: &str, args: Vec<Value>) -> Self {
        let mut data = vec![Value::String(name.to_string())];
        data.extend(args);
        Self {
            data: Some(Value::Array(data)),
            ..Self::new(SocketPacketKind::Event)
        }
    }

    pub fn parse(body: &str) -> Result<Self> {
        let mut chars = body.chars();
        let kind = SocketPacketKind::from_char(
            chars
                .next()
                .ok_or_else(|| anyhow::anyhow!("空的 Socket.IO 包"))?,
        )?;
        let mut rest = chars.as_str();

        let mut namespace = "/".to_string();
        if rest.starts_with('/') {
            match rest.find(',') {
                Some(pos) => {
                    namespace = rest[..pos].to_string();
                    rest = &rest[pos + 1..];
                }
                None => {
                    namespace = rest.to_string();
                    rest = "";
                }
            }
        }

        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let id = if digits > 0 {
            Some(rest[..digits].parse().context("解析 ack id 失败")?)
        } else {
            None
        };
        rest = &rest[digits..];

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest).context("解析 Socket.IO 数据失败")?)
        };

        Ok(Self {
            kind,
            namespace,
            id,
            data,
        })
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.as_char());
        if self.namespace != "/" {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(id) = self.id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }
        out
    }

    /// 事件包的事件名与参数
    pub fn event_parts(&self) -> Option<(&str, &[Value])> {
        if self.kind != SocketPacketKind::Event {
            return None;
        }
        let items = self.data.as_ref()?.as_array()?;
        let (name, args) = items.split_first()?;
        Some((name.as_str()?, args))
    }

    /// connect_error 包中的错误描述
    pub fn error_message(&self) -> String {
        match &self.data {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Object(obj)) => obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(obj.clone()).to_string()),
            Some(other) => other.to_string(),
            None => "未知错误".to_string(),
        }
    }
}

/// 从 socket 读循环发出的事件
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// 命名空间连接成功
    Connected,
    /// 收到一条聊天消息
    Message(Message),
    /// 连接断开（原因）
    Disconnected(String),
    /// 其它事件，原样转发
    Other { name: String, payload: Vec<Value> },
}

/// 一条活动的 socket 连接
pub struct SocketConnection {
    writer: Arc<Mutex<WsWriter>>,
    connected: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SocketConnection {
    /// 建立连接、完成 Engine.IO 握手并启动后台读循环与心跳
    ///
    /// 解析出的事件通过 `events` 发出
    pub async fn connect(
        url: &str,
        version: EngineVersion,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> Result<Self> {
        info!("[Socket] 🔗 连接到 socket 服务器 (EIO={})", version.number());
        let (ws_stream, response) = connect_async(url).await.context("socket 连接失败")?;
        info!("[Socket] ✅ WebSocket 连接成功, 状态: {}", response.status());

        let (write, mut read) = ws_stream.split();
        let writer = Arc::new(Mutex::new(write));

        // 等待 open 包
        let open = match read.next().await {
            Some(Ok(WsMessage::Text(text))) => match EnginePacket::parse(&text)? {
                EnginePacket::Open(open) => open,
                other => return Err(anyhow::anyhow!("期望 open 包，收到: {:?}", other)),
            },
            Some(Ok(other)) => return Err(anyhow::anyhow!("期望 open 包，收到: {:?}", other)),
            Some(Err(e)) => return Err(anyhow::Error::new(e).context("读取握手失败")),
            None => return Err(anyhow::anyhow!("未收到握手响应，连接已关闭")),
        };
        info!(
            "[Socket] 🤝 握手完成 sid={}, pingInterval={}ms",
            open.sid, open.ping_interval
        );

        if version == EngineVersion::V4 {
            let connect = SocketPacket::new(SocketPacketKind::Connect).encode();
            send_text(&writer, EnginePacket::Message(connect).encode()).await?;
        }

        let connected = Arc::new(AtomicBool::new(false));
        let mut tasks = Vec::new();

        if version == EngineVersion::V3 {
            let writer_for_heartbeat = writer.clone();
            let period = Duration::from_millis(open.ping_interval.max(1000));
            info!("[Socket] 💓 启动心跳，间隔 {:?}", period);
            tasks.push(tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let ping = EnginePacket::Ping(String::new()).encode();
                    if send_text(&writer_for_heartbeat, ping).await.is_err() {
                        break;
                    }
                }
            }));
        }

        let reader = Reader {
            writer: writer.clone(),
            connected: connected.clone(),
            version,
            events,
        };
        info!("[Socket] 📥 开始监听服务器消息");
        tasks.push(tokio::spawn(async move {
            let reason = reader.run(read).await;
            reader.connected.store(false, Ordering::SeqCst);
            let _ = reader.events.send(SocketEvent::Disconnected(reason));
        }));

        Ok(Self {
            writer,
            connected,
            tasks,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// 主动断开：发送命名空间 disconnect 与 Engine.IO close，然后停止后台任务
    pub async fn disconnect(mut self) {
        info!("[Socket] 👋 主动断开连接");
        let leave = SocketPacket::new(SocketPacketKind::Disconnect).encode();
        let _ = send_text(&self.writer, EnginePacket::Message(leave).encode()).await;
        let _ = send_text(&self.writer, EnginePacket::Close.encode()).await;
        let _ = self.writer.lock().await.close().await;
        self.connected.store(false, Ordering::SeqCst);
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for SocketConnection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn send_text(writer: &Arc<Mutex<WsWriter>>, text: String) -> Result<()> {
    debug!("[Socket] 📤 {}", text);
    let mut w = writer.lock().await;
    w.send(WsMessage::Text(text)).await?;
    Ok(())
}

struct Reader {
    writer: Arc<Mutex<WsWriter>>,
    connected: Arc<AtomicBool>,
    version: EngineVersion,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl Reader {
    /// 读循环，返回断开原因
    async fn run(&self, mut read: WsReader) -> String {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(WsMessage::Text(text)) => {
                    if let Some(reason) = self.handle_frame(&text).await {
                        return reason;
                    }
                }
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
                Ok(WsMessage::Close(frame)) => {
                    warn!("[Socket] 👋 连接关闭: {:?}", frame);
                    return "服务器关闭连接".to_string();
                }
                Ok(other) => {
                    debug!("[Socket] 忽略非文本帧: {:?}", other);
                }
                Err(e) => {
                    error!("[Socket] WebSocket 错误: {}", e);
                    return format!("WebSocket 错误: {e}");
                }
            }
        }
        "连接已结束".to_string()
    }

    /// 处理一个文本帧；需要结束读循环时返回原因
    async fn handle_frame(&self, text: &str) -> Option<String> {
        let packet = match EnginePacket::parse(text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("[Socket] ⚠️ 无法解析帧: {} ({})", text, e);
                return None;
            }
        };

        match packet {
            EnginePacket::Ping(body) => {
                if self.version == EngineVersion::V4 {
                    let pong = EnginePacket::Pong(body).encode();
                    if let Err(e) = send_text(&self.writer, pong).await {
                        return Some(format!("发送 pong 失败: {e}"));
                    }
                }
            }
            EnginePacket::Pong(_) => debug!("[Socket] 💓 收到 pong"),
            EnginePacket::Close => return Some("服务器关闭 Engine.IO 会话".to_string()),
            EnginePacket::Message(body) => return self.handle_socket_packet(&body),
            EnginePacket::Open(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
        }
        None
    }

    fn handle_socket_packet(&self, body: &str) -> Option<String> {
        let packet = match SocketPacket::parse(body) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("[Socket] ⚠️ 无法解析 Socket.IO 包: {} ({})", body, e);
                return None;
            }
        };
        if packet.namespace != "/" {
            debug!("[Socket] 忽略命名空间 {} 的包", packet.namespace);
            return None;
        }

        match packet.kind {
            SocketPacketKind::Connect => {
                info!("[Socket] ✅ 命名空间连接成功");
                self.connected.store(true, Ordering::SeqCst);
                let _ = self.events.send(SocketEvent::Connected);
            }
            SocketPacketKind::ConnectError => {
                let reason = packet.error_message();
                error!("[Socket] ❌ 连接被拒绝: {}", reason);
                return Some(format!("连接被拒绝: {reason}"));
            }
            SocketPacketKind::Disconnect => {
                warn!("[Socket] 👋 服务器断开命名空间");
                return Some("服务器断开连接".to_string());
            }
            SocketPacketKind::Event => match packet.event_parts() {
                Some((MESSAGE_EVENT, [payload, ..])) => match decode_socket_payload(payload) {
                    Ok(message) => {
                        debug!(
                            "[Socket] 📨 新消息 id={}, 会话={}",
                            message.id, message.conversation_id
                        );
                        let _ = self.events.send(SocketEvent::Message(message));
                    }
                    Err(e) => warn!("[Socket] ⚠️ 消息解析失败: {:#}", e),
                },
                Some((name, args)) => {
                    debug!("[Socket] 收到事件: {}", name);
                    let _ = self.events.send(SocketEvent::Other {
                        name: name.to_string(),
                        payload: args.to_vec(),
                    });
                }
                None => warn!("[Socket] ⚠️ 事件包格式错误: {}", body),
            },
            SocketPacketKind::Ack => debug!("[Socket] 收到 ack: {:?}", packet.id),
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn socket_url_uses_websocket_scheme_and_token_query() {
        let url = build_socket_url("http://localhost:8099", "a.b.c", EngineVersion::V4).unwrap();
        assert_eq!(
            url,
            "ws://localhost:8099/socket.io/?EIO=4&transport=websocket&token=a.b.c"
        );

        let url = build_socket_url("https://chat.example.com/rt/", "t+1", EngineVersion::V3).unwrap();
        assert_eq!(
            url,
            "wss://chat.example.com/rt/socket.io/?EIO=3&transport=websocket&token=t%2B1"
        );

        assert!(build_socket_url("ftp://x", "t", EngineVersion::V4).is_err());
        assert!(build_socket_url("not a url", "t", EngineVersion::V4).is_err());
    }

    #[test]
    fn engine_version_from_number() {
        assert_eq!(EngineVersion::from_number(3).unwrap(), EngineVersion::V3);
        assert_eq!(EngineVersion::from_number(4).unwrap(), EngineVersion::V4);
        assert!(EngineVersion::from_number(5).is_err());
    }

    #[test]
    fn parses_engine_open_packet() {
        let frame = r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;
        match EnginePacket::parse(frame).unwrap() {
            EnginePacket::Open(open) => {
                assert_eq!(open.sid, "abc");
                assert_eq!(open.ping_interval, 25000);
                assert_eq!(open.ping_timeout, 20000);
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn engine_ping_pong_and_message() {
        assert_eq!(EnginePacket::parse("2").unwrap(), EnginePacket::Ping(String::new()));
        assert_eq!(
            EnginePacket::parse("2probe").unwrap(),
            EnginePacket::Ping("probe".into())
        );
        assert_eq!(EnginePacket::Pong("probe".into()).encode(), "3probe");
        assert_eq!(
            EnginePacket::parse("40").unwrap(),
            EnginePacket::Message("0".into())
        );
        assert_eq!(EnginePacket::parse("6").unwrap(), EnginePacket::Noop);
        assert!(EnginePacket::parse("").is_err());
        assert!(EnginePacket::parse("9").is_err());
        assert!(EnginePacket::parse("0{bad").is_err());
    }

    #[test]
    fn parses_message_event_with_string_payload() {
        let payload = json!({
            "id": "m1",
            "conversationId": "c1",
            "me": false,
            "message": "hi",
            "sender": {"userId": "u2", "username": "bob"},
            "createdDate": "2024-05-01T10:00:00Z"
        })
        .to_string();
        let body = json!(["message", payload]).to_string();
        let frame = format!("42{body}");

        let packet = match EnginePacket::parse(&frame).unwrap() {
            EnginePacket::Message(body) => SocketPacket::parse(&body).unwrap(),
            other => panic!("unexpected packet {other:?}"),
        };
        assert_eq!(packet.kind, SocketPacketKind::Event);
        assert_eq!(packet.namespace, "/");

        let (name, args) = packet.event_parts().unwrap();
        assert_eq!(name, MESSAGE_EVENT);
        let message = decode_socket_payload(&args[0]).unwrap();
        assert_eq!(message.id, "m1");
        assert_eq!(message.sender_id(), Some("u2"));
    }

    #[test]
    fn parses_namespace_and_ack_id() {
        let packet = SocketPacket::parse(r#"2/chat,17["typing",{"a":1}]"#).unwrap();
        assert_eq!(packet.namespace, "/chat");
        assert_eq!(packet.id, Some(17));
        assert_eq!(packet.event_parts().map(|(n, _)| n), Some("typing"));
        assert_eq!(packet.encode(), r#"2/chat,17["typing",{"a":1}]"#);

        let packet = SocketPacket::parse("0/admin").unwrap();
        assert_eq!(packet.kind, SocketPacketKind::Connect);
        assert_eq!(packet.namespace, "/admin");
        assert!(packet.data.is_none());
    }

    #[test]
    fn connect_packets() {
        assert_eq!(SocketPacket::new(SocketPacketKind::Connect).encode(), "0");
        let ack = SocketPacket::parse(r#"0{"sid":"xyz"}"#).unwrap();
        assert_eq!(ack.kind, SocketPacketKind::Connect);
        assert_eq!(ack.data, Some(json!({"sid": "xyz"})));

        let err = SocketPacket::parse(r#"4{"message":"Not authorized"}"#).unwrap();
        assert_eq!(err.kind, SocketPacketKind::ConnectError);
        assert_eq!(err.error_message(), "Not authorized");
        assert_eq!(
            SocketPacket::parse(r#"4"bad token""#).unwrap().error_message(),
            "bad token"
        );
    }

    #[test]
    fn event_encoding() {
        let packet = SocketPacket::event("message", vec![json!("hello")]);
        assert_eq!(packet.encode(), r#"2["message","hello"]"#);
        assert_eq!(
            EnginePacket::Message(packet.encode()).encode(),
            r#"42["message","hello"]"#
        );
    }

    #[test]
    fn rejects_binary_and_unknown_packets() {
        assert!(SocketPacket::parse("51-[\"x\",{\"_placeholder\":true,\"num\":0}]").is_err());
        assert!(SocketPacket::parse("").is_err());
        assert!(SocketPacket::parse("2[broken").is_err());
        assert!(SocketPacket::parse("1").unwrap().event_parts().is_none());
    }
}
