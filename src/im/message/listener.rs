//! 消息监听器
//!
//! 此模块定义了消息相关的回调接口。

use crate::im::message::types::Message;
use async_trait::async_trait;

/// 消息监听器
#[async_trait]
pub trait MessageListener: Send + Sync {
    /// 某个会话的消息列表发生变化（已按时间升序排列）
    async fn on_messages_changed(&self, conversation_id: String, messages: Vec<Message>);

    /// 通过 socket 收到新消息（已去重）
    async fn on_recv_new_message(&self, message: Message);

    /// 乐观发送失败，消息保留在列表中并带有 failed 标记
    async fn on_send_failed(&self, message: Message);

    /// 连接状态变化
    async fn on_connection_status_changed(&self, connected: bool, message: String);
}

/// 空的消息监听器实现（默认实现）
pub struct EmptyMessageListener;

#[async_trait]
impl MessageListener for EmptyMessageListener {
    async fn on_messages_changed(&self, _conversation_id: String, _messages: Vec<Message>) {}
    async fn on_recv_new_message(&self, _message: Message) {}
    async fn on_send_failed(&self, _message: Message) {}
    async fn on_connection_status_changed(&self, _connected: bool, _message: String) {}
}
