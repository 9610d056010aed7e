//! 消息模块
//!
//! 消息的 HTTP 接口、本地消息结构与消息回调

pub mod api;
pub mod listener;
pub mod types;

// 重新导出主要类型和函数
pub use api::MessageApi;
pub use listener::{EmptyMessageListener, MessageListener};
pub use types::{decode_socket_payload, ChatMessageRequest, Message};
