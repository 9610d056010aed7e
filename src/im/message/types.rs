//! 消息类型定义

use crate::im::conversation::types::ParticipantInfo;
use crate::im::serialization::deserialize_instant;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 聊天消息
///
/// 服务器返回的 ChatMessageResponse 直接反序列化为本结构；
/// `pending` / `failed` 是乐观发送期间的本地标记，服务器不会返回。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// 服务器 ID，或乐观发送时的临时 ID（temp- 前缀）
    pub id: String,
    pub conversation_id: String,
    /// 是否由当前用户发送
    #[serde(default)]
    pub me: bool,
    /// 消息正文
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub sender: Option<ParticipantInfo>,
    #[serde(deserialize_with = "deserialize_instant")]
    pub created_date: DateTime<Utc>,
    /// 等待服务器确认
    #[serde(default)]
    pub pending: bool,
    /// 发送失败
    #[serde(default)]
    pub failed: bool,
}

impl Message {
    pub fn sender_id(&self) -> Option<&str> {
        self.sender.as_ref().map(|s| s.user_id.as_str())
    }
}

/// 发送消息请求
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageRequest {
    pub conversation_id: String,
    pub message: String,
}

/// 解析 socket `message` 事件的参数
///
/// 服务端先把消息序列化成 JSON 字符串再发送，因此参数通常是字符串；
/// 也兼容直接发送对象的情况。
pub fn decode_socket_payload(payload: &serde_json::Value) -> Result<Message> {
    match payload {
        serde_json::Value::String(text) => {
            serde_json::from_str(text).context("解析 socket 消息字符串失败")
        }
        serde_json::Value::Object(_) => {
            Message::deserialize(payload).context("解析 socket 消息对象失败")
        }
        other => Err(anyhow::anyhow!("不支持的 socket 消息格式: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = r#"{"id":"m1","conversationId":"c1","me":false,"message":"hi","sender":{"userId":"u2","username":"bob"},"createdDate":"2024-05-01T10:00:00Z"}"#;

    #[test]
    fn decodes_double_encoded_payload() {
        let payload = serde_json::Value::String(RAW.to_string());
        let msg = decode_socket_payload(&payload).unwrap();
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.sender_id(), Some("u2"));
        assert!(!msg.pending && !msg.failed);
    }

    #[test]
    fn decodes_object_payload() {
        let payload: serde_json::Value = serde_json::from_str(RAW).unwrap();
        let msg = decode_socket_payload(&payload).unwrap();
        assert_eq!(msg.conversation_id, "c1");
        assert_eq!(msg.message, "hi");
    }

    #[test]
    fn rejects_other_payloads() {
        assert!(decode_socket_payload(&serde_json::json!(42)).is_err());
        assert!(decode_socket_payload(&serde_json::json!("not json")).is_err());
        assert!(decode_socket_payload(&serde_json::json!({"id":"m1"})).is_err());
    }
}
