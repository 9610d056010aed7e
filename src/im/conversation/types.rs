//! 会话 DTO

use crate::im::serialization::{deserialize_opt_instant, deserialize_vec_or_null};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 会话类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConversationType {
    #[default]
    Direct,
    Group,
    /// 服务器返回了未知类型
    #[serde(other)]
    Other,
}

/// 会话参与者
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// 会话
///
/// 服务器字段直接反序列化；`last_message` / `last_timestamp` / `unread`
/// 为客户端维护的字段，服务器不返回时使用默认值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(rename = "type", default)]
    pub conversation_type: ConversationType,
    #[serde(default)]
    pub participants_hash: Option<String>,
    /// 显示名称
    #[serde(default)]
    pub conversation_name: Option<String>,
    /// 头像 URL
    #[serde(default)]
    pub conversation_avatar: Option<String>,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub participants: Vec<ParticipantInfo>,
    #[serde(default, deserialize_with = "deserialize_opt_instant")]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_opt_instant")]
    pub modified_date: Option<DateTime<Utc>>,
    /// 最新消息预览
    #[serde(default)]
    pub last_message: Option<String>,
    /// 最新消息时间
    #[serde(default, deserialize_with = "deserialize_opt_instant")]
    pub last_timestamp: Option<DateTime<Utc>>,
    /// 未读数
    #[serde(default)]
    pub unread: u32,
}

impl Conversation {
    pub fn display_name(&self) -> &str {
        self.conversation_name.as_deref().unwrap_or(&self.id)
    }

    /// 保留客户端维护的字段（服务器刷新列表时使用）
    pub(crate) fn inherit_client_fields(&mut self, previous: &Conversation) {
        if self.last_message.is_none() {
            self.last_message = previous.last_message.clone();
        }
        if self.last_timestamp.is_none() {
            self.last_timestamp = previous.last_timestamp;
        }
        self.unread = self.unread.max(previous.unread);
    }
}

/// 创建会话请求
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRequest {
    #[serde(rename = "type")]
    pub conversation_type: ConversationType,
    pub participant_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_server_conversation() {
        let conv: Conversation = serde_json::from_str(
            r#"{
                "id":"c1","type":"DIRECT","participantsHash":"h",
                "conversationName":"bob","conversationAvatar":null,
                "participants":[{"userId":"u1","username":"alice"},{"userId":"u2","username":"bob"}],
                "createdDate":"2024-05-01T10:00:00Z","modifiedDate":"2024-05-01T11:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(conv.conversation_type, ConversationType::Direct);
        assert_eq!(conv.participants.len(), 2);
        assert_eq!(conv.display_name(), "bob");
        assert_eq!(conv.unread, 0);
        assert!(conv.last_message.is_none());
    }

    #[test]
    fn unknown_type_and_null_participants() {
        let conv: Conversation =
            serde_json::from_str(r#"{"id":"c2","type":"CHANNEL","participants":null}"#).unwrap();
        assert_eq!(conv.conversation_type, ConversationType::Other);
        assert!(conv.participants.is_empty());
        assert_eq!(conv.display_name(), "c2");
    }

    #[test]
    fn request_uses_wire_names() {
        let req = ConversationRequest {
            conversation_type: ConversationType::Direct,
            participant_ids: vec!["u2".into()],
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({ "type": "DIRECT", "participantIds": ["u2"] })
        );
    }
}
