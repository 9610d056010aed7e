//! 消息 HTTP API 客户端

use crate::im::message::types::{ChatMessageRequest, Message};
use crate::im::types::handle_http_response;
use anyhow::{Context, Result};
use tracing::{debug, info};

pub const CREATE_MESSAGE_PATH: &str = "/chat/messages/create";
pub const GET_MESSAGES_PATH: &str = "/chat/messages";

pub struct MessageApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl MessageApi {
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url,
        }
    }

    /// 发送消息，返回服务器确认后的消息
    pub async fn create_message(&self, conversation_id: &str, message: &str) -> Result<Message> {
        let url = format!("{}{}", self.api_base_url, CREATE_MESSAGE_PATH);
        info!("[MsgAPI] 📤 发送消息到会话 {}", conversation_id);

        let response = self
            .client
            .post(&url)
            .json(&ChatMessageRequest {
                conversation_id: conversation_id.to_string(),
                message: message.to_string(),
            })
            .send()
            .await
            .context("请求失败")?;

        let created = handle_http_response::<Message>(response, "发送消息").await?;
        info!("[MsgAPI] ✅ 消息已确认: {}", created.id);
        Ok(created)
    }

    /// 获取会话历史消息（服务器按时间倒序返回）
    pub async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let url = format!("{}{}", self.api_base_url, GET_MESSAGES_PATH);
        info!("[MsgAPI] 📡 请求会话 {} 的历史消息", conversation_id);
        debug!("[MsgAPI]   请求URL: {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("conversationId", conversation_id)])
            .send()
            .await
            .context("请求失败")?;

        let messages = handle_http_response::<Vec<Message>>(response, "历史消息").await?;
        info!("[MsgAPI] ✅ 收到 {} 条历史消息", messages.len());
        Ok(messages)
    }
}
