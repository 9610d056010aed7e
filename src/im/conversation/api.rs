//! 会话 HTTP API 客户端
//!
//! 负责所有会话相关的 HTTP 请求

use crate::im::conversation::types::{Conversation, ConversationRequest, ConversationType};
use crate::im::types::handle_http_response;
use anyhow::{Context, Result};
use tracing::{debug, info};

pub const MY_CONVERSATIONS_PATH: &str = "/chat/conversations/my-conversations";
pub const CREATE_CONVERSATION_PATH: &str = "/chat/conversations/create";

/// 会话相关的 HTTP API 客户端
pub struct ConversationApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl ConversationApi {
    /// 创建新的会话 API 客户端
    ///
    /// `client` 应该已经在外部配置好认证头
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url,
        }
    }

    /// 从服务器获取我的会话列表
    pub async fn get_my_conversations(&self) -> Result<Vec<Conversation>> {
        let url = format!("{}{}", self.api_base_url, MY_CONVERSATIONS_PATH);

        info!("[ConvAPI] 📡 请求我的会话列表");
        debug!("[ConvAPI]   请求URL: {}", url);

        let response = self.client.get(&url).send().await.context("请求失败")?;
        let conversations =
            handle_http_response::<Vec<Conversation>>(response, "会话列表").await?;

        info!("[ConvAPI] ✅ 会话列表响应，会话数: {}", conversations.len());
        debug!(
            "[ConvAPI]   会话详情: {:?}",
            conversations.iter().map(|c| &c.id).collect::<Vec<_>>()
        );
        Ok(conversations)
    }

    /// 创建会话；服务器按参与者哈希去重，已存在时返回已有会话
    pub async fn create_conversation(
        &self,
        conversation_type: ConversationType,
        participant_ids: Vec<String>,
    ) -> Result<Conversation> {
        if participant_ids.is_empty() {
            return Err(anyhow::anyhow!("创建会话至少需要一个参与者"));
        }
        let url = format!("{}{}", self.api_base_url, CREATE_CONVERSATION_PATH);

        info!(
            "[ConvAPI] 📡 创建会话，类型: {:?}, 参与者: {:?}",
            conversation_type, participant_ids
        );

        let response = self
            .client
            .post(&url)
            .json(&ConversationRequest {
                conversation_type,
                participant_ids,
            })
            .send()
            .await
            .context("请求失败")?;

        let conversation = handle_http_response::<Conversation>(response, "创建会话").await?;
        info!("[ConvAPI] ✅ 会话已就绪: {}", conversation.id);
        Ok(conversation)
    }
}
