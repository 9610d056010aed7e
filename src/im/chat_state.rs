//! 聊天界面状态：会话列表、当前选中会话、按会话分组的消息
//!
//! 本模块是纯同步状态，由 [`crate::im::client::ChatClient`] 放在
//! `tokio::sync::Mutex` 后面使用。它负责把三路数据合并成一致的视图：
//!
//! - 乐观发送的本地消息（临时 ID，`pending`）
//! - 服务器对发送请求的确认（真实 ID）或失败（`failed`）
//! - socket 推送的实时消息（按 ID 去重）
//!
//! 任何变更之后，每个会话内的消息都按创建时间升序排列（相同时间保持插入顺序）。

use crate::im::conversation::types::{Conversation, ParticipantInfo};
use crate::im::message::types::Message;
use crate::im::serialization::{generate_temp_msg_id, is_temp_msg_id};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatStateError {
    #[error("消息内容不能为空")]
    EmptyMessage,
    #[error("未知会话: {0}")]
    UnknownConversation(String),
    #[error("会话 {conversation_id} 中找不到本地消息 {message_id}")]
    UnknownLocalMessage {
        conversation_id: String,
        message_id: String,
    },
    #[error("消息 {0} 不是发送失败状态")]
    NotFailed(String),
}

/// socket 推送消息的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingOutcome {
    /// 已插入，附带该会话当前未读数
    Inserted { unread: u32 },
    /// 已插入，但会话不在列表中（等会话出现后再展示）
    UnknownConversation,
    /// 重复消息，状态未变化
    Duplicate,
}

#[derive(Debug, Default)]
pub struct ChatState {
    current_user: Option<ParticipantInfo>,
    conversations: Vec<Conversation>,
    selected: Option<String>,
    messages: HashMap<String, Vec<Message>>,
    /// 已加载过历史消息的会话
    loaded: HashSet<String>,
    /// 尚未出现在会话列表中的会话累计的未读数
    pending_unread: HashMap<String, u32>,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置当前用户（作为乐观消息的发送者）
    pub fn set_current_user(&mut self, user: Option<ParticipantInfo>) {
        self.current_user = user;
    }

    pub fn current_user(&self) -> Option<&ParticipantInfo> {
        self.current_user.as_ref()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_conversation(&self) -> Option<&Conversation> {
        self.selected_id().and_then(|id| self.conversation(id))
    }

    /// 某个会话的消息（升序）
    pub fn messages(&self, conversation_id: &str) -> &[Message] {
        self.messages
            .get(conversation_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 当前选中会话的消息
    pub fn current_messages(&self) -> &[Message] {
        match self.selected_id() {
            Some(id) => self.messages(id),
            None => &[],
        }
    }

    pub fn total_unread(&self) -> u32 {
        self.conversations.iter().map(|c| c.unread).sum()
    }

    pub fn needs_history(&self, conversation_id: &str) -> bool {
        !self.loaded.contains(conversation_id)
    }

    /// 用服务器列表替换会话列表，保留已知会话的客户端字段
    ///
    /// 若当前没有选中会话且列表非空，自动选中第一个，返回被选中的会话 ID
    pub fn replace_conversations(&mut self, conversations: Vec<Conversation>) -> Option<String> {
        let previous: HashMap<String, Conversation> = self
            .conversations
            .drain(..)
            .map(|c| (c.id.clone(), c))
            .collect();

        let mut seen = HashSet::new();
        self.conversations = conversations
            .into_iter()
            .filter(|c| seen.insert(c.id.clone()))
            .map(|mut c| {
                if let Some(prev) = previous.get(&c.id) {
                    c.inherit_client_fields(prev);
                }
                c
            })
            .collect();

        // 从列表中消失的会话不再保留消息；从未出现过的会话的消息继续暂存
        for id in previous.keys().filter(|id| !seen.contains(*id)) {
            self.messages.remove(id);
            self.loaded.remove(id);
            self.pending_unread.remove(id);
        }

        let arrived: Vec<String> = self
            .conversations
            .iter()
            .filter(|c| !previous.contains_key(&c.id))
            .map(|c| c.id.clone())
            .collect();
        for id in &arrived {
            self.adopt_stored_messages(id);
        }

        if let Some(selected) = self.selected.clone() {
            if self.conversation(&selected).is_none() {
                warn!("[ChatState] 选中的会话 {} 已不在列表中", selected);
                self.selected = None;
            }
        }

        info!(
            "[ChatState] 会话列表已更新，共 {} 个",
            self.conversations.len()
        );

        if self.selected.is_none() {
            let first = self.conversations.first().map(|c| c.id.clone())?;
            self.mark_selected(&first);
            return Some(first);
        }
        None
    }

    /// 选中会话并清零未读数，返回是否还需要加载历史消息
    pub fn select_conversation(&mut self, conversation_id: &str) -> Result<bool, ChatStateError> {
        if self.conversation(conversation_id).is_none() {
            return Err(ChatStateError::UnknownConversation(
                conversation_id.to_string(),
            ));
        }
        self.mark_selected(conversation_id);
        Ok(self.needs_history(conversation_id))
    }

    fn mark_selected(&mut self, conversation_id: &str) {
        self.selected = Some(conversation_id.to_string());
        if let Some(conv) = self.conversation_mut(conversation_id) {
            conv.unread = 0;
        }
        debug!("[ChatState] 选中会话 {}", conversation_id);
    }

    /// 新聊天：会话已存在则直接选中，否则放到列表最前面并选中
    ///
    /// 返回是否为新加入的会话
    pub fn open_conversation(&mut self, conversation: Conversation) -> bool {
        let id = conversation.id.clone();
        let is_new = self.conversation(&id).is_none();
        if is_new {
            info!("[ChatState] 🆕 新会话 {}", id);
            self.conversations.insert(0, conversation);
            self.adopt_stored_messages(&id);
        }
        self.mark_selected(&id);
        is_new
    }

    /// 会话刚进入列表：用暂存的消息补上预览与未读数
    fn adopt_stored_messages(&mut self, conversation_id: &str) {
        let unread = self.pending_unread.remove(conversation_id).unwrap_or(0);
        let latest = self
            .messages(conversation_id)
            .last()
            .map(|m| (m.message.clone(), m.created_date));
        if let Some((text, at)) = latest {
            self.update_preview(conversation_id, &text, at);
        }

        let is_selected = self.selected.as_deref() == Some(conversation_id);
        if let Some(conv) = self.conversation_mut(conversation_id) {
            if !is_selected {
                conv.unread = conv.unread.max(unread);
            }
            if unread > 0 {
                debug!(
                    "[ChatState] 会话 {} 补上暂存的未读数 {}",
                    conversation_id, unread
                );
            }
        }
    }

    /// 应用服务器返回的历史消息
    ///
    /// 本地已有的消息（乐观发送中的、失败的、socket 先到的）按 ID 合并保留
    pub fn apply_history(&mut self, conversation_id: &str, history: Vec<Message>) {
        let local = self.messages.remove(conversation_id).unwrap_or_default();

        let mut ids = HashSet::new();
        let mut merged: Vec<Message> = history
            .into_iter()
            .filter(|m| ids.insert(m.id.clone()))
            .collect();
        merged.extend(local.into_iter().filter(|m| !ids.contains(&m.id)));
        merged.sort_by_key(|m| m.created_date);

        let latest = merged.last().cloned();
        self.messages.insert(conversation_id.to_string(), merged);
        self.loaded.insert(conversation_id.to_string());

        if let Some(latest) = latest {
            self.update_preview(conversation_id, &latest.message, latest.created_date);
        }
        debug!(
            "[ChatState] 会话 {} 历史消息已加载，共 {} 条",
            conversation_id,
            self.messages(conversation_id).len()
        );
    }

    /// 乐观发送第一步：插入带临时 ID 的本地消息并立即更新会话预览
    pub fn begin_send(
        &mut self,
        conversation_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Message, ChatStateError> {
        if text.trim().is_empty() {
            return Err(ChatStateError::EmptyMessage);
        }
        if self.conversation(conversation_id).is_none() {
            return Err(ChatStateError::UnknownConversation(
                conversation_id.to_string(),
            ));
        }

        let local = Message {
            id: generate_temp_msg_id(),
            conversation_id: conversation_id.to_string(),
            me: true,
            message: text.to_string(),
            sender: self.current_user.clone(),
            created_date: now,
            pending: true,
            failed: false,
        };
        debug!("[ChatState] ⏳ 乐观插入消息 {}", local.id);

        self.insert_sorted(local.clone());
        self.update_preview(conversation_id, text, now);
        Ok(local)
    }

    /// 发送成功：移除临时消息，插入服务器确认的消息
    ///
    /// 若 socket 已先送达同 ID 的消息，则只移除临时消息
    pub fn confirm_send(
        &mut self,
        conversation_id: &str,
        temp_id: &str,
        confirmed: Message,
    ) -> Result<Message, ChatStateError> {
        self.take_local(conversation_id, temp_id)?;

        let mut confirmed = confirmed;
        confirmed.conversation_id = conversation_id.to_string();
        confirmed.me = true;
        confirmed.pending = false;
        confirmed.failed = false;

        let already_delivered = self
            .messages(conversation_id)
            .iter()
            .any(|m| m.id == confirmed.id);
        if already_delivered {
            debug!(
                "[ChatState] 消息 {} 已由 socket 送达，仅移除临时消息 {}",
                confirmed.id, temp_id
            );
        } else {
            self.insert_sorted(confirmed.clone());
        }

        self.update_preview(conversation_id, &confirmed.message, confirmed.created_date);
        info!("[ChatState] ✅ 临时消息 {} -> {}", temp_id, confirmed.id);
        Ok(confirmed)
    }

    /// 发送失败：保留临时消息并标记 failed，不自动重试
    pub fn fail_send(
        &mut self,
        conversation_id: &str,
        temp_id: &str,
    ) -> Result<Message, ChatStateError> {
        let msg = self
            .local_mut(conversation_id, temp_id)
            .filter(|_| is_temp_msg_id(temp_id))
            .ok_or_else(|| ChatStateError::UnknownLocalMessage {
                conversation_id: conversation_id.to_string(),
                message_id: temp_id.to_string(),
            })?;
        msg.pending = false;
        msg.failed = true;
        warn!("[ChatState] ❌ 消息 {} 发送失败", temp_id);
        Ok(msg.clone())
    }

    /// 移除一条发送失败的消息
    pub fn discard_failed(
        &mut self,
        conversation_id: &str,
        temp_id: &str,
    ) -> Result<Message, ChatStateError> {
        let failed = self
            .messages(conversation_id)
            .iter()
            .find(|m| m.id == temp_id)
            .map(|m| m.failed);
        match failed {
            Some(true) => self.take_local(conversation_id, temp_id),
            Some(false) => Err(ChatStateError::NotFailed(temp_id.to_string())),
            None => Err(ChatStateError::UnknownLocalMessage {
                conversation_id: conversation_id.to_string(),
                message_id: temp_id.to_string(),
            }),
        }
    }

    /// 处理 socket 推送的消息
    ///
    /// 按 ID 与该会话已有消息去重；只有消息所属会话不是当前选中会话、
    /// 且不是自己发的消息时，未读数才加一
    pub fn apply_incoming(&mut self, message: Message) -> IncomingOutcome {
        let conversation_id = message.conversation_id.clone();
        if self
            .messages(&conversation_id)
            .iter()
            .any(|m| m.id == message.id)
        {
            debug!("[ChatState] 消息 {} 已存在，忽略", message.id);
            return IncomingOutcome::Duplicate;
        }

        let is_own = message.me
            || match (&self.current_user, message.sender_id()) {
                (Some(me), Some(sender)) => me.user_id == sender,
                _ => false,
            };
        let text = message.message.clone();
        let created = message.created_date;
        let mut message = message;
        message.pending = false;
        message.failed = false;
        self.insert_sorted(message);

        let is_selected = self.selected.as_deref() == Some(conversation_id.as_str());
        self.update_preview(&conversation_id, &text, created);
        match self.conversation_mut(&conversation_id) {
            Some(conv) => {
                if is_selected {
                    conv.unread = 0;
                } else if !is_own {
                    conv.unread += 1;
                }
                IncomingOutcome::Inserted {
                    unread: conv.unread,
                }
            }
            None => {
                if !is_own {
                    *self.pending_unread.entry(conversation_id.clone()).or_default() += 1;
                }
                warn!(
                    "[ChatState] 收到未知会话 {} 的消息，暂存等待会话列表刷新",
                    conversation_id
                );
                IncomingOutcome::UnknownConversation
            }
        }
    }

    fn conversation_mut(&mut self, conversation_id: &str) -> Option<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
    }

    fn local_mut(&mut self, conversation_id: &str, message_id: &str) -> Option<&mut Message> {
        self.messages
            .get_mut(conversation_id)?
            .iter_mut()
            .find(|m| m.id == message_id)
    }

    fn take_local(
        &mut self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<Message, ChatStateError> {
        let list = self.messages.get_mut(conversation_id);
        let pos = list
            .as_ref()
            .and_then(|l| l.iter().position(|m| m.id == message_id));
        match (list, pos) {
            (Some(list), Some(pos)) => Ok(list.remove(pos)),
            _ => Err(ChatStateError::UnknownLocalMessage {
                conversation_id: conversation_id.to_string(),
                message_id: message_id.to_string(),
            }),
        }
    }

    fn insert_sorted(&mut self, message: Message) {
        let list = self
            .messages
            .entry(message.conversation_id.clone())
            .or_default();
        // 插到最后一个不晚于它的位置之后，保持升序且同时间保持到达顺序
        let pos = list.partition_point(|m| m.created_date <= message.created_date);
        list.insert(pos, message);
    }

    /// 最新消息预览：按时间戳后写者胜
    fn update_preview(&mut self, conversation_id: &str, text: &str, at: DateTime<Utc>) {
        if let Some(conv) = self.conversation_mut(conversation_id) {
            if conv.last_timestamp.map_or(true, |last| at >= last) {
                conv.last_message = Some(text.to_string());
                conv.last_timestamp = Some(at);
                conv.modified_date = Some(conv.modified_date.map_or(at, |m| m.max(at)));
            }
        }
    }
}
