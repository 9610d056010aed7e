//! 会话模块
//!
//! 会话列表拉取、创建会话，以及会话变更回调

pub mod api;
pub mod listener;
pub mod types;

// 重新导出主要类型
pub use api::ConversationApi;
pub use listener::{ConversationListener, EmptyConversationListener};
pub use types::{Conversation, ConversationRequest, ConversationType, ParticipantInfo};
