pub mod im;

// 重新导出常用类型和函数，方便外部使用
pub use im::{
    chat_state::{ChatState, IncomingOutcome},
    client::{ChatClient, ClientConfig},
    conversation::{Conversation, ConversationListener, ConversationType},
    message::{Message, MessageListener},
    post::{Post, PostFeed},
    profile::{UpdateProfileRequest, UserProfile},
    types::ApiError,
};
