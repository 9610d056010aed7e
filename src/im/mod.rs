pub mod auth;
pub mod chat_state;
pub mod client;
pub mod conversation;
pub mod message;
pub mod post;
pub mod profile;
pub mod serialization;
pub mod socket;
pub mod types;

// 重新导出认证相关类型
pub use auth::{AuthenticationResponse, Session, TokenClaims};

// 重新导出聊天状态相关类型
pub use chat_state::{ChatState, ChatStateError, IncomingOutcome};
