//! 用户资料模块
//!
//! 获取/更新当前用户资料、上传头像、搜索用户（用于发起新聊天）

pub mod api;
pub mod types;

pub use api::ProfileApi;
pub use types::{SearchUserRequest, UpdateProfileRequest, UserProfile};
