//! 帖子模块
//!
//! 我的帖子分页拉取、发帖，以及客户端的分页累积状态

pub mod api;
pub mod feed;
pub mod types;

pub use api::{PostApi, DEFAULT_PAGE_SIZE};
pub use feed::PostFeed;
pub use types::{Post, PostRequest};
