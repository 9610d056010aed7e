//! 帖子 DTO

use crate::im::serialization::deserialize_opt_instant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 帖子（post-service 的 PostResponse）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    /// 服务端格式化好的相对时间，例如 "5 minute(s) ago"
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_instant")]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_opt_instant")]
    pub modified_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostRequest {
    pub content: String,
}
