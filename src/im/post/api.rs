//! 帖子 HTTP API 客户端

use crate::im::post::types::{Post, PostRequest};
use crate::im::types::{handle_http_response, PageResponse};
use anyhow::{Context, Result};
use tracing::{debug, info};

pub const MY_POSTS_PATH: &str = "/post/my-posts";
pub const CREATE_POST_PATH: &str = "/post/create";

/// 默认分页大小
pub const DEFAULT_PAGE_SIZE: u32 = 10;

pub struct PostApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl PostApi {
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url,
        }
    }

    /// 分页获取我的帖子（页码从 1 开始）
    pub async fn get_my_posts(&self, page: u32, size: u32) -> Result<PageResponse<Post>> {
        let url = format!("{}{}", self.api_base_url, MY_POSTS_PATH);
        info!("[PostAPI] 📡 请求我的帖子，第 {} 页，每页 {}", page, size);
        debug!("[PostAPI]   请求URL: {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("page", page), ("size", size)])
            .send()
            .await
            .context("请求失败")?;
        let page_resp = handle_http_response::<PageResponse<Post>>(response, "我的帖子").await?;
        info!(
            "[PostAPI] ✅ 第 {}/{} 页，本页 {} 条",
            page_resp.current_page,
            page_resp.total_pages,
            page_resp.data.len()
        );
        Ok(page_resp)
    }

    /// 发帖；内容为空时直接拒绝
    pub async fn create_post(&self, content: &str) -> Result<Post> {
        if content.trim().is_empty() {
            return Err(anyhow::anyhow!("帖子内容不能为空"));
        }
        let url = format!("{}{}", self.api_base_url, CREATE_POST_PATH);
        info!("[PostAPI] 📡 发帖");

        let response = self
            .client
            .post(&url)
            .json(&PostRequest {
                content: content.to_string(),
            })
            .send()
            .await
            .context("请求失败")?;
        handle_http_response::<Post>(response, "发帖").await
    }
}
