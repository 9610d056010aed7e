//! 用户资料 HTTP API 客户端

use crate::im::profile::types::{SearchUserRequest, UpdateProfileRequest, UserProfile};
use crate::im::types::handle_http_response;
use anyhow::{Context, Result};
use tracing::{debug, info};

pub const MY_PROFILE_PATH: &str = "/profile/users/my-profile";
pub const AVATAR_PATH: &str = "/profile/users/avatar";
pub const SEARCH_USER_PATH: &str = "/profile/users/search";

/// 用户资料相关的 HTTP API 客户端
///
/// `client` 应该已经通过 default_headers 配置好 Bearer 认证
pub struct ProfileApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl ProfileApi {
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url,
        }
    }

    /// 获取当前用户资料
    pub async fn get_my_profile(&self) -> Result<UserProfile> {
        let url = format!("{}{}", self.api_base_url, MY_PROFILE_PATH);
        info!("[ProfileAPI] 📡 请求当前用户资料");
        debug!("[ProfileAPI]   请求URL: {}", url);

        let response = self.client.get(&url).send().await.context("请求失败")?;
        handle_http_response::<UserProfile>(response, "获取用户资料").await
    }

    /// 更新当前用户资料
    pub async fn update_my_profile(&self, request: &UpdateProfileRequest) -> Result<UserProfile> {
        let url = format!("{}{}", self.api_base_url, MY_PROFILE_PATH);
        info!("[ProfileAPI] 📡 更新用户资料");
        debug!("[ProfileAPI]   请求URL: {}, 内容: {:?}", url, request);

        let response = self
            .client
            .put(&url)
            .json(request)
            .send()
            .await
            .context("请求失败")?;
        handle_http_response::<UserProfile>(response, "更新用户资料").await
    }

    /// 上传头像（multipart 字段名为 file）
    pub async fn update_avatar(&self, file_name: &str, bytes: Vec<u8>) -> Result<UserProfile> {
        let url = format!("{}{}", self.api_base_url, AVATAR_PATH);
        info!(
            "[ProfileAPI] 📡 上传头像: {} ({} 字节)",
            file_name,
            bytes.len()
        );

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .put(&url)
            .multipart(form)
            .send()
            .await
            .context("请求失败")?;
        handle_http_response::<UserProfile>(response, "上传头像").await
    }

    /// 按关键字搜索用户；关键字为空时不发请求
    pub async fn search_users(&self, keyword: &str) -> Result<Vec<UserProfile>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}{}", self.api_base_url, SEARCH_USER_PATH);
        info!("[ProfileAPI] 📡 搜索用户: {}", keyword);

        let response = self
            .client
            .post(&url)
            .json(&SearchUserRequest {
                keyword: keyword.to_string(),
            })
            .send()
            .await
            .context("请求失败")?;
        let users = handle_http_response::<Vec<UserProfile>>(response, "搜索用户").await?;
        info!("[ProfileAPI] ✅ 搜索到 {} 个用户", users.len());
        Ok(users)
    }
}
