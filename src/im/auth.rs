//! 认证：登录、登出与内存中的会话 token

use crate::im::serialization::{decode_base64_url, deserialize_opt_instant};
use crate::im::types::handle_http_response;
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

pub const LOGIN_PATH: &str = "/identity/auth/token";

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    pub token: String,
    #[serde(default, deserialize_with = "deserialize_opt_instant")]
    pub expiry_time: Option<DateTime<Utc>>,
}

/// 登录接口（无需认证头）
pub struct AuthApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl AuthApi {
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url,
        }
    }

    pub async fn log_in(&self, username: &str, password: &str) -> Result<AuthenticationResponse> {
        let url = format!("{}{}", self.api_base_url, LOGIN_PATH);

        info!("[Auth] 🔐 正在登录...");
        debug!("[Auth]   URL: {}, 用户名: {}", url, username);

        let response = self
            .client
            .post(&url)
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await
            .context("登录请求失败")?;

        let auth = handle_http_response::<AuthenticationResponse>(response, "登录").await?;
        info!("[Auth] ✅ 登录成功，过期时间: {:?}", auth.expiry_time);
        Ok(auth)
    }
}

/// JWT 载荷中关心的字段（只解码，不校验签名）
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// 用户 ID
    pub sub: String,
    #[serde(default)]
    pub scope: String,
    /// 过期时间（秒）
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub jti: Option<String>,
}

impl TokenClaims {
    /// 解码 token 的 payload 段
    pub fn peek(token: &str) -> Result<Self> {
        let mut parts = token.split('.');
        let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(anyhow::anyhow!("token 不是合法的 JWT 格式")),
        };
        let bytes = decode_base64_url(payload).context("token payload base64 解码失败")?;
        serde_json::from_slice(&bytes).context("token payload 解析失败")
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| at <= now)
    }
}

/// 内存中的登录会话，可在多个任务间共享
#[derive(Clone, Default)]
pub struct Session {
    inner: Arc<RwLock<Option<String>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_token(&self, token: String) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = Some(token);
        }
    }

    /// 登出：丢弃 token
    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = None;
        }
    }

    pub fn token(&self) -> Option<String> {
        self.inner.read().ok().and_then(|guard| guard.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn claims(&self) -> Option<TokenClaims> {
        self.token().and_then(|t| TokenClaims::peek(&t).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn make_token(payload: &str) -> String {
        let enc = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        format!(
            "{}.{}.{}",
            enc.encode(r#"{"alg":"HS512"}"#),
            enc.encode(payload),
            "sig"
        )
    }

    #[test]
    fn peeks_subject_and_expiry() {
        let token = make_token(r#"{"sub":"u-1","scope":"ROLE_USER","exp":1714557600}"#);
        let claims = TokenClaims::peek(&token).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.scope, "ROLE_USER");
        let exp = claims.expires_at().unwrap();
        assert!(claims.is_expired_at(exp));
        assert!(!claims.is_expired_at(exp - chrono::Duration::seconds(1)));
    }

    #[test]
    fn rejects_malformed_token() {
        assert!(TokenClaims::peek("not-a-jwt").is_err());
        assert!(TokenClaims::peek("a.b.c.d").is_err());
        assert!(TokenClaims::peek("a.!!!.c").is_err());
    }

    #[test]
    fn session_login_and_logout() {
        let session = Session::new();
        assert!(!session.is_authenticated());

        let shared = session.clone();
        shared.set_token(make_token(r#"{"sub":"u-2"}"#));
        assert!(session.is_authenticated());
        assert_eq!(session.claims().map(|c| c.sub), Some("u-2".to_string()));

        session.clear();
        assert!(!shared.is_authenticated());
        assert!(shared.claims().is_none());
    }

    #[test]
    fn authentication_response_accepts_iso_expiry() {
        let resp: AuthenticationResponse = serde_json::from_str(
            r#"{"token":"t","expiryTime":"2024-05-01T10:00:00.000+00:00"}"#,
        )
        .unwrap();
        assert_eq!(resp.token, "t");
        assert_eq!(resp.expiry_time.map(|d| d.timestamp()), Some(1_714_557_600));
    }
}
