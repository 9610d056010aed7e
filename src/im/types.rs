//! 网关统一响应结构与 HTTP 响应处理
//!
//! 所有 REST 接口都经过 API 网关，返回 `{ code, message, result }` 包装，
//! `code == 1000` 表示成功。

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

/// 网关成功码
pub const SUCCESS_CODE: i32 = 1000;

/// 未认证错误码（identity-service 的 UNAUTHENTICATED）
pub const UNAUTHENTICATED_CODE: i32 = 1006;

/// 统一的 API 响应包装结构体
/// result 字段可能为 null 或缺失，因此使用 Option<T>
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default = "default_code")]
    pub code: i32,
    #[serde(default)]
    pub message: Option<String>,
    pub result: Option<T>,
}

fn default_code() -> i32 {
    SUCCESS_CODE
}

/// 分页响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct PageResponse<T> {
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default = "Vec::new", deserialize_with = "crate::im::serialization::deserialize_vec_or_null")]
    pub data: Vec<T>,
}

/// HTTP / 网关错误
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP 错误 {status}: {message}")]
    Http {
        status: u16,
        code: Option<i32>,
        message: String,
    },
    #[error("服务器错误 {code}: {message}")]
    Server { code: i32, message: String },
    #[error("{0} 响应中缺少 result 字段")]
    MissingResult(String),
    #[error("{operation} 反序列化响应失败: {source}")]
    Decode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// 是否为未认证（token 失效或缺失）
    pub fn is_unauthenticated(&self) -> bool {
        match self {
            ApiError::Http { status, code, .. } => {
                *status == 401 || *code == Some(UNAUTHENTICATED_CODE)
            }
            ApiError::Server { code, .. } => *code == UNAUTHENTICATED_CODE,
            _ => false,
        }
    }
}

/// 判断任意 anyhow 错误链中是否包含未认证错误
pub fn is_unauthenticated(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|e| e.downcast_ref::<ApiError>())
        .any(ApiError::is_unauthenticated)
}

/// 通用 HTTP 响应处理函数：读取 body，校验 HTTP 状态和网关 code，返回 result
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<T> {
    use anyhow::Context;

    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response.bytes().await.context("读取响应 body 失败")?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {} 响应 Body: {}", operation_name, body_str);

    Ok(parse_api_body(status.as_u16(), &body_bytes, operation_name)?)
}

/// 解析网关响应 body（与网络解耦，便于测试）
pub fn parse_api_body<T: serde::de::DeserializeOwned>(
    status: u16,
    body: &[u8],
    operation_name: &str,
) -> Result<T, ApiError> {
    if !(200..300).contains(&status) {
        // 错误响应通常也是网关包装格式，尽量取出 code 和 message
        let envelope = serde_json::from_slice::<ApiResponse<serde_json::Value>>(body).ok();
        let (code, message) = match envelope {
            Some(env) => (
                Some(env.code),
                env.message
                    .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned()),
            ),
            None => (None, String::from_utf8_lossy(body).into_owned()),
        };
        error!(
            "[HTTP] {} 请求失败，HTTP状态: {}, code: {:?}, 信息: {}",
            operation_name, status, code, message
        );
        return Err(ApiError::Http {
            status,
            code,
            message,
        });
    }

    let api_resp: ApiResponse<T> = serde_json::from_slice(body).map_err(|e| {
        error!(
            "[HTTP] {} 反序列化失败: {:?}\n原始响应: {}",
            operation_name,
            e,
            String::from_utf8_lossy(body)
        );
        ApiError::Decode {
            operation: operation_name.to_string(),
            source: e,
        }
    })?;

    if api_resp.code != SUCCESS_CODE {
        let message = api_resp.message.unwrap_or_default();
        error!(
            "[HTTP] {} 服务器错误，错误码: {}, 错误信息: {}",
            operation_name, api_resp.code, message
        );
        return Err(ApiError::Server {
            code: api_resp.code,
            message,
        });
    }

    info!("[HTTP] ✅ {} 请求成功", operation_name);
    api_resp
        .result
        .ok_or_else(|| ApiError::MissingResult(operation_name.to_string()))
}

/// 创建 HTTP 客户端，存在 token 时通过 default_headers 自动带上 Bearer 认证头
pub fn build_http_client(
    token: Option<&str>,
    timeout: std::time::Duration,
) -> anyhow::Result<reqwest::Client> {
    use anyhow::Context;

    let mut headers = reqwest::header::HeaderMap::new();
    if let Some(token) = token {
        let mut value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
            .context("无效的 token")?;
        value.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, value);
    }

    reqwest::ClientBuilder::new()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .context("创建 HTTP 客户端失败")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: String,
    }

    #[test]
    fn parses_successful_envelope() {
        let body = br#"{"code":1000,"result":{"id":"abc"}}"#;
        let item: Item = parse_api_body(200, body, "test").unwrap();
        assert_eq!(item, Item { id: "abc".into() });
    }

    #[test]
    fn missing_code_defaults_to_success() {
        let body = br#"{"result":[{"id":"a"},{"id":"b"}]}"#;
        let items: Vec<Item> = parse_api_body(200, body, "test").unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn non_success_code_is_server_error() {
        let body = br#"{"code":1002,"message":"User existed"}"#;
        let err = parse_api_body::<Item>(200, body, "test").unwrap_err();
        match err {
            ApiError::Server { code, message } => {
                assert_eq!(code, 1002);
                assert_eq!(message, "User existed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn http_401_is_unauthenticated() {
        let body = br#"{"code":1006,"message":"Unauthenticated"}"#;
        let err = parse_api_body::<Item>(401, body, "test").unwrap_err();
        assert!(err.is_unauthenticated());
        assert!(is_unauthenticated(&anyhow::Error::new(err).context("加载资料失败")));
    }

    #[test]
    fn http_error_with_plain_body_keeps_text() {
        let err = parse_api_body::<Item>(502, b"Bad Gateway", "test").unwrap_err();
        match &err {
            ApiError::Http {
                status,
                code,
                message,
            } => {
                assert_eq!(*status, 502);
                assert_eq!(*code, None);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!err.is_unauthenticated());
    }

    #[test]
    fn null_result_is_missing_result() {
        let body = br#"{"code":1000,"result":null}"#;
        let err = parse_api_body::<Item>(200, body, "获取资料").unwrap_err();
        assert!(matches!(err, ApiError::MissingResult(op) if op == "获取资料"));
    }

    #[test]
    fn page_response_decodes_generic_items() {
        let body = br#"{"code":1000,"result":{"currentPage":2,"totalPages":3,"pageSize":10,"totalElements":21,"data":[{"id":"p1"},{"id":"p2"}]}}"#;
        let page: PageResponse<Item> = parse_api_body(200, body, "test").unwrap();
        assert_eq!(page.current_page, 2);
        assert_eq!(page.data, vec![Item { id: "p1".into() }, Item { id: "p2".into() }]);
    }

    #[test]
    fn page_response_tolerates_null_data() {
        let body = br#"{"code":1000,"result":{"currentPage":1,"totalPages":0,"pageSize":10,"totalElements":0,"data":null}}"#;
        let page: PageResponse<Item> = parse_api_body(200, body, "test").unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.page_size, 10);
    }
}
