use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

/// 反序列化数组字段，处理 null 值
pub fn deserialize_vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// 时间字段的原始形态：Jackson 可能输出 ISO 字符串，也可能输出数字时间戳
#[derive(Deserialize)]
#[serde(untagged)]
enum RawInstant {
    Text(String),
    Number(f64),
}

fn raw_to_instant<E: serde::de::Error>(raw: RawInstant) -> Result<DateTime<Utc>, E> {
    match raw {
        RawInstant::Text(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| E::custom(format!("无效的时间 {}: {}", s, e))),
        RawInstant::Number(n) => {
            // 大于 1e12 视为毫秒，否则视为带小数的秒（Jackson 的 Instant 默认格式）
            let millis = if n.abs() >= 1e12 { n } else { n * 1000.0 };
            Utc.timestamp_millis_opt(millis.round() as i64)
                .single()
                .ok_or_else(|| E::custom(format!("时间戳越界: {}", n)))
        }
    }
}

/// 宽松的时间反序列化（RFC3339 字符串 / 秒 / 毫秒）
pub fn deserialize_instant<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawInstant::deserialize(deserializer)?;
    raw_to_instant(raw)
}

/// 宽松的可选时间反序列化（支持 null 值）
pub fn deserialize_opt_instant<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawInstant>::deserialize(deserializer)? {
        Some(raw) => raw_to_instant(raw).map(Some),
        None => Ok(None),
    }
}

/// 解码 base64url（JWT 使用无填充的 URL 安全字母表）
pub fn decode_base64_url(segment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(segment.trim_end_matches('='))
}

/// 生成乐观发送使用的临时消息 ID
pub fn generate_temp_msg_id() -> String {
    format!("temp-{}", uuid::Uuid::new_v4())
}

/// 是否为客户端生成的临时消息 ID
pub fn is_temp_msg_id(id: &str) -> bool {
    id.starts_with("temp-")
}
