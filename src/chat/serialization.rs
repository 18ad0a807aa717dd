use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// 宽松的时间反序列化函数（支持 null 值）
///
/// 服务端时间字段有多种形态：
/// - ISO 字符串（带或不带时区，不带时区按 UTC 处理）
/// - 毫秒时间戳
/// - Mongo 扩展 JSON：`{"$date": "..."}`、`{"$date": 1700000000000}`、
///   `{"$date": {"$numberLong": "1700000000000"}}`
///
/// 无法识别时返回 `None`，不会让整条记录反序列化失败。
pub fn deserialize_flexible_datetime<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Value> = Deserialize::deserialize(deserializer)?;
    Ok(opt.as_ref().and_then(parse_datetime_value))
}

/// null 或缺失时使用默认值
pub fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let opt: Option<T> = Deserialize::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// 字符串或数字统一转为字符串（例如国家区号 `91` 与 `"91"`），空值为 `None`
pub fn deserialize_opt_string_lossy<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Value> = Deserialize::deserialize(deserializer)?;
    Ok(match opt {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// 解析单个时间值
pub fn parse_datetime_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_datetime_str(s),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::Object(obj) => {
            if let Some(inner) = obj.get("$date") {
                return parse_datetime_value(inner);
            }
            obj.get("$numberLong")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<i64>().ok())
                .and_then(DateTime::from_timestamp_millis)
        }
        _ => None,
    }
}

fn parse_datetime_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Python 的 isoformat() 默认不带时区
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// 生成新的会话 ID
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
