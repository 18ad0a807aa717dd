use crate::chat::serialization::{
    deserialize_flexible_datetime, deserialize_null_default, deserialize_opt_string_lossy,
};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, error, warn};

/// 消息发送方角色
///
/// 线上未知的角色值统一视为 `Agent`（人工客服）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ChatRole {
    User,
    Assistant,
    Agent,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Agent => "agent",
        }
    }
}

impl From<&str> for ChatRole {
    fn from(s: &str) -> Self {
        match s {
            "user" => ChatRole::User,
            "assistant" => ChatRole::Assistant,
            _ => ChatRole::Agent,
        }
    }
}

impl From<String> for ChatRole {
    fn from(s: String) -> Self {
        ChatRole::from(s.as_str())
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条聊天消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub content: String,
    /// 历史记录中可能缺失
    #[serde(default, deserialize_with = "deserialize_flexible_datetime")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// 以当前时间创建消息
    pub fn now(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Some(Utc::now()),
        }
    }

    /// 本地时间 `HH:MM`，无时间戳时为空
    pub fn display_time(&self) -> String {
        self.timestamp
            .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
            .unwrap_or_default()
    }
}

/// 将服务端原始历史记录转换为聊天消息
///
/// `type == "client_info"` 的条目是客户端元数据，不属于聊天内容，直接过滤；
/// 无法解析的条目记录日志后跳过。
pub fn chat_history_from_values(values: Vec<Value>) -> Vec<ChatMessage> {
    values
        .into_iter()
        .filter(|v| v.get("type").and_then(|t| t.as_str()) != Some("client_info"))
        .filter_map(|v| match serde_json::from_value::<ChatMessage>(v.clone()) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("[Types] 跳过无法解析的历史消息: {}, 原始数据: {}", e, v);
                None
            }
        })
        .collect()
}

/// 在线用户摘要（管理员在线列表推送的单个条目）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveUserSummary {
    pub session_id: String,
    #[serde(
        default,
        deserialize_with = "deserialize_opt_string_lossy",
        skip_serializing_if = "Option::is_none"
    )]
    pub country_code: Option<String>,
}

/// 用户记录（目录接口返回）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawUserRecord")]
pub struct UserRecord {
    pub session_id: String,
    pub user_name: String,
    pub country_code: String,
    pub is_ai: bool,
    pub chat_history: Vec<ChatMessage>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// 服务端原始用户记录，字段可能为 null 或缺失
#[derive(Deserialize)]
struct RawUserRecord {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    session_id: String,
    #[serde(default, deserialize_with = "deserialize_opt_string_lossy")]
    user_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string_lossy")]
    country_code: Option<String>,
    #[serde(default)]
    is_ai: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    chat_history: Vec<Value>,
    #[serde(default, deserialize_with = "deserialize_flexible_datetime")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_flexible_datetime")]
    updated_at: Option<DateTime<Utc>>,
}

impl From<RawUserRecord> for UserRecord {
    fn from(raw: RawUserRecord) -> Self {
        Self {
            session_id: raw.session_id,
            user_name: raw.user_name.unwrap_or_else(|| "Unknown".to_string()),
            country_code: raw.country_code.unwrap_or_else(|| "unknown".to_string()),
            is_ai: raw.is_ai.unwrap_or(true),
            chat_history: chat_history_from_values(raw.chat_history),
            created_at: raw.created_at,
            updated_at: raw.updated_at,
        }
    }
}

impl UserRecord {
    /// 会话详情面板展示的摘要
    pub fn info(&self) -> UserInfo {
        UserInfo {
            session_id: self.session_id.clone(),
            country_code: self.country_code.clone(),
            is_ai: self.is_ai,
            user_name: self.user_name.clone(),
            chat_history_length: self.chat_history.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// 选中会话的用户详情
#[derive(Debug, Clone, PartialEq)]
pub struct UserInfo {
    pub session_id: String,
    pub country_code: String,
    pub is_ai: bool,
    pub user_name: String,
    pub chat_history_length: usize,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserInfo {
    /// 头部副标题：有区号时显示区号，否则显示 "Active now"
    pub fn subtitle(&self) -> String {
        if self.country_code.is_empty() || self.country_code == "unknown" {
            "Active now".to_string()
        } else {
            format!("Country: +{}", self.country_code)
        }
    }
}

/// 历史记录接口响应
#[derive(Debug, Deserialize)]
pub struct ChatHistoryResp {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub chat_history: Vec<Value>,
}

/// 用户列表接口响应：裸数组或 `{"users": [...]}`
///
/// 条目先按原始 JSON 接收，单条记录解析失败不影响其他记录。
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UsersResp {
    List(Vec<Value>),
    Wrapped { users: Vec<Value> },
    Other(Value),
}

impl UsersResp {
    pub fn into_users(self) -> Vec<UserRecord> {
        match self {
            UsersResp::List(users) | UsersResp::Wrapped { users } => users_from_values(users),
            UsersResp::Other(v) => {
                warn!("[Types] 用户列表响应格式未知，按空列表处理: {}", v);
                Vec::new()
            }
        }
    }
}

/// 逐条解析用户记录，无法解析的条目记录日志后跳过
pub fn users_from_values(values: Vec<Value>) -> Vec<UserRecord> {
    values
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<UserRecord>(v.clone()) {
            Ok(u) => Some(u),
            Err(e) => {
                warn!("[Types] 跳过无法解析的用户记录: {}, 原始数据: {}", e, v);
                None
            }
        })
        .collect()
}

/// AI 模式切换响应
#[derive(Debug, Deserialize)]
pub struct ToggleResp {
    pub is_ai: bool,
}

/// 通用 HTTP 响应处理函数：检查状态码并反序列化 JSON
///
/// 所有 API 都可以共用此方法
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<T> {
    use anyhow::Context;

    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response.bytes().await.context("读取响应 body 失败")?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, body_str));
    }
    debug!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);

    serde_json::from_slice::<T>(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        anyhow::anyhow!("反序列化响应失败: {:?}", e)
    })
}
