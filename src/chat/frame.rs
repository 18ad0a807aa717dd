//! 实时通道帧编解码
//!
//! 入站帧是带 `type` 字段的 JSON 信封（`message`、`typing`、`active_users`、
//! `client_info`）；任何无法识别的帧都按纯文本 assistant 消息处理，保证
//! 每个畸形帧恰好产生一条记录。出站统一使用结构化 JSON 信封。

use crate::chat::serialization::{
    deserialize_flexible_datetime, deserialize_null_default, deserialize_opt_string_lossy,
};
use crate::chat::types::{ActiveUserSummary, ChatMessage, ChatRole};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 解码后的入站帧
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// 聊天消息
    Message(ChatMessage),
    /// 输入提示
    Typing { role: ChatRole, is_typing: bool },
    /// 在线用户全量快照
    ActiveUsers(Vec<ActiveUserSummary>),
    /// 客户端元数据（区号、昵称）
    ClientInfo {
        country_code: Option<String>,
        user_name: Option<String>,
    },
    /// 无法识别的帧，原文作为 assistant 消息
    Fallback(ChatMessage),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Envelope {
    Message {
        from: ChatRole,
        content: String,
        #[serde(default, deserialize_with = "deserialize_flexible_datetime")]
        timestamp: Option<DateTime<Utc>>,
    },
    Typing {
        #[serde(default = "default_typing_role")]
        from: ChatRole,
        #[serde(default, deserialize_with = "deserialize_null_default")]
        is_typing: bool,
    },
    ActiveUsers {
        #[serde(default, deserialize_with = "deserialize_null_default")]
        data: Vec<ActiveUserSummary>,
    },
    ClientInfo {
        #[serde(default, deserialize_with = "deserialize_opt_string_lossy")]
        country_code: Option<String>,
        #[serde(default, deserialize_with = "deserialize_opt_string_lossy")]
        user_name: Option<String>,
    },
}

fn default_typing_role() -> ChatRole {
    ChatRole::Agent
}

/// 解码一个文本帧，永不失败
pub fn decode_inbound(text: &str) -> InboundFrame {
    match serde_json::from_str::<Envelope>(text) {
        Ok(Envelope::Message {
            from,
            content,
            timestamp,
        }) => InboundFrame::Message(ChatMessage {
            role: from,
            content,
            timestamp: Some(timestamp.unwrap_or_else(Utc::now)),
        }),
        Ok(Envelope::Typing { from, is_typing }) => InboundFrame::Typing {
            role: from,
            is_typing,
        },
        Ok(Envelope::ActiveUsers { data }) => InboundFrame::ActiveUsers(data),
        Ok(Envelope::ClientInfo {
            country_code,
            user_name,
        }) => InboundFrame::ClientInfo {
            country_code,
            user_name,
        },
        Err(e) => {
            debug!("[Frame] 非结构化帧，按纯文本处理: {}", e);
            InboundFrame::Fallback(ChatMessage::now(ChatRole::Assistant, text))
        }
    }
}

/// 解码二进制帧（按 UTF-8 宽松解码后当作文本帧）
pub fn decode_inbound_bytes(data: &[u8]) -> InboundFrame {
    decode_inbound(&String::from_utf8_lossy(data))
}

/// 出站帧
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Message {
        from: ChatRole,
        content: String,
    },
    Typing {
        from: ChatRole,
        is_typing: bool,
    },
    ClientInfo {
        #[serde(skip_serializing_if = "Option::is_none")]
        country_code: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
    },
}

impl OutboundFrame {
    pub fn message(from: ChatRole, content: impl Into<String>) -> Self {
        OutboundFrame::Message {
            from,
            content: content.into(),
        }
    }

    pub fn typing(from: ChatRole, is_typing: bool) -> Self {
        OutboundFrame::Typing { from, is_typing }
    }

    /// 编码为 JSON 文本
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).context("编码出站帧失败")
    }
}
