//! 用户端聊天
//!
//! 启动流程：读取（或生成）本地会话 ID → 加载历史记录 → 查询默认区号 →
//! 连接 `/user/{id}` 通道 → 发送 `client_info`。

use crate::chat::api::ChatApi;
use crate::chat::channel::{ChannelOptions, ChatChannel};
use crate::chat::config::ClientConfig;
use crate::chat::frame::OutboundFrame;
use crate::chat::geo::lookup_calling_code;
use crate::chat::listener::ChatListener;
use crate::chat::session::SessionStore;
use crate::chat::types::{ChatMessage, ChatRole};
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// 启动参数
#[derive(Debug, Clone, Default)]
pub struct UserChatOptions {
    /// 用户填写的昵称
    pub user_name: Option<String>,
    /// 是否查询地理位置以预选区号
    pub lookup_geo: bool,
}

/// 用户端会话
pub struct UserChat {
    session_id: String,
    country_code: Option<String>,
    channel: ChatChannel,
}

impl UserChat {
    /// 建立用户端会话
    ///
    /// 历史记录与地理位置查询失败只记录日志，不影响连接。
    pub async fn start(
        config: &ClientConfig,
        sessions: &SessionStore,
        options: UserChatOptions,
        listener: Arc<dyn ChatListener>,
    ) -> Result<Self> {
        let session_id = sessions.load_or_create_session_id().await?;
        info!("[UserChat] 🚀 启动用户会话 (session={})", session_id);

        let api = ChatApi::new(config)?;
        let history = match api.get_chat_history(&session_id).await {
            Ok(history) => history,
            Err(e) => {
                warn!("[UserChat] ⚠️ 加载历史记录失败，使用空记录: {:#}", e);
                Vec::new()
            }
        };

        let country_code = if options.lookup_geo {
            match lookup_calling_code(api.http_client(), &config.geo_url).await {
                Ok(code) => code,
                Err(e) => {
                    warn!("[UserChat] ⚠️ 地理位置查询失败: {:#}", e);
                    None
                }
            }
        } else {
            None
        };

        let channel = ChatChannel::connect(
            &config.user_channel_url(&session_id),
            ChannelOptions {
                session_id: session_id.clone(),
                local_role: ChatRole::User,
                history,
                typing_timeout: config.typing_timeout,
            },
            listener,
        )
        .await?;

        if country_code.is_some() || options.user_name.is_some() {
            let frame = OutboundFrame::ClientInfo {
                country_code: country_code.clone(),
                user_name: options.user_name.clone(),
            };
            if let Err(e) = channel.send_frame(&frame).await {
                warn!("[UserChat] ⚠️ 发送 client_info 失败: {:#}", e);
            }
        }

        Ok(Self {
            session_id,
            country_code,
            channel,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// 默认区号（不带 `+`）
    pub fn country_code(&self) -> Option<&str> {
        self.country_code.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// 以用户身份发送消息，空白内容忽略
    pub async fn send(&self, text: &str) -> Result<Option<ChatMessage>> {
        self.channel.send_message(text).await
    }

    pub async fn input_changed(&self, text: &str) -> Result<()> {
        self.channel.input_changed(text).await
    }

    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.channel.transcript()
    }

    pub fn typing(&self) -> Vec<ChatRole> {
        self.channel.typing()
    }

    pub async fn close(self) -> Result<()> {
        self.channel.close().await
    }
}
