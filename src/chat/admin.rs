//! 管理后台
//!
//! 首页概览、在线用户（在线列表 + 单会话实时聊天 + AI/人工切换）、全部用户目录。
//! 同一时间只打开一个坐席会话通道，切换会话时先关闭旧通道再连接新通道。

use crate::chat::ai_mode::{AiModeBackend, AiModeToggle};
use crate::chat::api::ChatApi;
use crate::chat::channel::{ChannelOptions, ChatChannel};
use crate::chat::config::ClientConfig;
use crate::chat::listener::{ChatListener, PresenceListener};
use crate::chat::presence::{PresenceMonitor, PresenceStore};
use crate::chat::types::{ChatMessage, ChatRole, UserInfo, UserRecord};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// 首页概览
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminOverview {
    pub active_users: usize,
    pub total_users: usize,
}

/// 当前选中的会话
struct Conversation {
    channel: ChatChannel,
    info: Option<UserInfo>,
    ai_mode: AiModeToggle,
}

/// 管理后台
pub struct AdminConsole {
    config: ClientConfig,
    api: ChatApi,
    presence: Arc<PresenceStore>,
    monitor: Option<PresenceMonitor>,
    conversation: Option<Conversation>,
    chat_listener: Arc<dyn ChatListener>,
}

impl AdminConsole {
    pub fn new(config: ClientConfig, chat_listener: Arc<dyn ChatListener>) -> Result<Self> {
        let api = ChatApi::new(&config)?;
        Ok(Self {
            config,
            api,
            presence: Arc::new(PresenceStore::new()),
            monitor: None,
            conversation: None,
            chat_listener,
        })
    }

    /// 在线列表状态源
    pub fn presence(&self) -> Arc<PresenceStore> {
        self.presence.clone()
    }

    /// 连接管理员通道，重复调用会先关闭旧连接
    pub async fn start_presence(&mut self, listener: Arc<dyn PresenceListener>) -> Result<()> {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop().await;
        }
        let monitor = PresenceMonitor::start(
            &self.config.admin_channel_url(),
            self.presence.clone(),
            listener,
        )
        .await?;
        self.monitor = Some(monitor);
        Ok(())
    }

    /// 选中一个会话
    ///
    /// 先关闭上一个会话通道，再拉取用户记录（失败时使用空记录），最后连接新通道。
    pub async fn select_conversation(&mut self, session_id: &str) -> Result<()> {
        if let Some(previous) = self.conversation.take() {
            info!(
                "[Admin] 🔁 切换会话: {} -> {}",
                previous.channel.session_id(),
                session_id
            );
            if let Err(e) = previous.channel.close().await {
                warn!("[Admin] ⚠️ 关闭旧会话通道失败: {:#}", e);
            }
        }

        let (history, user_info, is_ai) = match self.api.get_user(session_id).await {
            Ok(record) => {
                let info = record.info();
                (record.chat_history, Some(info), record.is_ai)
            }
            Err(e) => {
                warn!(
                    "[Admin] ⚠️ 获取用户记录失败 (session={})，使用空记录: {:#}",
                    session_id, e
                );
                (Vec::new(), None, true)
            }
        };

        let channel = ChatChannel::connect(
            &self.config.agent_channel_url(session_id),
            ChannelOptions {
                session_id: session_id.to_string(),
                local_role: ChatRole::Agent,
                history,
                typing_timeout: self.config.typing_timeout,
            },
            self.chat_listener.clone(),
        )
        .await?;

        let backend: Arc<dyn AiModeBackend> = Arc::new(self.api.clone());
        self.conversation = Some(Conversation {
            channel,
            info: user_info,
            ai_mode: AiModeToggle::new(session_id, is_ai, backend),
        });
        info!("[Admin] ✅ 已选中会话 (session={})", session_id);
        Ok(())
    }

    /// 当前选中的会话 ID
    pub fn selected(&self) -> Option<&str> {
        self.conversation.as_ref().map(|c| c.channel.session_id())
    }

    /// 选中会话的用户信息，`is_ai` 取当前展示的模式
    pub fn selected_info(&self) -> Option<UserInfo> {
        let conv = self.conversation.as_ref()?;
        let mut info = conv.info.clone()?;
        info.is_ai = conv.ai_mode.is_ai();
        Some(info)
    }

    pub fn ai_mode(&self) -> Option<&AiModeToggle> {
        self.conversation.as_ref().map(|c| &c.ai_mode)
    }

    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.conversation
            .as_ref()
            .map(|c| c.channel.transcript())
            .unwrap_or_default()
    }

    pub fn typing(&self) -> Vec<ChatRole> {
        self.conversation
            .as_ref()
            .map(|c| c.channel.typing())
            .unwrap_or_default()
    }

    fn current(&self) -> Result<&Conversation> {
        self.conversation.as_ref().context("尚未选中会话")
    }

    /// 以坐席身份发送消息，空白内容忽略
    pub async fn send_message(&self, text: &str) -> Result<Option<ChatMessage>> {
        self.current()?.channel.send_message(text).await
    }

    pub async fn input_changed(&self, text: &str) -> Result<()> {
        self.current()?.channel.input_changed(text).await
    }

    /// 切换当前会话的 AI 模式，返回最终状态
    pub async fn toggle_ai(&self) -> Result<bool> {
        self.current()?.ai_mode.toggle().await
    }

    /// 全部用户
    pub async fn all_users(&self) -> Result<Vec<UserRecord>> {
        self.api.list_users().await
    }

    pub async fn user_detail(&self, session_id: &str) -> Result<UserRecord> {
        self.api.get_user(session_id).await
    }

    /// 首页概览：在线人数来自在线列表，总人数来自用户目录
    pub async fn overview(&self) -> Result<AdminOverview> {
        let total_users = self.api.list_users().await?.len();
        Ok(AdminOverview {
            active_users: self.presence.active_count(),
            total_users,
        })
    }

    /// 关闭会话通道与管理员通道
    pub async fn shutdown(mut self) {
        if let Some(conv) = self.conversation.take() {
            if let Err(e) = conv.channel.close().await {
                warn!("[Admin] ⚠️ 关闭会话通道失败: {:#}", e);
            }
        }
        if let Some(monitor) = self.monitor.take() {
            monitor.stop().await;
        }
        info!("[Admin] 👋 管理后台已关闭");
    }
}
