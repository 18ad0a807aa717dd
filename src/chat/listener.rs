//! 回调接口
//!
//! 调用方通过实现这些 trait 接收会话和在线列表事件，回调按到达顺序依次执行。

use crate::chat::types::{ActiveUserSummary, ChatMessage, ChatRole};
use async_trait::async_trait;

/// 会话通道监听器
#[async_trait]
pub trait ChatListener: Send + Sync {
    /// 收到新消息（包括无法解析、按纯文本处理的帧）
    async fn on_message(&self, session_id: &str, message: ChatMessage);

    /// 某个角色的输入状态变化（包括超时自动清除）
    async fn on_typing_changed(&self, session_id: &str, role: ChatRole, is_typing: bool);

    /// 连接状态变化
    ///
    /// 参数 `message` 是状态描述
    async fn on_connection_status_changed(&self, session_id: &str, connected: bool, message: String);
}

/// 空的会话监听器实现（默认实现）
pub struct EmptyChatListener;

#[async_trait]
impl ChatListener for EmptyChatListener {
    async fn on_message(&self, _session_id: &str, _message: ChatMessage) {}
    async fn on_typing_changed(&self, _session_id: &str, _role: ChatRole, _is_typing: bool) {}
    async fn on_connection_status_changed(
        &self,
        _session_id: &str,
        _connected: bool,
        _message: String,
    ) {
    }
}

/// 在线列表监听器
#[async_trait]
pub trait PresenceListener: Send + Sync {
    /// 收到在线用户全量快照
    async fn on_active_users_changed(&self, users: Vec<ActiveUserSummary>);

    /// 管理员通道连接状态变化
    async fn on_connection_status_changed(&self, connected: bool);
}

/// 空的在线列表监听器实现（默认实现）
pub struct EmptyPresenceListener;

#[async_trait]
impl PresenceListener for EmptyPresenceListener {
    async fn on_active_users_changed(&self, _users: Vec<ActiveUserSummary>) {}
    async fn on_connection_status_changed(&self, _connected: bool) {}
}
