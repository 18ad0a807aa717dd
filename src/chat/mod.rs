pub mod admin;
pub mod ai_mode;
pub mod api;
pub mod channel;
pub mod config;
pub mod db;
pub mod frame;
pub mod geo;
pub mod listener;
pub mod presence;
pub mod route;
pub mod serialization;
pub mod session;
pub mod transcript;
pub mod types;
pub mod user_chat;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出管理后台与用户端入口
pub use admin::{AdminConsole, AdminOverview};
pub use user_chat::{UserChat, UserChatOptions};

// 重新导出状态与回调相关类型
pub use ai_mode::{mode_label, AiModeBackend, AiModeToggle};
pub use listener::{ChatListener, EmptyChatListener, EmptyPresenceListener, PresenceListener};
pub use presence::{PresenceMonitor, PresenceState, PresenceStore, PresenceView};
