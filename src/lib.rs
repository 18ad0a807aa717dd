pub mod chat;

// 重新导出常用类型和函数，方便外部使用
pub use chat::{
    api::ChatApi,
    channel::{ChannelOptions, ChatChannel},
    config::ClientConfig,
    route::{AdminTab, Route},
    session::SessionStore,
    types::{ActiveUserSummary, ChatMessage, ChatRole, UserInfo, UserRecord},
    AdminConsole, UserChat, UserChatOptions,
};
