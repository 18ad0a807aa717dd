//! 客户端配置

use std::time::Duration;

/// 生产环境 WebSocket 地址
pub const DEFAULT_WS_BASE: &str = "wss://api.vultr3.qlink.in/ws";
/// 生产环境 REST 地址（`/api/web` 为唯一权威前缀）
pub const DEFAULT_API_BASE: &str = "https://api.vultr3.qlink.in/api/web";
/// 地理位置查询地址（返回 `country_calling_code`）
pub const DEFAULT_GEO_URL: &str = "https://ipapi.co/json/";
/// 本地 SQLite 数据库
pub const DEFAULT_DB_URL: &str = "sqlite://qlink_chat.db?mode=rwc";

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// WebSocket 基础地址，例如 `wss://host/ws`
    pub ws_base: String,
    /// HTTP API 基础地址
    pub api_base: String,
    /// 地理位置查询地址
    pub geo_url: String,
    /// 本地持久化数据库 URL
    ///
    /// 例如：`sqlite://qlink_chat.db?mode=rwc`
    pub db_url: String,
    /// 输入提示在未收到新帧时自动清除的时长
    pub typing_timeout: Duration,
    /// 单个 HTTP 请求的超时时长
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self {
            ws_base: DEFAULT_WS_BASE.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            geo_url: DEFAULT_GEO_URL.to_string(),
            db_url: DEFAULT_DB_URL.to_string(),
            typing_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// 指向同一主机的 REST 与 WebSocket 地址（测试和本地调试用）
    pub fn with_bases(ws_base: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            ws_base: trim_slash(ws_base.into()),
            api_base: trim_slash(api_base.into()),
            ..Self::new()
        }
    }

    /// 用户侧会话通道地址
    pub fn user_channel_url(&self, session_id: &str) -> String {
        format!("{}/user/{}", self.ws_base, session_id)
    }

    /// 客服侧会话通道地址
    pub fn agent_channel_url(&self, session_id: &str) -> String {
        format!("{}/agent/{}", self.ws_base, session_id)
    }

    /// 管理员在线列表通道地址
    pub fn admin_channel_url(&self) -> String {
        format!("{}/admin", self.ws_base)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_slash(mut s: String) -> String {
    while s.ends_with('/') {
        s.pop();
    }
    s
}
