//! 聊天后台 HTTP API 客户端
//!
//! 负责历史记录、用户目录、单用户记录和 AI 模式切换请求

use crate::chat::config::ClientConfig;
use crate::chat::types::{
    chat_history_from_values, handle_http_response, ChatHistoryResp, ChatMessage, ToggleResp,
    UserRecord, UsersResp,
};
use anyhow::{Context, Result};
use reqwest::StatusCode;
use tracing::{debug, info};

/// 聊天后台 HTTP API 客户端
#[derive(Clone)]
pub struct ChatApi {
    client: reqwest::Client,
    api_base: String,
}

impl ChatApi {
    /// 按配置创建客户端（带请求超时）
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .timeout(config.request_timeout)
            .build()
            .context("创建 HTTP 客户端失败")?;
        Ok(Self::with_client(client, config.api_base.clone()))
    }

    /// 使用外部配置好的 HTTP 客户端
    pub fn with_client(client: reqwest::Client, api_base: String) -> Self {
        Self { client, api_base }
    }

    /// 共享的 HTTP 客户端（地理位置查询复用同一个超时配置）
    pub fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    /// 获取会话历史记录，会话不存在（404）时返回空列表
    pub async fn get_chat_history(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let url = format!("{}/chat_history/{}", self.api_base, session_id);
        info!("[ChatAPI] 📡 请求历史记录 (session={})", session_id);
        debug!("[ChatAPI]   请求URL: {}", url);

        let response = self.client.get(&url).send().await.context("请求失败")?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("[ChatAPI] 会话暂无历史记录 (session={})", session_id);
            return Ok(Vec::new());
        }
        let resp: ChatHistoryResp = handle_http_response(response, "历史记录").await?;
        let history = chat_history_from_values(resp.chat_history);
        info!(
            "[ChatAPI] ✅ 历史记录加载完成 (session={}), 共 {} 条",
            session_id,
            history.len()
        );
        Ok(history)
    }

    /// 获取全部用户（不分页）
    pub async fn list_users(&self) -> Result<Vec<UserRecord>> {
        let url = format!("{}/users", self.api_base);
        info!("[ChatAPI] 📡 请求用户目录");
        debug!("[ChatAPI]   请求URL: {}", url);

        let response = self.client.get(&url).send().await.context("请求失败")?;
        let resp: UsersResp = handle_http_response(response, "用户目录").await?;
        let users = resp.into_users();
        info!("[ChatAPI] ✅ 用户目录加载完成，共 {} 个用户", users.len());
        Ok(users)
    }

    /// 获取单个用户记录
    pub async fn get_user(&self, session_id: &str) -> Result<UserRecord> {
        let url = format!("{}/users/{}", self.api_base, session_id);
        info!("[ChatAPI] 📡 请求用户详情 (session={})", session_id);
        debug!("[ChatAPI]   请求URL: {}", url);

        let response = self.client.get(&url).send().await.context("请求失败")?;
        handle_http_response(response, "用户详情").await
    }

    /// 切换 AI 模式，返回服务端确认后的 `is_ai`
    pub async fn toggle_ai(&self, session_id: &str) -> Result<bool> {
        let url = format!("{}/toggle/{}", self.api_base, session_id);
        info!("[ChatAPI] 📡 请求切换 AI 模式 (session={})", session_id);
        debug!("[ChatAPI]   请求URL: {}", url);

        let response = self.client.post(&url).send().await.context("请求失败")?;
        let resp: ToggleResp = handle_http_response(response, "切换AI模式").await?;
        info!(
            "[ChatAPI] ✅ AI 模式已切换 (session={}), is_ai={}",
            session_id, resp.is_ai
        );
        Ok(resp.is_ai)
    }
}
