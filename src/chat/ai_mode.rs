//! AI / 人工回复模式切换
//!
//! 切换时先乐观翻转本地状态，再以服务端返回值为准；请求失败则回滚到切换前的状态。

use crate::chat::api::ChatApi;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{error, info};

/// AI 模式切换的服务端接口
#[async_trait]
pub trait AiModeBackend: Send + Sync {
    /// 切换并返回服务端确认后的 `is_ai`
    async fn toggle_ai(&self, session_id: &str) -> Result<bool>;
}

#[async_trait]
impl AiModeBackend for ChatApi {
    async fn toggle_ai(&self, session_id: &str) -> Result<bool> {
        ChatApi::toggle_ai(self, session_id).await
    }
}

/// 单个会话的 AI 模式状态
pub struct AiModeToggle {
    session_id: String,
    backend: Arc<dyn AiModeBackend>,
    state: watch::Sender<bool>,
    // 同一时间只允许一个切换请求
    in_flight: Mutex<()>,
}

impl AiModeToggle {
    pub fn new(session_id: impl Into<String>, is_ai: bool, backend: Arc<dyn AiModeBackend>) -> Self {
        Self {
            session_id: session_id.into(),
            backend,
            state: watch::channel(is_ai).0,
            in_flight: Mutex::new(()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// 当前展示的状态（可能是尚未确认的乐观值）
    pub fn is_ai(&self) -> bool {
        *self.state.borrow()
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    pub fn label(&self) -> &'static str {
        mode_label(self.is_ai())
    }

    /// 切换模式，返回最终状态；失败时已回滚并返回错误
    pub async fn toggle(&self) -> Result<bool> {
        let _guard = self.in_flight.lock().await;

        let previous = self.is_ai();
        self.state.send_replace(!previous);
        info!(
            "[AiMode] 🔀 乐观切换 (session={}): {} -> {}",
            self.session_id,
            mode_label(previous),
            mode_label(!previous)
        );

        match self.backend.toggle_ai(&self.session_id).await {
            Ok(confirmed) => {
                self.state.send_replace(confirmed);
                info!(
                    "[AiMode] ✅ 服务端确认 (session={}): {}",
                    self.session_id,
                    mode_label(confirmed)
                );
                Ok(confirmed)
            }
            Err(e) => {
                self.state.send_replace(previous);
                error!(
                    "[AiMode] ❌ 切换失败，已回滚为 {} (session={}): {}",
                    mode_label(previous),
                    self.session_id,
                    e
                );
                Err(e.context("切换 AI 模式失败"))
            }
        }
    }
}

/// 模式展示文案
pub fn mode_label(is_ai: bool) -> &'static str {
    if is_ai {
        "AI Mode"
    } else {
        "Manual"
    }
}
