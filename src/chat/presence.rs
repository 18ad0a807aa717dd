//! 在线用户列表
//!
//! 管理员通道推送全量快照（`{"type":"active_users","data":[...]}`），本地每次整体替换，
//! 不做增量合并，也不做过期处理。状态集中保存在 [`PresenceStore`] 中，通过 `watch` 订阅。

use crate::chat::frame::{decode_inbound, decode_inbound_bytes, InboundFrame};
use crate::chat::listener::PresenceListener;
use crate::chat::types::ActiveUserSummary;
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

/// 在线列表状态
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceState {
    /// 管理员通道是否已连接
    pub connected: bool,
    /// 是否收到过快照
    pub snapshot_received: bool,
    /// 最近一次快照
    pub users: Vec<ActiveUserSummary>,
}

/// 在线列表的展示状态
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceView {
    /// 尚未连接且没有快照
    Connecting,
    /// 明确的空列表
    Empty,
    Online(Vec<ActiveUserSummary>),
}

impl PresenceState {
    pub fn view(&self) -> PresenceView {
        if !self.users.is_empty() {
            PresenceView::Online(self.users.clone())
        } else if self.connected || self.snapshot_received {
            PresenceView::Empty
        } else {
            PresenceView::Connecting
        }
    }

    /// 例如 "0 users online"、"1 user online"
    pub fn headline(&self) -> String {
        let n = self.users.len();
        format!("{} {} online", n, if n == 1 { "user" } else { "users" })
    }
}

impl PresenceView {
    /// 列表为空时的提示文案
    pub fn placeholder(&self) -> Option<&'static str> {
        match self {
            PresenceView::Connecting => Some("Connecting..."),
            PresenceView::Empty => Some("No active users"),
            PresenceView::Online(_) => None,
        }
    }
}

/// 在线列表的唯一状态源
pub struct PresenceStore {
    state: watch::Sender<PresenceState>,
}

impl PresenceStore {
    pub fn new() -> Self {
        Self {
            state: watch::channel(PresenceState::default()).0,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PresenceState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> PresenceState {
        self.state.borrow().clone()
    }

    pub fn active_count(&self) -> usize {
        self.state.borrow().users.len()
    }

    /// 整体替换在线列表
    pub fn replace(&self, users: Vec<ActiveUserSummary>) {
        self.state.send_modify(|s| {
            s.users = users;
            s.snapshot_received = true;
        });
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.send_if_modified(|s| {
            let changed = s.connected != connected;
            s.connected = connected;
            changed
        });
    }
}

impl Default for PresenceStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 管理员通道：接收在线列表快照并写入 [`PresenceStore`]
pub struct PresenceMonitor {
    store: Arc<PresenceStore>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PresenceMonitor {
    /// 连接管理员通道并在内部启动接收任务
    pub async fn start(
        url: &str,
        store: Arc<PresenceStore>,
        listener: Arc<dyn PresenceListener>,
    ) -> Result<Self> {
        info!("[Presence] 🔗 连接管理员通道");
        debug!("[Presence]   URL: {}", url);

        let (ws_stream, response) = match connect_async(url).await {
            Ok(ok) => ok,
            Err(e) => {
                error!("[Presence] ❌ 管理员通道连接失败: {}", e);
                store.set_connected(false);
                listener.on_connection_status_changed(false).await;
                return Err(anyhow::anyhow!("管理员通道连接失败: {}", e));
            }
        };
        info!("[Presence] ✅ 管理员通道已连接, 状态: {}", response.status());
        store.set_connected(true);
        listener.on_connection_status_changed(true).await;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task_store = store.clone();
        let task = tokio::spawn(async move {
            let store = task_store;
            let (mut write, mut read) = ws_stream.split();
            loop {
                let frame = tokio::select! {
                    _ = &mut shutdown_rx => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        let _ = write.close().await;
                        info!("[Presence] 👋 管理员通道已关闭");
                        break;
                    }
                    msg = read.next() => msg,
                };
                let inbound = match frame {
                    Some(Ok(WsMessage::Text(text))) => decode_inbound(&text),
                    Some(Ok(WsMessage::Binary(data))) => decode_inbound_bytes(&data),
                    Some(Ok(WsMessage::Close(frame))) => {
                        warn!("[Presence] 👋 服务器关闭管理员通道: {:?}", frame);
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        error!("[Presence] WebSocket 错误: {}", e);
                        break;
                    }
                    None => break,
                };
                match inbound {
                    InboundFrame::ActiveUsers(users) => {
                        info!("[Presence] 👥 在线列表快照: {} 个用户", users.len());
                        store.replace(users.clone());
                        listener.on_active_users_changed(users).await;
                    }
                    InboundFrame::Fallback(msg) => {
                        error!("[Presence] 无法解析的管理员帧: {}", msg.content);
                    }
                    other => debug!("[Presence] 忽略非在线列表帧: {:?}", other),
                }
            }
            store.set_connected(false);
            listener.on_connection_status_changed(false).await;
        });

        Ok(Self {
            store,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// 关闭管理员通道并等待接收任务结束
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PresenceMonitor {
    fn drop(&mut self) {
        // 未经 stop 直接丢弃：任务被中止，不会再写入断开状态
        if let Some(task) = self.task.take() {
            task.abort();
            self.store.set_connected(false);
        }
    }
}
