//! 实时会话通道
//!
//! 每个会话 ID 对应一条 WebSocket 连接。读取任务按到达顺序把入站帧应用到
//! 本地聊天记录，并在输入提示超时时自动清除。连接断开后不重连、不补发，
//! 只记录日志并通知监听器。

use crate::chat::frame::{decode_inbound, decode_inbound_bytes, InboundFrame, OutboundFrame};
use crate::chat::listener::ChatListener;
use crate::chat::transcript::{ChatEvent, ChatState};
use crate::chat::types::{ChatMessage, ChatRole};
use anyhow::{Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

/// WebSocket 写入端类型别名
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// WebSocket 读取端类型别名
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// 通道参数
pub struct ChannelOptions {
    /// 会话 ID
    pub session_id: String,
    /// 本端角色（user 或 agent），用于出站帧的 `from`
    pub local_role: ChatRole,
    /// 连接前已加载的历史记录
    pub history: Vec<ChatMessage>,
    /// 输入提示自动清除时长
    pub typing_timeout: Duration,
}

/// 单个会话的实时通道
pub struct ChatChannel {
    session_id: String,
    local_role: ChatRole,
    writer: Arc<Mutex<WsWriter>>,
    state: Arc<std::sync::Mutex<ChatState>>,
    connected: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl ChatChannel {
    /// 连接到会话通道并在内部启动读取任务
    pub async fn connect(
        url: &str,
        options: ChannelOptions,
        listener: Arc<dyn ChatListener>,
    ) -> Result<Self> {
        let ChannelOptions {
            session_id,
            local_role,
            history,
            typing_timeout,
        } = options;

        info!("[Channel] 🔗 连接会话通道 (session={}, role={})", session_id, local_role);
        debug!("[Channel]   URL: {}", url);

        let (ws_stream, response) = connect_async(url).await.map_err(|e| {
            error!("[Channel] ❌ 会话通道连接失败 (session={}): {}", session_id, e);
            anyhow::anyhow!("会话通道连接失败: {}", e)
        })?;
        info!(
            "[Channel] ✅ WebSocket 连接成功 (session={}), 状态: {}",
            session_id,
            response.status()
        );

        let (write, read) = ws_stream.split();
        let state = Arc::new(std::sync::Mutex::new(ChatState::new(history, typing_timeout)));
        let connected = Arc::new(AtomicBool::new(true));

        listener
            .on_connection_status_changed(&session_id, true, "连接成功".to_string())
            .await;

        let reader = tokio::spawn(run_reader(
            read,
            session_id.clone(),
            state.clone(),
            connected.clone(),
            listener,
        ));

        Ok(Self {
            session_id,
            local_role,
            writer: Arc::new(Mutex::new(write)),
            state,
            connected,
            reader: Some(reader),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn local_role(&self) -> ChatRole {
        self.local_role
    }

    /// 连接是否仍然可用
    pub fn is_open(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// 当前聊天记录快照
    pub fn transcript(&self) -> Vec<ChatMessage> {
        lock_state(&self.state).transcript.messages().to_vec()
    }

    /// 当前正在输入的角色
    pub fn typing(&self) -> Vec<ChatRole> {
        lock_state(&self.state).typing.active()
    }

    /// 发送聊天消息，空白内容不发送（返回 `None`）
    ///
    /// 本端消息在写出之前追加到聊天记录，对端的回复只会排在它之后；
    /// 发送失败时撤回。
    pub async fn send_message(&self, text: &str) -> Result<Option<ChatMessage>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let message = ChatMessage::now(self.local_role, text);
        let index = lock_state(&self.state).record_outgoing(message.clone());
        if let Err(e) = self
            .send_frame(&OutboundFrame::message(self.local_role, text))
            .await
        {
            lock_state(&self.state).retract_outgoing(index, &message);
            return Err(e);
        }
        Ok(Some(message))
    }

    /// 发送本端输入状态
    pub async fn send_typing(&self, is_typing: bool) -> Result<()> {
        self.send_frame(&OutboundFrame::typing(self.local_role, is_typing))
            .await
    }

    /// 输入框内容变化：非空为正在输入，空为停止输入
    pub async fn input_changed(&self, text: &str) -> Result<()> {
        self.send_typing(!text.trim().is_empty()).await
    }

    /// 发送任意出站帧
    pub async fn send_frame(&self, frame: &OutboundFrame) -> Result<()> {
        if !self.is_open() {
            return Err(anyhow::anyhow!("会话通道未连接: {}", self.session_id));
        }
        let json = frame.encode()?;
        debug!("[Channel] 📤 发送 (session={}): {}", self.session_id, json);
        let mut w = self.writer.lock().await;
        w.send(WsMessage::Text(json))
            .await
            .context("发送 WebSocket 消息失败")?;
        Ok(())
    }

    /// 关闭通道：发送 Close 帧并停止读取任务
    pub async fn close(mut self) -> Result<()> {
        info!("[Channel] 👋 关闭会话通道 (session={})", self.session_id);
        self.connected.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        let mut w = self.writer.lock().await;
        if let Err(e) = w.send(WsMessage::Close(None)).await {
            debug!("[Channel] 发送 Close 帧失败（连接可能已断开）: {}", e);
        }
        let _ = w.close().await;
        Ok(())
    }
}

impl Drop for ChatChannel {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

fn lock_state(state: &std::sync::Mutex<ChatState>) -> std::sync::MutexGuard<'_, ChatState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => sleep_until(d).await,
        None => std::future::pending().await,
    }
}

/// 读取任务（事件循环）
async fn run_reader(
    mut read: WsReader,
    session_id: String,
    state: Arc<std::sync::Mutex<ChatState>>,
    connected: Arc<AtomicBool>,
    listener: Arc<dyn ChatListener>,
) {
    let reason = loop {
        let deadline = lock_state(&state).typing.next_deadline();
        let frame = tokio::select! {
            msg = read.next() => msg,
            _ = wait_until(deadline) => {
                let events = lock_state(&state).expire_typing(Instant::now());
                dispatch(&session_id, events, listener.as_ref()).await;
                continue;
            }
        };

        let inbound: InboundFrame = match frame {
            Some(Ok(WsMessage::Text(text))) => {
                debug!("[Channel] 📥 收到 (session={}): {}", session_id, text);
                decode_inbound(&text)
            }
            Some(Ok(WsMessage::Binary(data))) => decode_inbound_bytes(&data),
            Some(Ok(WsMessage::Close(frame))) => {
                warn!("[Channel] 👋 连接关闭 (session={}): {:?}", session_id, frame);
                break "服务器关闭连接".to_string();
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                error!("[Channel] WebSocket 错误 (session={}): {}", session_id, e);
                break format!("连接错误: {}", e);
            }
            None => {
                warn!("[Channel] 连接已结束 (session={})", session_id);
                break "连接已结束".to_string();
            }
        };

        let events = lock_state(&state).apply(inbound, Instant::now());
        dispatch(&session_id, events, listener.as_ref()).await;
    };

    connected.store(false, Ordering::SeqCst);
    listener
        .on_connection_status_changed(&session_id, false, reason)
        .await;
}

/// 按顺序回调，不使用 spawn，保证消息到达顺序
async fn dispatch(session_id: &str, events: Vec<ChatEvent>, listener: &dyn ChatListener) {
    for event in events {
        match event {
            ChatEvent::Message(msg) => listener.on_message(session_id, msg).await,
            ChatEvent::Typing { role, is_typing } => {
                listener.on_typing_changed(session_id, role, is_typing).await
            }
        }
    }
}
