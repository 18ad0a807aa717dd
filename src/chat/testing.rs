//! 测试辅助：本地 mock 后端（REST + WebSocket）与记录型监听器

use crate::chat::config::ClientConfig;
use crate::chat::listener::{ChatListener, PresenceListener};
use crate::chat::types::{ActiveUserSummary, ChatMessage, ChatRole};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

static INIT_LOGGER: Once = Once::new();

pub fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::EnvFilter;

        // 测试中默认打开当前 crate 的 debug，关闭底层 HTTP 客户端的 debug 噪音
        let filter_layer = EnvFilter::new(
            "info,qlink_chat_sdk_rust=debug,sqlx=info,hyper_util::client=info,reqwest=info",
        );

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_test_writer();

        let _ = tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init();
    });
}

const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// 轮询等待条件成立，超时 panic
pub async fn wait_until<F: FnMut() -> bool>(what: &str, mut cond: F) {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("等待超时: {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

enum Outgoing {
    Text(String),
    Close,
}

#[derive(Default)]
struct SocketEntry {
    tx: Option<mpsc::UnboundedSender<Outgoing>>,
    received: Vec<Value>,
    open: bool,
    connects: usize,
}

#[derive(Default)]
pub struct MockState {
    sockets: Mutex<HashMap<(String, String), SocketEntry>>,
    users: Mutex<Vec<Value>>,
    histories: Mutex<HashMap<String, Value>>,
    users_response: Mutex<Option<Value>>,
    message_reply: Mutex<Option<Value>>,
    pub toggle_fails: AtomicBool,
    pub toggle_calls: AtomicUsize,
    pub user_fetches: AtomicUsize,
}

type Shared = Arc<MockState>;

/// 本地 mock 后端
pub struct MockBackend {
    addr: SocketAddr,
    pub state: Shared,
    server: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(MockState::default());
        let app = Router::new()
            .route("/ws/admin", get(ws_admin))
            .route("/ws/user/:id", get(ws_user))
            .route("/ws/agent/:id", get(ws_agent))
            .route("/api/chat_history/:id", get(chat_history))
            .route("/api/users", get(list_users))
            .route("/api/users/:id", get(get_user))
            .route("/api/toggle/:id", post(toggle))
            .route("/geo", get(geo))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            addr,
            state,
            server,
        }
    }

    pub fn config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::with_bases(
            format!("ws://{}/ws", self.addr),
            format!("http://{}/api", self.addr),
        );
        cfg.geo_url = format!("http://{}/geo", self.addr);
        cfg.typing_timeout = Duration::from_millis(200);
        cfg.request_timeout = Duration::from_secs(5);
        cfg
    }

    /// 添加用户记录（目录接口与单用户接口共用）
    pub fn add_user(&self, record: Value) {
        self.state.users.lock().unwrap().push(record);
    }

    pub fn set_history(&self, session_id: &str, history: Value) {
        self.state
            .histories
            .lock()
            .unwrap()
            .insert(session_id.to_string(), history);
    }

    /// 覆盖 `/users` 的原始响应
    pub fn set_users_response(&self, body: Value) {
        *self.state.users_response.lock().unwrap() = Some(body);
    }

    /// 每收到一条 `message` 帧立即回复 `reply`
    pub fn reply_to_messages(&self, reply: Value) {
        *self.state.message_reply.lock().unwrap() = Some(reply);
    }

    pub fn fail_toggles(&self, fail: bool) {
        self.state.toggle_fails.store(fail, Ordering::SeqCst);
    }

    fn key(kind: &str, id: &str) -> (String, String) {
        (kind.to_string(), id.to_string())
    }

    /// 向某个已连接的 socket 推送文本帧
    pub async fn push(&self, kind: &str, id: &str, text: String) {
        let tx = self
            .state
            .sockets
            .lock()
            .unwrap()
            .get(&Self::key(kind, id))
            .and_then(|e| e.tx.clone())
            .unwrap_or_else(|| panic!("socket {kind}/{id} 未连接"));
        tx.send(Outgoing::Text(text)).unwrap();
    }

    /// 服务端主动断开
    pub async fn disconnect(&self, kind: &str, id: &str) {
        let tx = self
            .state
            .sockets
            .lock()
            .unwrap()
            .get(&Self::key(kind, id))
            .and_then(|e| e.tx.clone())
            .unwrap_or_else(|| panic!("socket {kind}/{id} 未连接"));
        let _ = tx.send(Outgoing::Close);
    }

    pub fn is_open(&self, kind: &str, id: &str) -> bool {
        self.state
            .sockets
            .lock()
            .unwrap()
            .get(&Self::key(kind, id))
            .map(|e| e.open)
            .unwrap_or(false)
    }

    pub fn connects(&self, kind: &str, id: &str) -> usize {
        self.state
            .sockets
            .lock()
            .unwrap()
            .get(&Self::key(kind, id))
            .map(|e| e.connects)
            .unwrap_or(0)
    }

    pub async fn wait_for_socket(&self, kind: &str, id: &str) {
        wait_until(&format!("socket {kind}/{id} 连接"), || self.is_open(kind, id)).await;
    }

    pub async fn wait_for_socket_closed(&self, kind: &str, id: &str) {
        wait_until(&format!("socket {kind}/{id} 关闭"), || {
            self.connects(kind, id) > 0 && !self.is_open(kind, id)
        })
        .await;
    }

    pub fn received(&self, kind: &str, id: &str) -> Vec<Value> {
        self.state
            .sockets
            .lock()
            .unwrap()
            .get(&Self::key(kind, id))
            .map(|e| e.received.clone())
            .unwrap_or_default()
    }

    pub async fn wait_for_received(&self, kind: &str, id: &str, n: usize) -> Vec<Value> {
        wait_until(&format!("socket {kind}/{id} 收到 {n} 帧"), || {
            self.received(kind, id).len() >= n
        })
        .await;
        self.received(kind, id)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn ws_admin(ws: WebSocketUpgrade, State(state): State<Shared>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(state, ("admin".into(), String::new()), socket))
}

async fn ws_user(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<Shared>,
) -> Response {
    ws.on_upgrade(move |socket| serve_socket(state, ("user".into(), id), socket))
}

async fn ws_agent(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<Shared>,
) -> Response {
    ws.on_upgrade(move |socket| serve_socket(state, ("agent".into(), id), socket))
}

async fn serve_socket(state: Shared, key: (String, String), socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outgoing>();
    {
        let mut sockets = state.sockets.lock().unwrap();
        let entry = sockets.entry(key.clone()).or_default();
        entry.tx = Some(tx);
        entry.open = true;
        entry.connects += 1;
    }

    loop {
        tokio::select! {
            out = rx.recv() => match out {
                Some(Outgoing::Text(text)) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            inc = stream.next() => match inc {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));
                    let reply = if value["type"] == "message" {
                        state.message_reply.lock().unwrap().clone()
                    } else {
                        None
                    };
                    if let Some(entry) = state.sockets.lock().unwrap().get_mut(&key) {
                        entry.received.push(value);
                    }
                    if let Some(reply) = reply {
                        if sink.send(Message::Text(reply.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    if let Some(entry) = state.sockets.lock().unwrap().get_mut(&key) {
        entry.open = false;
        entry.tx = None;
    }
}

async fn chat_history(Path(id): Path<String>, State(state): State<Shared>) -> Response {
    match state.histories.lock().unwrap().get(&id) {
        Some(history) => Json(json!({ "chat_history": history })).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn list_users(State(state): State<Shared>) -> Response {
    if let Some(body) = state.users_response.lock().unwrap().clone() {
        return Json(body).into_response();
    }
    Json(Value::Array(state.users.lock().unwrap().clone())).into_response()
}

async fn get_user(Path(id): Path<String>, State(state): State<Shared>) -> Response {
    state.user_fetches.fetch_add(1, Ordering::SeqCst);
    let users = state.users.lock().unwrap();
    match users.iter().find(|u| u["session_id"] == id) {
        Some(user) => Json(user.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "detail": "not found" }))).into_response(),
    }
}

async fn toggle(Path(id): Path<String>, State(state): State<Shared>) -> Response {
    state.toggle_calls.fetch_add(1, Ordering::SeqCst);
    if state.toggle_fails.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "toggle failed").into_response();
    }
    let mut users = state.users.lock().unwrap();
    match users.iter_mut().find(|u| u["session_id"] == id) {
        Some(user) => {
            let next = !user["is_ai"].as_bool().unwrap_or(true);
            user["is_ai"] = Value::Bool(next);
            Json(json!({ "is_ai": next })).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn geo() -> Response {
    Json(json!({ "country": "IN", "country_calling_code": "+91" })).into_response()
}

/// 记录所有回调的会话监听器
#[derive(Default)]
pub struct RecordingChatListener {
    messages: Mutex<Vec<(String, ChatMessage)>>,
    typing: Mutex<Vec<(ChatRole, bool)>>,
    statuses: Mutex<Vec<bool>>,
}

impl RecordingChatListener {
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn message_sessions(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(s, _)| s.clone())
            .collect()
    }

    pub fn typing_events(&self) -> Vec<(ChatRole, bool)> {
        self.typing.lock().unwrap().clone()
    }

    pub async fn wait_for_messages(&self, n: usize) {
        wait_until(&format!("{n} 条消息回调"), || self.messages.lock().unwrap().len() >= n).await;
    }

    pub async fn wait_for_typing_events(&self, n: usize) {
        wait_until(&format!("{n} 个输入状态回调"), || self.typing.lock().unwrap().len() >= n).await;
    }

    pub async fn wait_for_status(&self, connected: bool) {
        wait_until(&format!("连接状态 {connected}"), || {
            self.statuses.lock().unwrap().last() == Some(&connected)
        })
        .await;
    }
}

#[async_trait]
impl ChatListener for RecordingChatListener {
    async fn on_message(&self, session_id: &str, message: ChatMessage) {
        self.messages
            .lock()
            .unwrap()
            .push((session_id.to_string(), message));
    }

    async fn on_typing_changed(&self, _session_id: &str, role: ChatRole, is_typing: bool) {
        self.typing.lock().unwrap().push((role, is_typing));
    }

    async fn on_connection_status_changed(&self, _session_id: &str, connected: bool, _message: String) {
        self.statuses.lock().unwrap().push(connected);
    }
}

/// 记录所有回调的在线列表监听器
#[derive(Default)]
pub struct RecordingPresenceListener {
    snapshots: Mutex<Vec<Vec<ActiveUserSummary>>>,
    statuses: Mutex<Vec<bool>>,
}

impl RecordingPresenceListener {
    pub fn snapshots(&self) -> Vec<Vec<ActiveUserSummary>> {
        self.snapshots.lock().unwrap().clone()
    }

    pub async fn wait_for_snapshots(&self, n: usize) {
        wait_until(&format!("{n} 个在线快照"), || self.snapshots.lock().unwrap().len() >= n).await;
    }

    pub async fn wait_for_status(&self, connected: bool) {
        wait_until(&format!("管理员通道状态 {connected}"), || {
            self.statuses.lock().unwrap().last() == Some(&connected)
        })
        .await;
    }
}

#[async_trait]
impl PresenceListener for RecordingPresenceListener {
    async fn on_active_users_changed(&self, users: Vec<ActiveUserSummary>) {
        self.snapshots.lock().unwrap().push(users);
    }

    async fn on_connection_status_changed(&self, connected: bool) {
        self.statuses.lock().unwrap().push(connected);
    }
}
