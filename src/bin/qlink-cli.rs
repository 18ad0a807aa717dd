//! qlink 聊天 CLI 客户端
//!
//! 通过路径参数选择页面：`/` 入口、`/user` 用户聊天、`/admin` 管理后台首页、
//! `/admin/active` 在线用户、`/admin/users` 全部用户。交互页面从标准输入读取命令。

use anyhow::{Context, Result};
use clap::Parser;
use qlink_chat_sdk_rust::chat::listener::{ChatListener, PresenceListener};
use qlink_chat_sdk_rust::chat::route::render_admin_nav;
use qlink_chat_sdk_rust::chat::{mode_label, AdminConsole, UserChat, UserChatOptions};
use qlink_chat_sdk_rust::{
    ActiveUserSummary, AdminTab, ChatMessage, ChatRole, ClientConfig, Route, SessionStore,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{error, info, warn};

/// qlink 聊天 CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "qlink-cli")]
#[command(about = "qlink 客服聊天 CLI - 用户端与管理后台", long_about = None)]
struct Args {
    /// 页面路径：/、/user、/admin、/admin/active、/admin/users
    #[arg(default_value = "/")]
    path: String,

    /// WebSocket 地址前缀
    #[arg(long, default_value = qlink_chat_sdk_rust::chat::config::DEFAULT_WS_BASE)]
    ws_base: String,

    /// REST API 地址前缀
    #[arg(long, default_value = qlink_chat_sdk_rust::chat::config::DEFAULT_API_BASE)]
    api_base: String,

    /// 地理位置查询地址
    #[arg(long, default_value = qlink_chat_sdk_rust::chat::config::DEFAULT_GEO_URL)]
    geo_url: String,

    /// 本地数据库（保存会话ID）
    #[arg(long, default_value = qlink_chat_sdk_rust::chat::config::DEFAULT_DB_URL)]
    db_url: String,

    /// 用户昵称（用户端，随 client_info 发送）
    #[arg(long)]
    user_name: Option<String>,

    /// 不查询地理位置
    #[arg(long)]
    no_geo: bool,

    /// 输入提示自动清除时长（秒）
    #[arg(long, default_value = "5")]
    typing_timeout: u64,

    /// 运行时长（秒），0 表示持续运行
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// 日志级别（默认: info,qlink_chat_sdk_rust=debug）
    #[arg(long, default_value = "info,qlink_chat_sdk_rust=debug")]
    log_level: String,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::with_bases(self.ws_base.clone(), self.api_base.clone());
        config.geo_url = self.geo_url.clone();
        config.db_url = self.db_url.clone();
        config.typing_timeout = Duration::from_secs(self.typing_timeout);
        config
    }

    fn deadline(&self) -> Option<Instant> {
        (self.duration > 0).then(|| Instant::now() + Duration::from_secs(self.duration))
    }
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .context("无法创建日志文件 debug.log")?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 文件不需要颜色
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: debug.log");
    Ok(())
}

fn format_message(message: &ChatMessage) -> String {
    let time = message.display_time();
    if time.is_empty() {
        format!("{}: {}", message.role, message.content)
    } else {
        format!("[{}] {}: {}", time, message.role, message.content)
    }
}

/// 会话监听器（输出收到的消息和输入状态）
struct CliChatListener;

#[async_trait::async_trait]
impl ChatListener for CliChatListener {
    async fn on_message(&self, session_id: &str, message: ChatMessage) {
        info!("[CLI/Chat] 📨 ({}) {}", session_id, format_message(&message));
    }

    async fn on_typing_changed(&self, session_id: &str, role: ChatRole, is_typing: bool) {
        if is_typing {
            info!("[CLI/Chat] ⌨️ ({}) {} 正在输入...", session_id, role);
        } else {
            info!("[CLI/Chat] ⌨️ ({}) {} 停止输入", session_id, role);
        }
    }

    async fn on_connection_status_changed(&self, session_id: &str, connected: bool, message: String) {
        if connected {
            info!("[CLI/Chat] 🔗 ({}) 已连接: {}", session_id, message);
        } else {
            error!("[CLI/Chat] 🔗 ({}) 断开连接: {}", session_id, message);
        }
    }
}

/// 在线列表监听器
struct CliPresenceListener;

#[async_trait::async_trait]
impl PresenceListener for CliPresenceListener {
    async fn on_active_users_changed(&self, users: Vec<ActiveUserSummary>) {
        let n = users.len();
        info!(
            "[CLI/Presence] 👥 {} {} online",
            n,
            if n == 1 { "user" } else { "users" }
        );
        if users.is_empty() {
            info!("[CLI/Presence]   No active users");
        }
        for user in &users {
            match &user.country_code {
                Some(code) => info!("[CLI/Presence]   - {} (+{})", user.session_id, code),
                None => info!("[CLI/Presence]   - {}", user.session_id),
            }
        }
    }

    async fn on_connection_status_changed(&self, connected: bool) {
        if connected {
            info!("[CLI/Presence] 🔗 管理员通道已连接");
        } else {
            error!("[CLI/Presence] 🔗 管理员通道已断开");
        }
    }
}

enum Input {
    Line(String),
    Eof,
    Timeout,
}

/// 读取下一行输入，到达运行时长时返回 `Timeout`
async fn next_input(lines: &mut Lines<BufReader<Stdin>>, deadline: Option<Instant>) -> Input {
    let timeout = async {
        match deadline {
            Some(d) => sleep_until(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        line = lines.next_line() => match line {
            Ok(Some(line)) => Input::Line(line),
            Ok(None) => Input::Eof,
            Err(e) => {
                error!("[CLI] 读取标准输入失败: {}", e);
                Input::Eof
            }
        },
        _ = timeout => Input::Timeout,
    }
}

fn stdin_lines() -> Lines<BufReader<Stdin>> {
    BufReader::new(tokio::io::stdin()).lines()
}

fn print_landing() {
    info!("[CLI] 🏠 qlink 客服聊天");
    info!("[CLI]   /user   用户聊天");
    info!("[CLI]   /admin  管理后台");
}

async fn run_user(args: &Args, config: ClientConfig) -> Result<()> {
    let sessions = SessionStore::open(&config.db_url).await?;
    let chat = UserChat::start(
        &config,
        &sessions,
        UserChatOptions {
            user_name: args.user_name.clone(),
            lookup_geo: !args.no_geo,
        },
        Arc::new(CliChatListener),
    )
    .await?;

    info!("[CLI] 💬 会话ID: {}", chat.session_id());
    if let Some(code) = chat.country_code() {
        info!("[CLI] 🌍 默认区号: +{}", code);
    }
    let transcript = chat.transcript();
    info!("[CLI] 📋 历史记录（共 {} 条）:", transcript.len());
    for message in &transcript {
        info!("[CLI]   {}", format_message(message));
    }
    info!("[CLI] 💡 输入消息后回车发送，/quit 退出");

    let deadline = args.deadline();
    let mut lines = stdin_lines();
    loop {
        match next_input(&mut lines, deadline).await {
            Input::Line(line) if line.trim() == "/quit" => break,
            Input::Line(line) => {
                if let Err(e) = chat.send(&line).await {
                    error!("[CLI] ❌ 发送失败: {:#}", e);
                }
                if let Err(e) = chat.input_changed("").await {
                    warn!("[CLI] ⚠️ 发送停止输入状态失败: {:#}", e);
                }
            }
            Input::Eof | Input::Timeout => break,
        }
    }
    chat.close().await
}

async fn run_admin_home(config: ClientConfig) -> Result<()> {
    info!("[CLI] {}", render_admin_nav(AdminTab::Home));
    let mut console = AdminConsole::new(config, Arc::new(CliChatListener))?;
    match console.start_presence(Arc::new(CliPresenceListener)).await {
        Ok(()) => {
            // 等待第一份在线快照，最多 3 秒
            let mut rx = console.presence().subscribe();
            let wait = rx.wait_for(|s| s.snapshot_received);
            if tokio::time::timeout(Duration::from_secs(3), wait).await.is_err() {
                warn!("[CLI] ⚠️ 未收到在线列表快照，在线人数按 0 计");
            }
        }
        Err(e) => warn!("[CLI] ⚠️ 管理员通道不可用: {:#}", e),
    }
    match console.overview().await {
        Ok(overview) => {
            info!("[CLI] 📊 在线用户: {}", overview.active_users);
            info!("[CLI] 📊 全部用户: {}", overview.total_users);
        }
        Err(e) => error!("[CLI] ❌ 加载概览失败: {:#}", e),
    }
    console.shutdown().await;
    Ok(())
}

async fn run_admin_active(args: &Args, config: ClientConfig) -> Result<()> {
    info!("[CLI] {}", render_admin_nav(AdminTab::Active));
    let mut console = AdminConsole::new(config, Arc::new(CliChatListener))?;
    if let Err(e) = console.start_presence(Arc::new(CliPresenceListener)).await {
        warn!("[CLI] ⚠️ 管理员通道不可用: {:#}", e);
    }
    if let Some(text) = console.presence().snapshot().view().placeholder() {
        info!("[CLI/Presence]   {}", text);
    }
    info!("[CLI] 💡 命令: /select <id>、/toggle、/info、/quit，其他输入作为坐席消息发送");

    let deadline = args.deadline();
    let mut lines = stdin_lines();
    loop {
        let line = match next_input(&mut lines, deadline).await {
            Input::Line(line) => line,
            Input::Eof | Input::Timeout => break,
        };
        let line = line.trim();
        if line == "/quit" {
            break;
        } else if let Some(id) = line.strip_prefix("/select ") {
            match console.select_conversation(id.trim()).await {
                Ok(()) => {
                    print_selected(&console);
                    for message in console.transcript() {
                        info!("[CLI]   {}", format_message(&message));
                    }
                }
                Err(e) => error!("[CLI] ❌ 打开会话失败: {:#}", e),
            }
        } else if line == "/toggle" {
            match console.toggle_ai().await {
                Ok(is_ai) => info!("[CLI] 🔀 当前模式: {}", mode_label(is_ai)),
                Err(e) => error!("[CLI] ❌ {:#}", e),
            }
        } else if line == "/info" {
            print_selected(&console);
        } else if !line.is_empty() {
            if let Err(e) = console.send_message(line).await {
                error!("[CLI] ❌ 发送失败: {:#}", e);
            }
        }
    }
    console.shutdown().await;
    Ok(())
}

fn print_selected(console: &AdminConsole) {
    let Some(session_id) = console.selected() else {
        info!("[CLI] 尚未选中会话");
        return;
    };
    let mode = console
        .ai_mode()
        .map(|t| t.label())
        .unwrap_or_else(|| mode_label(true));
    info!("[CLI] 👤 {} | {}", session_id, mode);
    match console.selected_info() {
        Some(user) => {
            info!("[CLI]   {} | {}", user.user_name, user.subtitle());
            info!("[CLI]   消息数: {}", user.chat_history_length);
            if let Some(created) = user.created_at {
                info!("[CLI]   创建时间: {}", created.format("%Y-%m-%d %H:%M"));
            }
            if let Some(updated) = user.updated_at {
                info!("[CLI]   更新时间: {}", updated.format("%Y-%m-%d %H:%M"));
            }
        }
        None => info!("[CLI]   暂无用户信息"),
    }
}

async fn run_admin_users(args: &Args, config: ClientConfig) -> Result<()> {
    info!("[CLI] {}", render_admin_nav(AdminTab::Users));
    let console = AdminConsole::new(config, Arc::new(CliChatListener))?;
    let users = console.all_users().await?;
    info!("[CLI] 📋 全部用户（共 {} 个）:", users.len());
    for user in &users {
        info!(
            "[CLI]   - {} | {} | {} | {} | {} 条消息",
            user.session_id,
            user.user_name,
            user.country_code,
            mode_label(user.is_ai),
            user.chat_history.len()
        );
    }
    info!("[CLI] 💡 命令: /show <id>、/quit");

    let deadline = args.deadline();
    let mut lines = stdin_lines();
    loop {
        let line = match next_input(&mut lines, deadline).await {
            Input::Line(line) => line,
            Input::Eof | Input::Timeout => break,
        };
        let line = line.trim();
        if line == "/quit" {
            break;
        }
        if let Some(id) = line.strip_prefix("/show ") {
            match console.user_detail(id.trim()).await {
                Ok(user) => {
                    let info = user.info();
                    info!("[CLI] 👤 {} | {} | {}", info.session_id, info.user_name, info.subtitle());
                    info!("[CLI]   模式: {}", mode_label(info.is_ai));
                    for message in &user.chat_history {
                        info!("[CLI]   {}", format_message(message));
                    }
                }
                Err(e) => error!("[CLI] ❌ 加载用户失败: {:#}", e),
            }
        }
    }
    console.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level)?;

    let route = Route::from_path(&args.path)?;
    let config = args.client_config();
    info!("[CLI] 🚀 qlink CLI 客户端: {}", route.path());
    info!("[CLI] ⏱️  运行时长: {} 秒（0=持续运行）", args.duration);

    match route {
        Route::Landing => {
            print_landing();
            Ok(())
        }
        Route::User => run_user(&args, config).await,
        Route::Admin(AdminTab::Home) => run_admin_home(config).await,
        Route::Admin(AdminTab::Active) => run_admin_active(&args, config).await,
        Route::Admin(AdminTab::Users) => run_admin_users(&args, config).await,
    }
}
