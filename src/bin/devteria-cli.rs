//! devteria 聊天 CLI 客户端
//!
//! 非交互式 CLI：每次运行先登录，然后执行一个子命令并输出结果

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use devteria_chat_core::im::client::{ChatClient, ClientConfig};
use devteria_chat_core::im::conversation::{Conversation, ConversationListener};
use devteria_chat_core::im::message::{Message, MessageListener};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// devteria 聊天 CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "devteria-cli")]
#[command(about = "devteria 聊天 CLI 客户端 - 用于测试资料、帖子与聊天功能", long_about = None)]
struct Args {
    /// 用户名
    #[arg(short, long, env = "DEVTERIA_USERNAME")]
    username: String,

    /// 密码
    #[arg(short, long, env = "DEVTERIA_PASSWORD", hide_env_values = true)]
    password: String,

    /// API 网关地址
    #[arg(long, default_value = "http://localhost:8888/api/v1")]
    api: String,

    /// socket 服务器地址
    #[arg(long, default_value = "http://localhost:8099")]
    socket: String,

    /// Engine.IO 协议版本（3 或 4）
    #[arg(long, default_value = "4")]
    eio: u8,

    /// 日志级别（默认: info,devteria_chat_core=debug）
    #[arg(long, default_value = "info,devteria_chat_core=debug")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 显示当前用户资料
    Profile,
    /// 列出我的帖子
    Posts {
        /// 最多加载的页数
        #[arg(long, default_value = "1")]
        pages: u32,
    },
    /// 发帖
    Post { content: String },
    /// 列出会话
    Conversations,
    /// 显示会话历史消息
    Messages { conversation_id: String },
    /// 向会话发送消息
    Send {
        conversation_id: String,
        text: String,
    },
    /// 与用户开始单聊（已存在则打开）
    Chat { user_id: String },
    /// 搜索用户
    Search { keyword: String },
    /// 连接 socket 并输出收到的事件
    Watch {
        /// 运行时长（秒），0 表示持续运行直到 Ctrl+C
        #[arg(short, long, default_value = "0")]
        duration: u64,
    },
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

    // 创建日志文件（追加模式）
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .context("无法创建日志文件 debug.log")?;

    // 输出到 stdout（控制台），保留 ANSI 颜色代码用于终端显示
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 输出到文件，禁用 ANSI 颜色代码
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

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(30).collect();
    if text.chars().count() > 30 {
        out.push('…');
    }
    out
}

fn print_message(msg: &Message) {
    let who = msg
        .sender
        .as_ref()
        .and_then(|s| s.username.clone())
        .unwrap_or_else(|| if msg.me { "我".to_string() } else { "?".to_string() });
    let mark = if msg.failed {
        " ❌"
    } else if msg.pending {
        " ⏳"
    } else {
        ""
    };
    info!(
        "[CLI]   {} {}: {}{}",
        msg.created_date.format("%Y-%m-%d %H:%M:%S"),
        who,
        msg.message,
        mark
    );
}

/// 设置监听器（输出所有接收到的信息）
fn setup_listeners(client: &mut ChatClient) {
    struct CliConversationListener;

    #[async_trait::async_trait]
    impl ConversationListener for CliConversationListener {
        async fn on_conversation_list_changed(&self, conversations: Vec<Conversation>) {
            info!("[CLI/Conversation] 🔄 会话列表变更，共 {} 个", conversations.len());
        }

        async fn on_total_unread_count_changed(&self, total_unread_count: u32) {
            info!("[CLI/Conversation] 📬 总未读数: {}", total_unread_count);
        }
    }
    client.set_conversation_listener(Arc::new(CliConversationListener));

    struct CliMessageListener;

    #[async_trait::async_trait]
    impl MessageListener for CliMessageListener {
        async fn on_messages_changed(&self, _conversation_id: String, _messages: Vec<Message>) {}

        async fn on_recv_new_message(&self, message: Message) {
            info!(
                "[CLI/Message] 📨 会话 {} 收到新消息: {}",
                message.conversation_id,
                preview(&message.message)
            );
        }

        async fn on_send_failed(&self, message: Message) {
            error!("[CLI/Message] ❌ 发送失败: {}", preview(&message.message));
        }

        async fn on_connection_status_changed(&self, connected: bool, message: String) {
            if connected {
                info!("[CLI/Message] 🔗 已连接: {}", message);
            } else {
                warn!("[CLI/Message] 🔗 断开连接: {}", message);
            }
        }
    }
    client.set_message_listener(Arc::new(CliMessageListener));
}

async fn run(client: &ChatClient, command: Command) -> Result<()> {
    match command {
        Command::Profile => {
            let profile = client.load_my_profile().await?;
            info!("[CLI] 👤 {}", profile.display_name());
            info!("[CLI]   用户名: {}", profile.username.as_deref().unwrap_or("-"));
            info!("[CLI]   邮箱: {}", profile.email.as_deref().unwrap_or("-"));
            info!("[CLI]   城市: {}", profile.city.as_deref().unwrap_or("-"));
            if let Some(dob) = profile.dob {
                info!("[CLI]   生日: {}", dob);
            }
        }
        Command::Posts { pages } => {
            for _ in 0..pages.max(1) {
                if !client.has_more_posts().await {
                    break;
                }
                client.load_next_posts().await?;
            }
            let posts = client.posts().await;
            info!("[CLI] 📝 帖子（共 {} 条）:", posts.len());
            for post in &posts {
                info!(
                    "[CLI]   - {} | {}",
                    post.created.as_deref().unwrap_or("-"),
                    preview(&post.content)
                );
            }
        }
        Command::Post { content } => {
            let post = client.create_post(&content).await?;
            info!("[CLI] ✅ 已发帖: {}", post.id);
        }
        Command::Conversations => {
            let conversations = client.fetch_conversations().await?;
            info!("[CLI] 📋 会话列表（共 {} 个）:", conversations.len());
            for conv in &conversations {
                info!(
                    "[CLI]   - {} | {} | 未读: {} | 最新: {}",
                    conv.id,
                    conv.display_name(),
                    conv.unread,
                    preview(conv.last_message.as_deref().unwrap_or(""))
                );
            }
        }
        Command::Messages { conversation_id } => {
            client.fetch_conversations().await?;
            let messages = client.select_conversation(&conversation_id).await?;
            info!("[CLI] 💬 会话 {} 消息（共 {} 条）:", conversation_id, messages.len());
            for msg in &messages {
                print_message(msg);
            }
        }
        Command::Send {
            conversation_id,
            text,
        } => {
            client.fetch_conversations().await?;
            let msg = client.send_message(&conversation_id, &text).await?;
            info!("[CLI] ✅ 消息已发送: {}", msg.id);
        }
        Command::Chat { user_id } => {
            client.fetch_conversations().await?;
            let conv = client.start_direct_chat(&user_id).await?;
            info!("[CLI] 💬 会话 {} ({})", conv.id, conv.display_name());
            for msg in &client.messages(&conv.id).await {
                print_message(msg);
            }
        }
        Command::Search { keyword } => {
            let users = client.search_users(&keyword).await?;
            info!("[CLI] 🔍 找到 {} 个用户:", users.len());
            for user in &users {
                info!(
                    "[CLI]   - {} | {}",
                    user.user_id.as_deref().unwrap_or(&user.id),
                    user.display_name()
                );
            }
        }
        Command::Watch { duration } => {
            client.fetch_conversations().await?;
            info!("[CLI] 🔗 正在连接 socket...");
            client.connect().await.context("连接失败")?;
            info!("[CLI] 📥 开始监听消息...");

            if duration > 0 {
                info!("[CLI] ⏰ {} 秒后自动退出", duration);
                sleep(Duration::from_secs(duration)).await;
            } else {
                info!("[CLI] ⏰ 持续运行中，按 Ctrl+C 退出");
                tokio::signal::ctrl_c().await.context("等待 Ctrl+C 失败")?;
            }
            client.disconnect().await;
            info!("[CLI] 📬 退出时总未读数: {}", client.total_unread().await);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(&args.log_level)?;
    info!("[CLI] 🚀 devteria 聊天 CLI 客户端");

    let mut config = ClientConfig::new();
    config.api_base_url = args.api.clone();
    config.socket_url = args.socket.clone();
    config.engine_io_version = args.eio;

    let mut client = ChatClient::new(config);
    setup_listeners(&mut client);

    info!("[CLI] 🔐 正在登录: {}", args.username);
    client
        .login(&args.username, &args.password)
        .await
        .context("登录失败")?;

    let result = run(&client, args.command).await;
    if let Err(e) = &result {
        error!("[CLI] ❌ {:#}", e);
    }
    info!("[CLI] 👋 程序退出");
    result
}
