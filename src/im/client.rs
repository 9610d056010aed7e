//! 聊天客户端核心实现模块
//!
//! `ChatClient` 把 HTTP 接口、内存中的聊天状态与实时 socket 串起来：
//! 登录后拉取会话与历史消息，乐观发送消息，socket 推送的消息按 ID 去重后合并。

use crate::im::auth::{AuthApi, AuthenticationResponse, Session};
use crate::im::chat_state::{ChatState, IncomingOutcome};
use crate::im::conversation::{
    Conversation, ConversationApi, ConversationListener, ConversationType,
    EmptyConversationListener, ParticipantInfo,
};
use crate::im::message::{EmptyMessageListener, Message, MessageApi, MessageListener};
use crate::im::post::{Post, PostApi, PostFeed, DEFAULT_PAGE_SIZE};
use crate::im::profile::{ProfileApi, UpdateProfileRequest, UserProfile};
use crate::im::socket::{build_socket_url, EngineVersion, SocketConnection, SocketEvent};
use crate::im::types::{build_http_client, is_unauthenticated};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// API 网关地址
    pub api_base_url: String,
    /// socket 服务器地址（http/https 会自动换成 ws/wss）
    pub socket_url: String,
    /// Engine.IO 协议版本（3 或 4）
    pub engine_io_version: u8,
    /// 帖子分页大小
    pub page_size: u32,
    /// HTTP 请求超时
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self {
            api_base_url: "http://localhost:8888/api/v1".to_string(),
            socket_url: "http://localhost:8099".to_string(),
            engine_io_version: 4,
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// 聊天客户端
///
/// 可以廉价克隆，所有克隆共享同一份登录会话与聊天状态。
/// 监听器需要在 `connect` 之前注册。
#[derive(Clone)]
pub struct ChatClient {
    pub(crate) config: ClientConfig,
    session: Session,
    // 带 Bearer 认证头的 HTTP 客户端，登录后创建
    http: Arc<std::sync::RwLock<Option<reqwest::Client>>>,
    state: Arc<Mutex<ChatState>>,
    feed: Arc<Mutex<PostFeed>>,
    socket: Arc<Mutex<Option<SocketConnection>>>,
    conversation_listener: Arc<dyn ConversationListener>,
    message_listener: Arc<dyn MessageListener>,
}

impl ChatClient {
    /// 创建新的客户端
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            session: Session::new(),
            http: Arc::new(std::sync::RwLock::new(None)),
            state: Arc::new(Mutex::new(ChatState::new())),
            feed: Arc::new(Mutex::new(PostFeed::new())),
            socket: Arc::new(Mutex::new(None)),
            conversation_listener: Arc::new(EmptyConversationListener),
            message_listener: Arc::new(EmptyMessageListener),
        }
    }

    /// 注册会话监听器
    pub fn set_conversation_listener(&mut self, listener: Arc<dyn ConversationListener>) {
        self.conversation_listener = listener;
    }

    /// 注册消息监听器
    pub fn set_message_listener(&mut self, listener: Arc<dyn MessageListener>) {
        self.message_listener = listener;
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    fn authed_http(&self) -> Result<reqwest::Client> {
        self.http
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or_else(|| anyhow::anyhow!("未登录"))
    }

    fn api_base(&self) -> String {
        self.config.api_base_url.trim_end_matches('/').to_string()
    }

    /// 保存 token 并创建带认证头的 HTTP 客户端
    pub(crate) async fn install_token(&self, token: String) -> Result<()> {
        let http = build_http_client(Some(&token), self.config.request_timeout)?;
        if let Ok(mut guard) = self.http.write() {
            *guard = Some(http);
        }
        self.session.set_token(token);

        // token 的 sub 即用户 ID，资料加载前先用它作为乐观消息的发送者
        if let Some(claims) = self.session.claims() {
            self.state
                .lock()
                .await
                .set_current_user(Some(ParticipantInfo {
                    user_id: claims.sub,
                    ..Default::default()
                }));
        }
        Ok(())
    }

    /// 用户名密码登录
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthenticationResponse> {
        let anonymous = build_http_client(None, self.config.request_timeout)?;
        let auth = AuthApi::new(anonymous, self.api_base())
            .log_in(username, password)
            .await?;
        self.install_token(auth.token.clone()).await?;
        info!("[Client] ✅ 登录完成");
        Ok(auth)
    }

    /// 登出：丢弃 token、断开 socket、清空本地状态
    pub async fn logout(&self) {
        info!("[Client] 👋 登出");
        self.disconnect().await;
        self.session.clear();
        if let Ok(mut guard) = self.http.write() {
            *guard = None;
        }
        *self.state.lock().await = ChatState::new();
        self.feed.lock().await.reset();
    }

    /// 获取当前用户资料；token 失效（401）时自动登出
    pub async fn load_my_profile(&self) -> Result<UserProfile> {
        let api = ProfileApi::new(self.authed_http()?, self.api_base());
        match api.get_my_profile().await {
            Ok(profile) => {
                self.remember_profile(&profile).await;
                Ok(profile)
            }
            Err(e) => {
                if is_unauthenticated(&e) {
                    warn!("[Client] 🔒 token 已失效，自动登出");
                    self.logout().await;
                }
                Err(e)
            }
        }
    }

    async fn remember_profile(&self, profile: &UserProfile) {
        let user_id = profile
            .user_id
            .clone()
            .or_else(|| self.session.claims().map(|c| c.sub))
            .unwrap_or_else(|| profile.id.clone());
        self.state
            .lock()
            .await
            .set_current_user(Some(ParticipantInfo {
                user_id,
                username: profile.username.clone(),
                first_name: profile.first_name.clone(),
                last_name: profile.last_name.clone(),
                avatar: profile.avatar.clone(),
            }));
    }

    pub async fn update_my_profile(&self, request: &UpdateProfileRequest) -> Result<UserProfile> {
        if request.is_empty() {
            return Err(anyhow::anyhow!("没有需要更新的字段"));
        }
        let profile = ProfileApi::new(self.authed_http()?, self.api_base())
            .update_my_profile(request)
            .await?;
        self.remember_profile(&profile).await;
        Ok(profile)
    }

    pub async fn update_avatar(&self, file_name: &str, bytes: Vec<u8>) -> Result<UserProfile> {
        let profile = ProfileApi::new(self.authed_http()?, self.api_base())
            .update_avatar(file_name, bytes)
            .await?;
        self.remember_profile(&profile).await;
        Ok(profile)
    }

    pub async fn search_users(&self, keyword: &str) -> Result<Vec<UserProfile>> {
        ProfileApi::new(self.authed_http()?, self.api_base())
            .search_users(keyword)
            .await
    }

    /// 加载下一页帖子，返回新增条数；已到末尾或已有请求在途时返回 0
    pub async fn load_next_posts(&self) -> Result<usize> {
        let api = PostApi::new(self.authed_http()?, self.api_base());
        let page = match self.feed.lock().await.begin_load() {
            Some(page) => page,
            None => {
                debug!("[Client] 帖子已全部加载或正在加载");
                return Ok(0);
            }
        };

        match api.get_my_posts(page, self.config.page_size).await {
            Ok(result) => Ok(self.feed.lock().await.apply_page(result)),
            Err(e) => {
                self.feed.lock().await.fail_load();
                Err(e)
            }
        }
    }

    pub async fn posts(&self) -> Vec<Post> {
        self.feed.lock().await.posts().to_vec()
    }

    pub async fn has_more_posts(&self) -> bool {
        self.feed.lock().await.has_more()
    }

    /// 发帖，成功后放到帖子流最前面
    pub async fn create_post(&self, content: &str) -> Result<Post> {
        let post = PostApi::new(self.authed_http()?, self.api_base())
            .create_post(content)
            .await?;
        self.feed.lock().await.prepend(post.clone());
        Ok(post)
    }

    /// 拉取会话列表；首次拉取会自动选中第一个会话并加载其历史消息
    pub async fn fetch_conversations(&self) -> Result<Vec<Conversation>> {
        let conversations = ConversationApi::new(self.authed_http()?, self.api_base())
            .get_my_conversations()
            .await?;

        let auto_selected = self
            .state
            .lock()
            .await
            .replace_conversations(conversations);
        self.notify_conversations().await;

        if let Some(id) = auto_selected {
            info!("[Client] 📌 自动选中会话 {}", id);
            self.load_history(&id).await?;
        }
        Ok(self.conversations().await)
    }

    /// 选中会话；首次选中时加载历史消息
    pub async fn select_conversation(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let needs_history = self
            .state
            .lock()
            .await
            .select_conversation(conversation_id)?;
        self.notify_conversations().await;

        if needs_history {
            self.load_history(conversation_id).await?;
        }
        Ok(self.messages(conversation_id).await)
    }

    async fn load_history(&self, conversation_id: &str) -> Result<()> {
        let history = MessageApi::new(self.authed_http()?, self.api_base())
            .get_messages(conversation_id)
            .await
            .with_context(|| format!("加载会话 {conversation_id} 的历史消息失败"))?;

        self.state
            .lock()
            .await
            .apply_history(conversation_id, history);
        self.notify_messages(conversation_id).await;
        self.notify_conversations().await;
        Ok(())
    }

    /// 与某个用户开始单聊：已有会话则直接选中，否则加到列表最前面
    pub async fn start_direct_chat(&self, user_id: &str) -> Result<Conversation> {
        let conversation = ConversationApi::new(self.authed_http()?, self.api_base())
            .create_conversation(ConversationType::Direct, vec![user_id.to_string()])
            .await?;

        let (is_new, needs_history) = {
            let mut state = self.state.lock().await;
            let is_new = state.open_conversation(conversation.clone());
            (is_new, state.needs_history(&conversation.id))
        };
        info!(
            "[Client] 💬 与 {} 的会话 {} ({})",
            user_id,
            conversation.id,
            if is_new { "新建" } else { "已存在" }
        );
        self.notify_conversations().await;

        if needs_history {
            self.load_history(&conversation.id).await?;
        }
        Ok(conversation)
    }

    /// 乐观发送消息
    ///
    /// 先插入带临时 ID 的本地消息并通知监听器，再请求服务器：
    /// 成功则替换为服务器消息，失败则标记 failed 并返回错误（不自动重试）
    pub async fn send_message(&self, conversation_id: &str, text: &str) -> Result<Message> {
        let http = self.authed_http()?;

        let local = self
            .state
            .lock()
            .await
            .begin_send(conversation_id, text, chrono::Utc::now())?;
        self.notify_messages(conversation_id).await;
        self.notify_conversations().await;

        let result = MessageApi::new(http, self.api_base())
            .create_message(conversation_id, text)
            .await;

        match result {
            Ok(confirmed) => {
                let stored = self
                    .state
                    .lock()
                    .await
                    .confirm_send(conversation_id, &local.id, confirmed)?;
                self.notify_messages(conversation_id).await;
                self.notify_conversations().await;
                Ok(stored)
            }
            Err(e) => {
                error!("[Client] ❌ 消息发送失败: {:#}", e);
                let marked = self
                    .state
                    .lock()
                    .await
                    .fail_send(conversation_id, &local.id);
                match marked {
                    Ok(failed) => {
                        self.notify_messages(conversation_id).await;
                        self.message_listener.on_send_failed(failed).await;
                    }
                    // 本地消息已不在（例如期间登出），只保留原始错误
                    Err(state_err) => warn!("[Client] ⚠️ 无法标记失败消息: {}", state_err),
                }
                Err(e)
            }
        }
    }

    /// 移除一条发送失败的消息
    pub async fn discard_failed_message(&self, conversation_id: &str, temp_id: &str) -> Result<()> {
        self.state
            .lock()
            .await
            .discard_failed(conversation_id, temp_id)?;
        self.notify_messages(conversation_id).await;
        Ok(())
    }

    /// 连接实时 socket，并在后台处理推送事件
    pub async fn connect(&self) -> Result<()> {
        let token = self
            .session
            .token()
            .ok_or_else(|| anyhow::anyhow!("未登录，无法连接 socket"))?;
        let version = EngineVersion::from_number(self.config.engine_io_version)?;
        let url = build_socket_url(&self.config.socket_url, &token, version)?;

        self.disconnect().await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = SocketConnection::connect(&url, version, tx).await?;
        *self.socket.lock().await = Some(connection);

        let client = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                client.handle_socket_event(event).await;
            }
            debug!("[Client] socket 事件通道已关闭");
        });
        Ok(())
    }

    /// 断开 socket（未连接时什么也不做）
    pub async fn disconnect(&self) {
        let connection = self.socket.lock().await.take();
        if let Some(connection) = connection {
            connection.disconnect().await;
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.socket
            .lock()
            .await
            .as_ref()
            .is_some_and(SocketConnection::is_connected)
    }

    async fn handle_socket_event(&self, event: SocketEvent) {
        match event {
            SocketEvent::Connected => {
                self.message_listener
                    .on_connection_status_changed(true, "连接成功".to_string())
                    .await;
            }
            SocketEvent::Disconnected(reason) => {
                warn!("[Client] 🔌 socket 已断开: {}", reason);
                self.message_listener
                    .on_connection_status_changed(false, reason)
                    .await;
            }
            SocketEvent::Message(message) => self.handle_incoming(message).await,
            SocketEvent::Other { name, .. } => {
                debug!("[Client] 忽略 socket 事件: {}", name);
            }
        }
    }

    async fn handle_incoming(&self, message: Message) {
        let conversation_id = message.conversation_id.clone();
        let outcome = self.state.lock().await.apply_incoming(message.clone());

        match outcome {
            IncomingOutcome::Duplicate => return,
            IncomingOutcome::Inserted { unread } => {
                debug!(
                    "[Client] 📨 会话 {} 新消息，未读 {}",
                    conversation_id, unread
                );
            }
            IncomingOutcome::UnknownConversation => {
                // 对方新建的会话，刷新列表后才能展示
                info!("[Client] 🆕 未知会话 {}，刷新会话列表", conversation_id);
                let client = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = client.fetch_conversations().await {
                        error!("[Client] ❌ 刷新会话列表失败: {:#}", e);
                    }
                });
            }
        }

        self.message_listener.on_recv_new_message(message).await;
        self.notify_messages(&conversation_id).await;
        self.notify_conversations().await;
    }

    async fn notify_conversations(&self) {
        let (conversations, total_unread) = {
            let state = self.state.lock().await;
            (state.conversations().to_vec(), state.total_unread())
        };
        self.conversation_listener
            .on_conversation_list_changed(conversations)
            .await;
        self.conversation_listener
            .on_total_unread_count_changed(total_unread)
            .await;
    }

    async fn notify_messages(&self, conversation_id: &str) {
        let messages = self.messages(conversation_id).await;
        self.message_listener
            .on_messages_changed(conversation_id.to_string(), messages)
            .await;
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state.lock().await.conversations().to_vec()
    }

    pub async fn selected_conversation(&self) -> Option<Conversation> {
        self.state.lock().await.selected_conversation().cloned()
    }

    pub async fn messages(&self, conversation_id: &str) -> Vec<Message> {
        self.state.lock().await.messages(conversation_id).to_vec()
    }

    pub async fn total_unread(&self) -> u32 {
        self.state.lock().await.total_unread()
    }
}

#[cfg(test)]
mod tests {
    use tracing::{error, info, warn};

    use super::{ChatClient, ClientConfig};
    use crate::im::conversation::{Conversation, ConversationListener};
    use crate::im::message::{Message, MessageListener};
    use crate::im::socket::SocketEvent;
    use crate::im::types::{is_unauthenticated, ApiError};
    use std::sync::{Arc, Mutex, Once};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    static INIT_LOGGER: Once = Once::new();

    fn init_test_logger() {
        INIT_LOGGER.call_once(|| {
            use tracing_subscriber::prelude::*;
            use tracing_subscriber::EnvFilter;

            // 测试中默认打开当前 crate 的 debug，关闭底层 HTTP 客户端的 debug 噪音
            let filter_layer = EnvFilter::new(
                "info,devteria_chat_core=debug,hyper_util::client=info,reqwest=info",
            );

            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_test_writer();

            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .init();
        });
    }

    #[derive(Default)]
    struct Recorder {
        received: Mutex<Vec<String>>,
        failed: Mutex<Vec<String>>,
        unread: Mutex<Vec<u32>>,
        status: Mutex<Vec<bool>>,
    }

    #[async_trait::async_trait]
    impl MessageListener for Recorder {
        async fn on_messages_changed(&self, _conversation_id: String, _messages: Vec<Message>) {}

        async fn on_recv_new_message(&self, message: Message) {
            self.received.lock().unwrap().push(message.id);
        }

        async fn on_send_failed(&self, message: Message) {
            self.failed.lock().unwrap().push(message.id);
        }

        async fn on_connection_status_changed(&self, connected: bool, _message: String) {
            self.status.lock().unwrap().push(connected);
        }
    }

    #[async_trait::async_trait]
    impl ConversationListener for Recorder {
        async fn on_conversation_list_changed(&self, _conversations: Vec<Conversation>) {}

        async fn on_total_unread_count_changed(&self, total_unread_count: u32) {
            self.unread.lock().unwrap().push(total_unread_count);
        }
    }

    fn conv(id: &str) -> Conversation {
        serde_json::from_value(serde_json::json!({ "id": id, "type": "DIRECT" })).unwrap()
    }

    fn incoming(id: &str, conversation_id: &str) -> Message {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "conversationId": conversation_id,
            "me": false,
            "message": "hey",
            "sender": {"userId": "bob"},
            "createdDate": "2024-05-01T10:00:00Z"
        }))
        .unwrap()
    }

    /// 本地单次网关：读完一个请求后（等待 `release` 放行）返回固定响应
    async fn spawn_gateway(
        status: &'static str,
        body: &'static str,
        release: Option<oneshot::Receiver<()>>,
    ) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let mut expected = None;
            loop {
                if expected.is_none() {
                    if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                        let body_len = head
                            .lines()
                            .find_map(|l| l.strip_prefix("content-length:"))
                            .and_then(|v| v.trim().parse::<usize>().ok())
                            .unwrap_or(0);
                        expected = Some(end + 4 + body_len);
                    }
                }
                if expected.is_some_and(|len| buf.len() >= len) {
                    break;
                }
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
            if let Some(release) = release {
                let _ = release.await;
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });
        format!("http://{addr}/api/v1")
    }

    fn client_with_recorder(config: ClientConfig) -> (ChatClient, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let mut client = ChatClient::new(config);
        client.set_message_listener(recorder.clone());
        client.set_conversation_listener(recorder.clone());
        (client, recorder)
    }

    #[test]
    fn default_config_points_to_local_gateway() {
        let config = ClientConfig::new();
        assert_eq!(config.api_base_url, "http://localhost:8888/api/v1");
        assert_eq!(config.socket_url, "http://localhost:8099");
        assert_eq!(config.engine_io_version, 4);
        assert_eq!(config.page_size, 10);
    }

    #[tokio::test]
    async fn socket_messages_are_deduplicated_and_counted() {
        init_test_logger();
        let (client, recorder) = client_with_recorder(ClientConfig::new());
        client
            .state
            .lock()
            .await
            .replace_conversations(vec![conv("c1"), conv("c2")]);

        client
            .handle_socket_event(SocketEvent::Message(incoming("m1", "c2")))
            .await;
        client
            .handle_socket_event(SocketEvent::Message(incoming("m1", "c2")))
            .await;

        assert_eq!(*recorder.received.lock().unwrap(), ["m1"]);
        assert_eq!(client.total_unread().await, 1);
        assert_eq!(recorder.unread.lock().unwrap().last(), Some(&1));
        assert_eq!(client.messages("c2").await.len(), 1);
    }

    #[tokio::test]
    async fn connection_events_reach_listener() {
        let (client, recorder) = client_with_recorder(ClientConfig::new());
        client.handle_socket_event(SocketEvent::Connected).await;
        client
            .handle_socket_event(SocketEvent::Disconnected("bye".into()))
            .await;
        assert_eq!(*recorder.status.lock().unwrap(), [true, false]);
    }

    #[tokio::test]
    async fn requires_login_before_authenticated_calls() {
        let client = ChatClient::new(ClientConfig::new());
        assert!(!client.is_authenticated());
        assert!(client.fetch_conversations().await.is_err());
        assert!(client.send_message("c1", "hi").await.is_err());
        assert!(client.connect().await.is_err());
    }

    #[tokio::test]
    async fn failed_send_keeps_message_marked_failed() {
        init_test_logger();
        let mut config = ClientConfig::new();
        // 没有服务监听的端口，请求会立即失败
        config.api_base_url = "http://127.0.0.1:1/api/v1".to_string();
        config.request_timeout = std::time::Duration::from_secs(2);
        let (client, recorder) = client_with_recorder(config);
        client.install_token("a.b.c".to_string()).await.unwrap();
        client
            .state
            .lock()
            .await
            .replace_conversations(vec![conv("c1")]);

        assert!(client.send_message("c1", "hello").await.is_err());

        let messages = client.messages("c1").await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].failed && !messages[0].pending);
        assert_eq!(*recorder.failed.lock().unwrap(), [messages[0].id.clone()]);
        assert_eq!(
            client.conversations().await[0].last_message.as_deref(),
            Some("hello")
        );

        client
            .discard_failed_message("c1", &messages[0].id)
            .await
            .unwrap();
        assert!(client.messages("c1").await.is_empty());
    }

    #[tokio::test]
    async fn logout_clears_local_state() {
        let (client, _) = client_with_recorder(ClientConfig::new());
        client.install_token("a.b.c".to_string()).await.unwrap();
        client
            .state
            .lock()
            .await
            .replace_conversations(vec![conv("c1")]);
        assert!(client.is_authenticated());

        client.logout().await;
        assert!(!client.is_authenticated());
        assert!(client.conversations().await.is_empty());
        assert!(client.search_users("bob").await.is_err());
    }

    #[tokio::test]
    async fn expired_token_on_profile_load_logs_out() {
        init_test_logger();
        let mut config = ClientConfig::new();
        config.api_base_url = spawn_gateway(
            "401 Unauthorized",
            r#"{"code":1006,"message":"Unauthenticated"}"#,
            None,
        )
        .await;
        let (client, _) = client_with_recorder(config);
        client.install_token("a.b.c".to_string()).await.unwrap();
        client
            .state
            .lock()
            .await
            .replace_conversations(vec![conv("c1")]);

        let err = client.load_my_profile().await.unwrap_err();
        assert!(is_unauthenticated(&err));
        assert!(!client.is_authenticated());
        assert!(client.conversations().await.is_empty());
        assert!(client.fetch_conversations().await.is_err());
    }

    #[tokio::test]
    async fn send_failure_after_logout_keeps_network_error() {
        init_test_logger();
        let (release_tx, release_rx) = oneshot::channel();
        let mut config = ClientConfig::new();
        config.api_base_url = spawn_gateway(
            "500 Internal Server Error",
            r#"{"code":9999,"message":"boom"}"#,
            Some(release_rx),
        )
        .await;
        let (client, recorder) = client_with_recorder(config);
        client.install_token("a.b.c".to_string()).await.unwrap();
        client
            .state
            .lock()
            .await
            .replace_conversations(vec![conv("c1")]);

        let sender = client.clone();
        let send = tokio::spawn(async move { sender.send_message("c1", "hello").await });
        for _ in 0..200 {
            if !client.messages("c1").await.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        // 请求在途时登出，临时消息随状态一起被清掉
        client.logout().await;
        release_tx.send(()).unwrap();

        let err = send.await.unwrap().unwrap_err();
        match err.downcast_ref::<ApiError>() {
            Some(ApiError::Http { status, .. }) => assert_eq!(*status, 500),
            other => panic!("unexpected error: {other:?} ({err:#})"),
        }
        assert!(client.messages("c1").await.is_empty());
        assert!(recorder.failed.lock().unwrap().is_empty());
    }

    /// 需要本地运行完整后端：
    /// DEVTERIA_USERNAME=... DEVTERIA_PASSWORD=... cargo test run_chat_client -- --ignored
    #[tokio::test]
    #[ignore]
    async fn run_chat_client() {
        init_test_logger();

        let username = std::env::var("DEVTERIA_USERNAME").unwrap_or_else(|_| "admin".into());
        let password = std::env::var("DEVTERIA_PASSWORD").unwrap_or_else(|_| "admin".into());

        struct LogListener;

        #[async_trait::async_trait]
        impl MessageListener for LogListener {
            async fn on_messages_changed(&self, conversation_id: String, messages: Vec<Message>) {
                info!(
                    "[回调/消息] 📋 会话 {} 消息数: {}",
                    conversation_id,
                    messages.len()
                );
            }

            async fn on_recv_new_message(&self, message: Message) {
                info!("[回调/消息] 📨 新消息: {} -> {}", message.id, message.message);
            }

            async fn on_send_failed(&self, message: Message) {
                error!("[回调/消息] ❌ 发送失败: {}", message.id);
            }

            async fn on_connection_status_changed(&self, connected: bool, message: String) {
                if connected {
                    info!("[回调/消息] 🔗 已连接 - {}", message);
                } else {
                    warn!("[回调/消息] 🔗 断开 - {}", message);
                }
            }
        }

        #[async_trait::async_trait]
        impl ConversationListener for LogListener {
            async fn on_conversation_list_changed(&self, conversations: Vec<Conversation>) {
                info!("[回调/会话] 🔄 会话数: {}", conversations.len());
            }

            async fn on_total_unread_count_changed(&self, total_unread_count: u32) {
                info!("[回调/会话] 📬 总未读: {}", total_unread_count);
            }
        }

        let mut client = ChatClient::new(ClientConfig::new());
        client.set_message_listener(Arc::new(LogListener));
        client.set_conversation_listener(Arc::new(LogListener));

        if let Err(e) = client.login(&username, &password).await {
            error!("登录失败: {:#}", e);
            return;
        }
        match client.load_my_profile().await {
            Ok(profile) => info!("👤 当前用户: {}", profile.display_name()),
            Err(e) => error!("获取资料失败: {:#}", e),
        }
        if let Err(e) = client.connect().await {
            error!("连接失败: {:#}", e);
            return;
        }

        match client.fetch_conversations().await {
            Ok(conversations) => {
                if let Some(first) = conversations.first() {
                    match client.send_message(&first.id, "Hello from Rust client!").await {
                        Ok(msg) => info!("✅ 消息已确认: {}", msg.id),
                        Err(e) => error!("消息发送失败: {:#}", e),
                    }
                }
            }
            Err(e) => error!("拉取会话失败: {:#}", e),
        }

        info!("📥 客户端运行中，等待消息推送...");
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        client.disconnect().await;
    }
}
