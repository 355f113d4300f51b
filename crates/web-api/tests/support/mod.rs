#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use application::{
    registry::memory::MemorySessionRegistry, repository::memory::InMemoryMessageRepository,
    AuthPolicy, DeliveryService, DeliveryServiceDependencies, NoopNotificationSink,
    NotificationPolicy, SessionRegistry, SystemClock,
};
use chrono::Utc;
use domain::UserId;
use futures_util::{SinkExt, StreamExt};
use infrastructure::JwtCredentialVerifier;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::{net::TcpListener, sync::oneshot};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState, UploadSettings};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const SECRET: &[u8] = b"integration-test-secret-0123456789";

pub struct TestServer {
    pub addr: SocketAddr,
    pub repository: Arc<InMemoryMessageRepository>,
    pub registry: Arc<MemorySessionRegistry>,
    pub upload_dir: TempDir,
    issuer: JwtCredentialVerifier,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let clock = Arc::new(SystemClock);
        let repository = Arc::new(InMemoryMessageRepository::new(clock.clone()));
        let registry = Arc::new(MemorySessionRegistry::new());

        let service = DeliveryService::new(DeliveryServiceDependencies {
            message_repository: repository.clone(),
            session_registry: registry.clone(),
            credential_verifier: Arc::new(JwtCredentialVerifier::new(
                SECRET,
                chrono::Duration::hours(1),
            )),
            notification_sink: Arc::new(NoopNotificationSink),
            clock,
            auth_policy: AuthPolicy::SessionBound,
            notification_policy: NotificationPolicy::OfflineOnly,
        });

        let upload_dir = tempfile::tempdir().expect("temp upload dir");
        let uploads = UploadSettings::new(
            upload_dir.path(),
            &["png".to_string(), "jpg".to_string(), "pdf".to_string()],
            1024 * 1024,
        );
        let app = router(AppState::new(Arc::new(service), uploads));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
        });

        Self {
            addr,
            repository,
            registry,
            upload_dir,
            issuer: JwtCredentialVerifier::new(SECRET, chrono::Duration::hours(1)),
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn token_for(&self, user: i64) -> String {
        self.issuer.issue(UserId(user), Utc::now()).expect("issue token")
    }

    pub fn ws_url(&self, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("ws://{}/api/v1/ws?token={}", self.addr, token),
            None => format!("ws://{}/api/v1/ws", self.addr),
        }
    }

    /// 建立连接并消费 `connection_success`
    pub async fn connect(&self, user: i64) -> WsClient {
        let (mut ws, _) = connect_async(self.ws_url(Some(&self.token_for(user))))
            .await
            .expect("websocket connect");
        let hello = next_event(&mut ws).await;
        assert_eq!(hello["event"], "connection_success");
        assert_eq!(hello["data"]["user_id"], user);
        ws
    }

    /// 连接、加入并等待注册表生效
    pub async fn connect_joined(&self, user: i64) -> WsClient {
        let before = self.registry.sessions_for(UserId(user)).await.len();
        let mut ws = self.connect(user).await;
        send_event(&mut ws, "join", json!({ "user_id": user })).await;
        self.wait_for_sessions(user, before + 1).await;
        ws
    }

    pub async fn wait_for_sessions(&self, user: i64, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if self.registry.sessions_for(UserId(user)).await.len() == expected {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("registry did not reach expected session count");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn send_event(ws: &mut WsClient, event: &str, data: Value) {
    let frame = json!({ "event": event, "data": data }).to_string();
    ws.send(TungsteniteMessage::Text(frame.into()))
        .await
        .expect("send frame");
}

pub async fn send_raw(ws: &mut WsClient, text: &str) {
    ws.send(TungsteniteMessage::Text(text.to_string().into()))
        .await
        .expect("send frame");
}

/// 读取下一个文本帧并解析为 JSON
pub async fn next_event(ws: &mut WsClient) -> Value {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                Some(Ok(TungsteniteMessage::Text(text))) => {
                    return serde_json::from_str::<Value>(text.as_str()).expect("json frame")
                }
                Some(Ok(_)) => continue,
                other => panic!("websocket closed: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// 断言在短时间内没有任何事件到达
pub async fn assert_silent(ws: &mut WsClient) {
    let result = tokio::time::timeout(Duration::from_millis(150), ws.next()).await;
    assert!(result.is_err(), "unexpected frame: {result:?}");
}
