#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use application::{ChatService, ChatServiceDependencies, RoomBroadcaster, SystemClock};
use config::{ChatConfig, JwtConfig};
use domain::{RideId, UserId, UserIdentity};
use infrastructure::{InMemoryMessageStore, StaticRideDirectory};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;
use web_api::{router, AppState, JwtService, RoomRegistry};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestApp {
    pub addr: SocketAddr,
    pub ride_id: Uuid,
    pub other_ride_id: Uuid,
    jwt: JwtService,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestApp {
    /// 给测试用户签发凭证；显示名进入JWT claims
    pub fn credentials_for(&self, name: &str) -> (Uuid, String) {
        let user_id = Uuid::new_v4();
        let identity = UserIdentity::new(UserId::from(user_id), name);
        let token = self.jwt.generate_token(&identity).expect("token");
        (user_id, token)
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/api/v1/ws?token={}", self.addr, token)
    }

    pub async fn connect_ws(&self, token: &str) -> WsClient {
        let (ws, _) = connect_async(self.ws_url(token)).await.expect("ws connect");
        ws
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// 在随机端口上起一个完整服务：内存存储 + 预置两个行程
pub async fn spawn_app() -> TestApp {
    let jwt_config = JwtConfig {
        secret: "integration-test-secret-key-0123456789".to_string(),
        expiration_hours: 24,
    };
    let chat_config = ChatConfig::default();

    let ride_id = Uuid::new_v4();
    let other_ride_id = Uuid::new_v4();
    let directory = Arc::new(StaticRideDirectory::with_rides(&[
        RideId::from(ride_id),
        RideId::from(other_ride_id),
    ]));

    let store = Arc::new(InMemoryMessageStore::new());
    let registry = Arc::new(RoomRegistry::new());

    let chat_service = Arc::new(ChatService::new(
        ChatServiceDependencies {
            message_repository: store,
            ride_directory: directory,
            clock: Arc::new(SystemClock),
            broadcaster: registry.clone() as Arc<dyn RoomBroadcaster>,
        },
        &chat_config,
    ));

    let jwt = JwtService::new(&jwt_config);
    let state = AppState::new(
        chat_service,
        registry,
        Arc::new(jwt.clone()),
        &chat_config,
    );

    let app = router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    // allow server to start
    tokio::time::sleep(Duration::from_millis(100)).await;

    TestApp {
        addr,
        ride_id,
        other_ride_id,
        jwt,
        shutdown: Some(shutdown_tx),
    }
}

/// 读取下一条文本帧并解析成JSON；5秒拿不到就失败
pub async fn next_frame(ws: &mut WsClient) -> serde_json::Value {
    use futures_util::StreamExt;
    use tokio_tungstenite::tungstenite::Message;

    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("transport error");
        if let Message::Text(payload) = message {
            return serde_json::from_str(payload.as_str()).expect("frame json");
        }
    }
}

/// 跳过无关帧，直到读到指定类型
pub async fn next_frame_of(ws: &mut WsClient, frame_type: &str) -> serde_json::Value {
    for _ in 0..10 {
        let frame = next_frame(ws).await;
        if frame["type"] == frame_type {
            return frame;
        }
    }
    panic!("frame of type {:?} never arrived", frame_type);
}

/// 断言一段时间内没有任何帧到达
pub async fn assert_silent(ws: &mut WsClient, window: Duration) {
    use futures_util::StreamExt;

    let result = tokio::time::timeout(window, ws.next()).await;
    assert!(
        result.is_err(),
        "expected silence but received {:?}",
        result.unwrap()
    );
}

pub async fn join_room(ws: &mut WsClient, ride_id: Uuid) {
    use futures_util::SinkExt;
    use tokio_tungstenite::tungstenite::Message;

    let frame = serde_json::json!({"type": "join_room", "ride_id": ride_id});
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("send join");
    let ack = next_frame_of(ws, "room_joined").await;
    assert_eq!(ack["ride_id"], ride_id.to_string());
}

pub async fn send_text(ws: &mut WsClient, ride_id: Uuid, text: &str) {
    use futures_util::SinkExt;
    use tokio_tungstenite::tungstenite::Message;

    let frame = serde_json::json!({"type": "send_message", "ride_id": ride_id, "text": text});
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("send message");
}
