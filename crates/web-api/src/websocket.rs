//! WebSocket 协议引擎
//!
//! 连接建立时做一次凭证校验，之后暴露房间级操作：
//! join / leave / send / typing。presence 事件只广播不落盘；
//! 断连后不做服务端会话恢复，客户端重连、重新 join，
//! 再通过 REST 网关补历史。

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use application::{ApplicationError, MessageDto, SendMessageRequest};
use domain::{RideId, UserIdentity};

use crate::error::ApiError;
use crate::registry::ConnectionId;
use crate::state::AppState;

/// 客户端到服务端的帧
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    JoinRoom { ride_id: Uuid },
    LeaveRoom { ride_id: Uuid },
    SendMessage { ride_id: Uuid, text: String },
    Typing { ride_id: Uuid },
    StopTyping { ride_id: Uuid },
}

/// 服务端到客户端的帧
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    RoomJoined {
        ride_id: Uuid,
    },
    RoomLeft {
        ride_id: Uuid,
    },
    /// 发送方的确认，携带落盘后的消息
    MessageAck {
        message: MessageDto,
    },
    /// 房间扇出的消息，发送方同样收到
    NewMessage {
        message: MessageDto,
    },
    UserJoined {
        ride_id: Uuid,
        user_id: Uuid,
        name: String,
    },
    UserLeft {
        ride_id: Uuid,
        user_id: Uuid,
        name: String,
    },
    UserTyping {
        ride_id: Uuid,
        user_id: Uuid,
        name: String,
    },
    UserStoppedTyping {
        ride_id: Uuid,
        user_id: Uuid,
        name: String,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerFrame {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    fn from_application_error(err: &ApplicationError) -> Self {
        use domain::DomainError;

        match err {
            ApplicationError::Domain(DomainError::RideNotFound) => {
                Self::error("RIDE_NOT_FOUND", "ride not found")
            }
            ApplicationError::Domain(DomainError::MessageNotFound) => {
                Self::error("MESSAGE_NOT_FOUND", "message not found")
            }
            ApplicationError::Domain(DomainError::InvalidArgument { field, reason }) => {
                Self::error("INVALID_MESSAGE", format!("{}: {}", field, reason))
            }
            err if err.is_retryable() => {
                Self::error("SEND_FAILED", "temporary storage failure, retry")
            }
            other => Self::error("INTERNAL", other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// 承载凭证，与REST侧同一签发方
    pub token: String,
}

/// WebSocket 连接升级：先验证凭证再升级，失败直接 401
pub async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let identity = state.verify_credential(&query.token).await?;
    info!(user_id = %identity.user_id, "websocket upgrade");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, identity)))
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: UserIdentity) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();

    let connection_id = state.registry.register(identity.clone(), tx).await;
    debug!(%connection_id, user_id = %identity.user_id, "connection registered");

    // 发送任务：把连接队列里的帧序列化后写到socket
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let payload = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize websocket frame");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // 接收任务：解析客户端帧并分发
    let recv_state = state.clone();
    let recv_identity = identity.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(WsMessage::Text(text)) => {
                    handle_text_frame(&recv_state, connection_id, &recv_identity, text.as_str())
                        .await;
                }
                Ok(WsMessage::Close(_)) => {
                    debug!(%connection_id, "connection closed by client");
                    break;
                }
                Ok(_) => {
                    // ping/pong 由axum处理；二进制帧不支持
                }
                Err(err) => {
                    debug!(%connection_id, error = %err, "websocket transport error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    // 清理：丢弃成员关系，给每个残留房间补发离开通知
    let rooms = state.registry.unregister(connection_id).await;
    for ride_id in rooms {
        state
            .registry
            .broadcast(
                ride_id,
                ServerFrame::UserLeft {
                    ride_id: Uuid::from(ride_id),
                    user_id: Uuid::from(identity.user_id),
                    name: identity.display_name.clone(),
                },
                None,
            )
            .await;
    }
    info!(%connection_id, user_id = %identity.user_id, "connection cleaned up");
}

async fn handle_text_frame(
    state: &AppState,
    connection_id: ConnectionId,
    identity: &UserIdentity,
    text: &str,
) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            state
                .registry
                .send_to(
                    connection_id,
                    ServerFrame::error("BAD_FRAME", format!("malformed frame: {}", err)),
                )
                .await;
            return;
        }
    };

    match frame {
        ClientFrame::JoinRoom { ride_id } => {
            handle_join(state, connection_id, identity, ride_id).await;
        }
        ClientFrame::LeaveRoom { ride_id } => {
            handle_leave(state, connection_id, identity, ride_id).await;
        }
        ClientFrame::SendMessage { ride_id, text } => {
            handle_send(state, connection_id, identity, ride_id, text).await;
        }
        ClientFrame::Typing { ride_id } => {
            handle_typing(state, connection_id, identity, ride_id, true).await;
        }
        ClientFrame::StopTyping { ride_id } => {
            handle_typing(state, connection_id, identity, ride_id, false).await;
        }
    }
}

async fn handle_join(
    state: &AppState,
    connection_id: ConnectionId,
    identity: &UserIdentity,
    ride_id: Uuid,
) {
    let ride = RideId::from(ride_id);

    // 行程必须存在，校验失败无任何副作用
    if let Err(err) = state.chat_service.verify_room(ride).await {
        state
            .registry
            .send_to(connection_id, ServerFrame::from_application_error(&err))
            .await;
        return;
    }

    let newly_joined = state.registry.join(connection_id, ride).await;
    if newly_joined {
        // 只有首次加入才对其他成员发 presence 事件，重复 join 是无操作
        state
            .registry
            .broadcast(
                ride,
                ServerFrame::UserJoined {
                    ride_id,
                    user_id: Uuid::from(identity.user_id),
                    name: identity.display_name.clone(),
                },
                Some(connection_id),
            )
            .await;
        info!(user_id = %identity.user_id, %ride, "joined room");
    }

    state
        .registry
        .send_to(connection_id, ServerFrame::RoomJoined { ride_id })
        .await;
}

async fn handle_leave(
    state: &AppState,
    connection_id: ConnectionId,
    identity: &UserIdentity,
    ride_id: Uuid,
) {
    let ride = RideId::from(ride_id);

    let was_member = state.registry.leave(connection_id, ride).await;
    if was_member {
        state
            .registry
            .broadcast(
                ride,
                ServerFrame::UserLeft {
                    ride_id,
                    user_id: Uuid::from(identity.user_id),
                    name: identity.display_name.clone(),
                },
                Some(connection_id),
            )
            .await;
        info!(user_id = %identity.user_id, %ride, "left room");
    }

    // 离开永远成功，包括本来就不在房间里的情况
    state
        .registry
        .send_to(connection_id, ServerFrame::RoomLeft { ride_id })
        .await;
}

async fn handle_send(
    state: &AppState,
    connection_id: ConnectionId,
    identity: &UserIdentity,
    ride_id: Uuid,
    text: String,
) {
    let ride = RideId::from(ride_id);

    if !state.registry.is_member(connection_id, ride).await {
        state
            .registry
            .send_to(
                connection_id,
                ServerFrame::error("NOT_IN_ROOM", "join the room before sending messages"),
            )
            .await;
        return;
    }

    // 服务负责校验、落盘和向全房间扇出；这里只补发送方的确认帧
    match state
        .chat_service
        .send_message(SendMessageRequest {
            ride_id,
            sender: identity.clone(),
            text,
        })
        .await
    {
        Ok(stored) => {
            state
                .registry
                .send_to(
                    connection_id,
                    ServerFrame::MessageAck {
                        message: MessageDto::from(&stored),
                    },
                )
                .await;
        }
        Err(err) => {
            // 落盘失败的消息不会被广播，只有发送方看到失败
            state
                .registry
                .send_to(connection_id, ServerFrame::from_application_error(&err))
                .await;
        }
    }
}

async fn handle_typing(
    state: &AppState,
    connection_id: ConnectionId,
    identity: &UserIdentity,
    ride_id: Uuid,
    started: bool,
) {
    let ride = RideId::from(ride_id);

    // fire-and-forget：非成员的输入事件直接忽略，也不回错误
    if !state.registry.is_member(connection_id, ride).await {
        return;
    }

    let user_id = Uuid::from(identity.user_id);
    let name = identity.display_name.clone();
    let frame = if started {
        ServerFrame::UserTyping {
            ride_id,
            user_id,
            name,
        }
    } else {
        ServerFrame::UserStoppedTyping {
            ride_id,
            user_id,
            name,
        }
    };

    state.registry.broadcast(ride, frame, Some(connection_id)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_deserialize_from_tagged_json() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"type":"send_message","ride_id":"7f0f9a46-13b7-4fd1-a207-5e7f2c3b6f7e","text":"hi"}"#,
        )
        .unwrap();
        assert!(matches!(frame, ClientFrame::SendMessage { text, .. } if text == "hi"));

        let frame: ClientFrame = serde_json::from_str(
            r#"{"type":"typing","ride_id":"7f0f9a46-13b7-4fd1-a207-5e7f2c3b6f7e"}"#,
        )
        .unwrap();
        assert!(matches!(frame, ClientFrame::Typing { .. }));
    }

    #[test]
    fn unknown_frame_type_is_rejected() {
        let result = serde_json::from_str::<ClientFrame>(r#"{"type":"self_destruct"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn server_frames_serialize_with_type_tag() {
        let ride_id = Uuid::new_v4();
        let json = serde_json::to_value(ServerFrame::RoomJoined { ride_id }).unwrap();
        assert_eq!(json["type"], "room_joined");
        assert_eq!(json["ride_id"], ride_id.to_string());

        let json = serde_json::to_value(ServerFrame::error("NOT_IN_ROOM", "join first")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "NOT_IN_ROOM");
    }
}
