//! 房间注册表
//!
//! 进程内的连接-房间簿记，支撑 O(房间人数) 的扇出。状态不落盘：
//! 进程重启后由客户端重连并重新 join 来重建。多实例部署需要共享
//! pub/sub 层承接跨进程扇出，当前实现是显式的单进程限定。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use application::{BroadcastError, MessageBroadcast, MessageDto, RoomBroadcaster};
use domain::{RideId, UserIdentity};

use crate::websocket::ServerFrame;

pub type ConnectionId = Uuid;

struct ConnectionEntry {
    identity: UserIdentity,
    sender: mpsc::UnboundedSender<ServerFrame>,
    rooms: HashSet<RideId>,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<RideId, HashSet<ConnectionId>>,
}

#[derive(Default)]
pub struct RoomRegistry {
    inner: RwLock<RegistryInner>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个已认证的连接，返回连接ID
    pub async fn register(
        &self,
        identity: UserIdentity,
        sender: mpsc::UnboundedSender<ServerFrame>,
    ) -> ConnectionId {
        let connection_id = Uuid::new_v4();
        let mut inner = self.inner.write().await;
        inner.connections.insert(
            connection_id,
            ConnectionEntry {
                identity,
                sender,
                rooms: HashSet::new(),
            },
        );
        connection_id
    }

    /// 注销连接并返回其离开的所有房间（用于补发 user_left 通知）
    pub async fn unregister(&self, connection_id: ConnectionId) -> Vec<RideId> {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.connections.remove(&connection_id) else {
            return Vec::new();
        };

        let rooms: Vec<RideId> = entry.rooms.into_iter().collect();
        for ride_id in &rooms {
            if let Some(members) = inner.rooms.get_mut(ride_id) {
                members.remove(&connection_id);
                if members.is_empty() {
                    inner.rooms.remove(ride_id);
                }
            }
        }
        rooms
    }

    /// 把连接加入房间；重复加入返回 false 且无其他效果
    pub async fn join(&self, connection_id: ConnectionId, ride_id: RideId) -> bool {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let Some(entry) = inner.connections.get_mut(&connection_id) else {
            return false;
        };
        if !entry.rooms.insert(ride_id) {
            return false;
        }
        inner.rooms.entry(ride_id).or_default().insert(connection_id);
        true
    }

    /// 把连接移出房间；返回之前是否是成员。对非成员是无操作。
    pub async fn leave(&self, connection_id: ConnectionId, ride_id: RideId) -> bool {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let Some(entry) = inner.connections.get_mut(&connection_id) else {
            return false;
        };
        if !entry.rooms.remove(&ride_id) {
            return false;
        }
        if let Some(members) = inner.rooms.get_mut(&ride_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                inner.rooms.remove(&ride_id);
            }
        }
        true
    }

    pub async fn is_member(&self, connection_id: ConnectionId, ride_id: RideId) -> bool {
        let inner = self.inner.read().await;
        inner
            .connections
            .get(&connection_id)
            .map(|entry| entry.rooms.contains(&ride_id))
            .unwrap_or(false)
    }

    pub async fn members_of(&self, ride_id: RideId) -> Vec<ConnectionId> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(&ride_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn identity_of(&self, connection_id: ConnectionId) -> Option<UserIdentity> {
        let inner = self.inner.read().await;
        inner
            .connections
            .get(&connection_id)
            .map(|entry| entry.identity.clone())
    }

    /// 给单个连接发帧。连接已死时静默丢弃，注销由断连路径完成。
    pub async fn send_to(&self, connection_id: ConnectionId, frame: ServerFrame) {
        let inner = self.inner.read().await;
        if let Some(entry) = inner.connections.get(&connection_id) {
            if entry.sender.send(frame).is_err() {
                tracing::debug!(%connection_id, "dropping frame for closed connection");
            }
        }
    }

    /// 给房间内所有成员（可排除一个连接）发帧
    pub async fn broadcast(
        &self,
        ride_id: RideId,
        frame: ServerFrame,
        except: Option<ConnectionId>,
    ) {
        let inner = self.inner.read().await;
        let Some(members) = inner.rooms.get(&ride_id) else {
            return;
        };
        for connection_id in members {
            if Some(*connection_id) == except {
                continue;
            }
            if let Some(entry) = inner.connections.get(connection_id) {
                if entry.sender.send(frame.clone()).is_err() {
                    tracing::debug!(%connection_id, "dropping frame for closed connection");
                }
            }
        }
    }
}

#[async_trait]
impl RoomBroadcaster for RoomRegistry {
    async fn broadcast(&self, payload: MessageBroadcast) -> Result<(), BroadcastError> {
        let frame = ServerFrame::NewMessage {
            message: MessageDto::from(&payload.message),
        };
        // 发送者也在成员集合里，同样通过扇出收到自己的消息
        RoomRegistry::broadcast(self, payload.ride_id, frame, None).await;
        Ok(())
    }
}
