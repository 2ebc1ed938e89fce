//! 内存适配器：测试和本地开发用，无需数据库。

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use application::{MessageRepository, RideDirectory};
use domain::{ChatMessage, MessageId, RepositoryError, RideId, Timestamp, UserId};

/// 内存中的消息存储
///
/// 消息按插入顺序保存，查询时按 (created_at, id) 排序，
/// 与Postgres适配器保持同一排序契约。
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<ChatMessage>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_room_messages(
        messages: &[ChatMessage],
        ride_id: RideId,
        before: Option<Timestamp>,
    ) -> Vec<ChatMessage> {
        let mut in_room: Vec<ChatMessage> = messages
            .iter()
            .filter(|m| m.ride_id == ride_id)
            .filter(|m| before.map_or(true, |b| m.created_at < b))
            .cloned()
            .collect();
        in_room.sort_by(|a, b| {
            (a.created_at, uuid::Uuid::from(a.id)).cmp(&(b.created_at, uuid::Uuid::from(b.id)))
        });
        in_room
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageStore {
    async fn create(&self, message: ChatMessage) -> Result<ChatMessage, RepositoryError> {
        let mut messages = self.messages.write().await;
        messages.push(message.clone());
        Ok(message)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<ChatMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages.iter().find(|m| m.id == id).cloned())
    }

    async fn list_page(
        &self,
        ride_id: RideId,
        offset: u64,
        limit: u32,
        before: Option<Timestamp>,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(Self::sorted_room_messages(&messages, ride_id, before)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count(
        &self,
        ride_id: RideId,
        before: Option<Timestamp>,
    ) -> Result<u64, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|m| m.ride_id == ride_id)
            .filter(|m| before.map_or(true, |b| m.created_at < b))
            .count() as u64)
    }

    async fn mark_read_until(
        &self,
        ride_id: RideId,
        reader: UserId,
        up_to: Timestamp,
    ) -> Result<u64, RepositoryError> {
        let mut messages = self.messages.write().await;
        let mut newly = 0;
        for message in messages
            .iter_mut()
            .filter(|m| m.ride_id == ride_id && m.created_at <= up_to)
        {
            if message.mark_read_by(reader) {
                newly += 1;
            }
        }
        Ok(newly)
    }
}

/// 预置行程集合的目录适配器
#[derive(Default)]
pub struct StaticRideDirectory {
    rides: RwLock<HashSet<RideId>>,
}

impl StaticRideDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rides(rides: &[RideId]) -> Self {
        Self {
            rides: RwLock::new(rides.iter().copied().collect()),
        }
    }

    pub async fn add_ride(&self, ride_id: RideId) {
        self.rides.write().await.insert(ride_id);
    }
}

#[async_trait]
impl RideDirectory for StaticRideDirectory {
    async fn ride_exists(&self, ride_id: RideId) -> Result<bool, RepositoryError> {
        Ok(self.rides.read().await.contains(&ride_id))
    }
}
