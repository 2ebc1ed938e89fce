use async_trait::async_trait;
use domain::{ChatMessage, MessageId, RepositoryError, RideId, Timestamp, UserId};

/// 消息存储端口
///
/// 消息是按房间排序的追加日志；除 read_by 集合外不存在任何更新。
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 持久化一条新消息，返回落盘后的消息
    async fn create(&self, message: ChatMessage) -> Result<ChatMessage, RepositoryError>;

    async fn find_by_id(&self, id: MessageId) -> Result<Option<ChatMessage>, RepositoryError>;

    /// 按 (created_at, id) 升序返回一页消息；
    /// `before` 限定只返回严格早于该时间戳的消息
    async fn list_page(
        &self,
        ride_id: RideId,
        offset: u64,
        limit: u32,
        before: Option<Timestamp>,
    ) -> Result<Vec<ChatMessage>, RepositoryError>;

    async fn count(
        &self,
        ride_id: RideId,
        before: Option<Timestamp>,
    ) -> Result<u64, RepositoryError>;

    /// 将房间内 created_at <= up_to 的消息全部标记为 reader 已读，
    /// 返回本次新增标记的条数。重复调用不产生额外效果。
    async fn mark_read_until(
        &self,
        ride_id: RideId,
        reader: UserId,
        up_to: Timestamp,
    ) -> Result<u64, RepositoryError>;
}

/// 行程目录端口
///
/// 行程由外部的发布子系统管理，聊天侧只需要存在性校验。
#[async_trait]
pub trait RideDirectory: Send + Sync {
    async fn ride_exists(&self, ride_id: RideId) -> Result<bool, RepositoryError>;
}
