use async_trait::async_trait;
use domain::{ChatMessage, RideId};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct MessageBroadcast {
    pub ride_id: RideId,
    pub message: ChatMessage,
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 房间扇出端口
///
/// 由实时层的房间注册表实现。投递是尽力而为的：
/// 死连接被直接吸收，不构成错误。
#[async_trait]
pub trait RoomBroadcaster: Send + Sync {
    async fn broadcast(&self, payload: MessageBroadcast) -> Result<(), BroadcastError>;
}
