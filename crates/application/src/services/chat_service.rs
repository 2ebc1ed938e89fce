use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use config::ChatConfig;
use domain::{
    ChatMessage, DomainError, MessageBody, MessageId, RepositoryError, RideId, Timestamp, UserId,
    UserIdentity,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    broadcaster::{MessageBroadcast, RoomBroadcaster},
    clock::Clock,
    dto::MessageDto,
    error::ApplicationError,
    repository::{MessageRepository, RideDirectory},
};

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub ride_id: Uuid,
    pub sender: UserIdentity,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct HistoryRequest {
    pub ride_id: Uuid,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// 只返回严格早于该时间戳的消息（向后翻页）
    pub before: Option<Timestamp>,
}

/// 已读游标：客户端二选一提交
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ReadCursor {
    LastMessageId(Uuid),
    LastSeenAt(Timestamp),
}

#[derive(Debug, Clone)]
pub struct MarkReadRequest {
    pub ride_id: Uuid,
    pub reader: UserId,
    pub cursor: ReadCursor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub messages: Vec<MessageDto>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarkReadOutcome {
    /// 本次调用新增的已读条数；重复提交同一游标时为 0
    pub newly_read: u64,
}

pub struct ChatServiceDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub ride_directory: Arc<dyn RideDirectory>,
    pub clock: Arc<dyn Clock>,
    pub broadcaster: Arc<dyn RoomBroadcaster>,
}

/// 房间内发送序列化状态：记录上一次落盘时间戳
#[derive(Debug, Default)]
struct RoomSendState {
    last_stamp: Option<Timestamp>,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
    store_timeout: Duration,
    default_page_size: u32,
    max_page_size: u32,
    // 每个房间一把发送锁：落盘和广播在锁内完成，保证房间内全序
    send_states: Mutex<HashMap<RideId, Arc<Mutex<RoomSendState>>>>,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies, config: &ChatConfig) -> Self {
        Self {
            deps,
            store_timeout: Duration::from_millis(config.store_timeout_ms),
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
            send_states: Mutex::new(HashMap::new()),
        }
    }

    /// 校验房间背后的行程存在；join / send / history / read 的共同闸门
    pub async fn verify_room(&self, ride_id: RideId) -> Result<(), ApplicationError> {
        let exists = self
            .with_store_timeout(self.deps.ride_directory.ride_exists(ride_id))
            .await?;
        if exists {
            Ok(())
        } else {
            Err(DomainError::RideNotFound.into())
        }
    }

    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<ChatMessage, ApplicationError> {
        let ride_id = RideId::from(request.ride_id);
        let body = MessageBody::parse(request.text)?;
        self.verify_room(ride_id).await?;

        let guard = self.room_send_state(ride_id).await;
        let mut state = guard.lock().await;

        // 服务端分配时间戳；同一房间内单调递增，时钟回拨也不例外
        let mut stamp = self.deps.clock.now();
        if let Some(last) = state.last_stamp {
            if stamp <= last {
                stamp = last + chrono::Duration::microseconds(1);
            }
        }

        let message = ChatMessage::new(
            MessageId::from(Uuid::new_v4()),
            ride_id,
            &request.sender,
            body,
            stamp,
        )?;

        let stored = self
            .with_store_timeout(self.deps.message_repository.create(message))
            .await?;
        state.last_stamp = Some(stored.created_at);

        // 只有落盘成功的消息才对外可见；扇出失败不回滚写入
        if let Err(err) = self
            .deps
            .broadcaster
            .broadcast(MessageBroadcast {
                ride_id,
                message: stored.clone(),
            })
            .await
        {
            tracing::warn!(
                ride_id = %ride_id,
                message_id = %stored.id,
                error = %err,
                "message persisted but fan-out failed"
            );
        }

        Ok(stored)
    }

    pub async fn fetch_history(
        &self,
        request: HistoryRequest,
    ) -> Result<HistoryPage, ApplicationError> {
        let ride_id = RideId::from(request.ride_id);

        let page = request.page.unwrap_or(1);
        if page == 0 {
            return Err(DomainError::invalid_argument("page", "must be at least 1").into());
        }
        let limit = request.limit.unwrap_or(self.default_page_size);
        if limit == 0 || limit > self.max_page_size {
            return Err(DomainError::invalid_argument(
                "limit",
                format!("must be between 1 and {}", self.max_page_size),
            )
            .into());
        }

        self.verify_room(ride_id).await?;

        let offset = u64::from(page - 1) * u64::from(limit);
        let total = self
            .with_store_timeout(self.deps.message_repository.count(ride_id, request.before))
            .await?;
        let messages = self
            .with_store_timeout(self.deps.message_repository.list_page(
                ride_id,
                offset,
                limit,
                request.before,
            ))
            .await?;

        let has_more = offset + (messages.len() as u64) < total;

        Ok(HistoryPage {
            messages: messages.iter().map(MessageDto::from).collect(),
            page,
            limit,
            total,
            has_more,
        })
    }

    pub async fn mark_read(
        &self,
        request: MarkReadRequest,
    ) -> Result<MarkReadOutcome, ApplicationError> {
        let ride_id = RideId::from(request.ride_id);
        self.verify_room(ride_id).await?;

        let up_to = match request.cursor {
            ReadCursor::LastSeenAt(stamp) => stamp,
            ReadCursor::LastMessageId(id) => {
                let message = self
                    .with_store_timeout(
                        self.deps.message_repository.find_by_id(MessageId::from(id)),
                    )
                    .await?
                    .ok_or(DomainError::MessageNotFound)?;
                // 游标消息必须属于同一个房间
                if message.ride_id != ride_id {
                    return Err(DomainError::MessageNotFound.into());
                }
                message.created_at
            }
        };

        let newly_read = self
            .with_store_timeout(self.deps.message_repository.mark_read_until(
                ride_id,
                request.reader,
                up_to,
            ))
            .await?;

        if newly_read > 0 {
            tracing::debug!(
                ride_id = %ride_id,
                reader = %request.reader,
                newly_read,
                "read receipt applied"
            );
        }

        Ok(MarkReadOutcome { newly_read })
    }

    async fn room_send_state(&self, ride_id: RideId) -> Arc<Mutex<RoomSendState>> {
        let mut states = self.send_states.lock().await;
        states.entry(ride_id).or_default().clone()
    }

    async fn with_store_timeout<T>(
        &self,
        operation: impl Future<Output = Result<T, RepositoryError>>,
    ) -> Result<T, ApplicationError> {
        match tokio::time::timeout(self.store_timeout, operation).await {
            Ok(result) => result.map_err(ApplicationError::from),
            Err(_) => Err(ApplicationError::Repository(RepositoryError::Timeout)),
        }
    }
}
