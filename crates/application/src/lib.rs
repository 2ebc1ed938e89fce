//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，处理输入校验、分页与游标语义，
//! 以及对外部适配器（消息存储、行程目录、身份校验、房间广播）的抽象。

pub mod broadcaster;
pub mod clock;
pub mod dto;
pub mod error;
pub mod identity;
pub mod repository;
pub mod services;

pub use broadcaster::{BroadcastError, MessageBroadcast, RoomBroadcaster};
pub use clock::{Clock, SystemClock};
pub use dto::MessageDto;
pub use error::ApplicationError;
pub use identity::{IdentityError, IdentityVerifier};
pub use repository::{MessageRepository, RideDirectory};
pub use services::{
    ChatService, ChatServiceDependencies, HistoryPage, HistoryRequest, MarkReadOutcome,
    MarkReadRequest, ReadCursor, SendMessageRequest,
};
