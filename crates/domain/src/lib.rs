//! 拼车聊天系统核心领域模型
//!
//! 包含消息实体、值对象以及错误类型。聊天室本身不是实体：
//! 一个房间由行程ID（RideId）唯一确定，随首次加入或发消息隐式存在。

pub mod errors;
pub mod identity;
pub mod message;
pub mod value_objects;

pub use errors::{DomainError, RepositoryError};
pub use identity::UserIdentity;
pub use message::ChatMessage;
pub use value_objects::{MessageBody, MessageId, RideId, Timestamp, UserId};
