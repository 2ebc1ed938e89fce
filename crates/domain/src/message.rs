//! 消息实体定义
//!
//! 消息一经创建即不可变，唯一允许的变更是向 read_by 集合追加读者。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::identity::UserIdentity;
use crate::value_objects::{MessageBody, MessageId, RideId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub ride_id: RideId,
    pub sender_id: UserId,
    /// 发送时刻的显示名快照，不随用户改名更新
    pub sender_name: String,
    pub body: MessageBody,
    /// 服务端分配，同一房间内单调不减
    pub created_at: Timestamp,
    pub read_by: HashSet<UserId>,
}

impl ChatMessage {
    pub fn new(
        id: MessageId,
        ride_id: RideId,
        sender: &UserIdentity,
        body: MessageBody,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        if sender.display_name.trim().is_empty() {
            return Err(DomainError::invalid_argument(
                "sender_name",
                "cannot be empty",
            ));
        }
        Ok(Self {
            id,
            ride_id,
            sender_id: sender.user_id,
            sender_name: sender.display_name.clone(),
            body,
            created_at,
            read_by: HashSet::new(),
        })
    }

    /// 将用户加入读者集合，返回是否为新增读者。
    pub fn mark_read_by(&mut self, reader: UserId) -> bool {
        self.read_by.insert(reader)
    }

    pub fn is_read_by(&self, reader: UserId) -> bool {
        self.read_by.contains(&reader)
    }
}
