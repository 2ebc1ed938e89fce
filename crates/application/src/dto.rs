use domain::{ChatMessage, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub body: String,
    pub created_at: Timestamp,
    pub read_by: Vec<Uuid>,
}

impl From<&ChatMessage> for MessageDto {
    fn from(message: &ChatMessage) -> Self {
        // 排序保证序列化输出稳定
        let mut read_by: Vec<Uuid> = message.read_by.iter().map(|id| Uuid::from(*id)).collect();
        read_by.sort();

        Self {
            id: Uuid::from(message.id),
            ride_id: Uuid::from(message.ride_id),
            sender_id: Uuid::from(message.sender_id),
            sender_name: message.sender_name.clone(),
            body: message.body.as_str().to_owned(),
            created_at: message.created_at,
            read_by,
        }
    }
}
