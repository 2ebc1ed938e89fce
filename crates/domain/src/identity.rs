use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 经过凭证校验后的用户身份。
///
/// 由外部身份校验器产出；display_name 在发消息时落盘到消息上，
/// 之后改名不会回写历史消息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: UserId,
    pub display_name: String,
}

impl UserIdentity {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
        }
    }
}
