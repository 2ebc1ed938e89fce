//! 领域模型错误定义

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    #[error("ride not found")]
    RideNotFound,

    #[error("message not found")]
    MessageNotFound,
}

impl DomainError {
    pub fn invalid_argument(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }
}

/// 存储层错误类型
///
/// `Timeout` 是可重试的瞬时错误；`Storage` 携带底层驱动的描述。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("storage operation timed out")]
    Timeout,
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// 瞬时错误可以在有限次数内重试
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}
