use async_trait::async_trait;
use domain::UserIdentity;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    #[error("credential verification timed out")]
    Timeout,
}

/// 身份校验端口
///
/// 将承载凭证解析为稳定的用户身份（ID + 显示名）。凭证签发在别处。
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserIdentity, IdentityError>;
}
