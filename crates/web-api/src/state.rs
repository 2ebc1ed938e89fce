use std::sync::Arc;
use std::time::Duration;

use application::{ChatService, IdentityVerifier};
use config::ChatConfig;
use domain::UserIdentity;

use crate::error::ApiError;
use crate::registry::RoomRegistry;

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub registry: Arc<RoomRegistry>,
    pub identity_verifier: Arc<dyn IdentityVerifier>,
    auth_timeout: Duration,
}

impl AppState {
    pub fn new(
        chat_service: Arc<ChatService>,
        registry: Arc<RoomRegistry>,
        identity_verifier: Arc<dyn IdentityVerifier>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            chat_service,
            registry,
            identity_verifier,
            auth_timeout: Duration::from_millis(config.auth_timeout_ms),
        }
    }

    /// 带超时的凭证校验；超时按校验失败处理
    pub async fn verify_credential(&self, token: &str) -> Result<UserIdentity, ApiError> {
        match tokio::time::timeout(self.auth_timeout, self.identity_verifier.verify(token)).await {
            Ok(Ok(identity)) => Ok(identity),
            Ok(Err(err)) => Err(ApiError::unauthorized(err.to_string())),
            Err(_) => Err(ApiError::unauthorized("credential verification timed out")),
        }
    }
}
