//! JWT 认证模块
//!
//! 验证外部签发的承载凭证并解析出用户身份。签发不在本服务职责内，
//! 但提供 generate_token 以便测试和本地联调。

use async_trait::async_trait;
use axum::http::HeaderMap;
use config::JwtConfig;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use application::{IdentityError, IdentityVerifier};
use domain::{UserId, UserIdentity};

use crate::error::ApiError;

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// 用户ID
    pub sub: Uuid,
    /// 显示名；发消息时快照到消息上
    pub name: String,
    /// 过期时间 (Unix timestamp)
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtService {
    expiration_hours: i64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            expiration_hours: config.expiration_hours,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成 JWT token（测试和本地联调用；生产签发在身份服务侧）
    pub fn generate_token(&self, identity: &UserIdentity) -> Result<String, ApiError> {
        let exp = chrono::Utc::now() + chrono::Duration::hours(self.expiration_hours);

        let claims = Claims {
            sub: Uuid::from(identity.user_id),
            name: identity.display_name.clone(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| ApiError::unauthorized(format!("Token generation failed: {}", err)))
    }

    /// 验证并解析 JWT token
    pub fn verify_token(&self, token: &str) -> Result<UserIdentity, IdentityError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| UserIdentity::new(UserId::from(data.claims.sub), data.claims.name))
            .map_err(|err| IdentityError::InvalidCredential(err.to_string()))
    }
}

#[async_trait]
impl IdentityVerifier for JwtService {
    async fn verify(&self, token: &str) -> Result<UserIdentity, IdentityError> {
        self.verify_token(token)
    }
}

/// 从 Authorization header 中提取承载凭证
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;

    auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("Invalid authorization header format"))
}
