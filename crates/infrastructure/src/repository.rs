use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

use application::{MessageRepository, RideDirectory};
use domain::{
    ChatMessage, MessageBody, MessageId, RepositoryError, RideId, Timestamp, UserId,
};

use crate::retry::{retry_async, RetryConfig};

pub async fn create_pg_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
}

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        // 连接池耗尽和IO中断按瞬时错误处理，交给重试层
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => RepositoryError::Timeout,
        other => RepositoryError::storage(other.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    ride_id: Uuid,
    sender_id: Uuid,
    sender_name: String,
    body: String,
    created_at: DateTime<Utc>,
    read_by: Vec<Uuid>,
}

impl TryFrom<MessageRecord> for ChatMessage {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let body =
            MessageBody::parse(value.body).map_err(|err| invalid_data(err.to_string()))?;
        let read_by: HashSet<UserId> = value.read_by.into_iter().map(UserId::from).collect();

        Ok(ChatMessage {
            id: MessageId::from(value.id),
            ride_id: RideId::from(value.ride_id),
            sender_id: UserId::from(value.sender_id),
            sender_name: value.sender_name,
            body,
            created_at: value.created_at,
            read_by,
        })
    }
}

pub struct PgMessageRepository {
    pool: PgPool,
    retry: RetryConfig,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(pool: PgPool, retry: RetryConfig) -> Self {
        Self { pool, retry }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: ChatMessage) -> Result<ChatMessage, RepositoryError> {
        let record = retry_async(&self.retry, || async {
            sqlx::query_as::<_, MessageRecord>(
                r#"
                INSERT INTO messages (id, ride_id, sender_id, sender_name, body, created_at, read_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id, ride_id, sender_id, sender_name, body, created_at, read_by
                "#,
            )
            .bind(Uuid::from(message.id))
            .bind(Uuid::from(message.ride_id))
            .bind(Uuid::from(message.sender_id))
            .bind(&message.sender_name)
            .bind(message.body.as_str())
            .bind(message.created_at)
            .bind(
                message
                    .read_by
                    .iter()
                    .map(|id| Uuid::from(*id))
                    .collect::<Vec<Uuid>>(),
            )
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)
        })
        .await?;

        record.try_into()
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<ChatMessage>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, ride_id, sender_id, sender_name, body, created_at, read_by
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(TryInto::try_into).transpose()
    }

    async fn list_page(
        &self,
        ride_id: RideId,
        offset: u64,
        limit: u32,
        before: Option<Timestamp>,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, ride_id, sender_id, sender_name, body, created_at, read_by
            FROM messages
            WHERE ride_id = $1
              AND ($2::timestamptz IS NULL OR created_at < $2)
            ORDER BY created_at ASC, id ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(Uuid::from(ride_id))
        .bind(before)
        .bind(i64::from(limit))
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(TryInto::try_into).collect()
    }

    async fn count(
        &self,
        ride_id: RideId,
        before: Option<Timestamp>,
    ) -> Result<u64, RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM messages
            WHERE ride_id = $1
              AND ($2::timestamptz IS NULL OR created_at < $2)
            "#,
        )
        .bind(Uuid::from(ride_id))
        .bind(before)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(total as u64)
    }

    async fn mark_read_until(
        &self,
        ride_id: RideId,
        reader: UserId,
        up_to: Timestamp,
    ) -> Result<u64, RepositoryError> {
        // 谓词里排除已包含读者的行，天然幂等
        let result = retry_async(&self.retry, || async {
            sqlx::query(
                r#"
                UPDATE messages
                SET read_by = array_append(read_by, $2)
                WHERE ride_id = $1
                  AND created_at <= $3
                  AND NOT (read_by @> ARRAY[$2]::uuid[])
                "#,
            )
            .bind(Uuid::from(ride_id))
            .bind(Uuid::from(reader))
            .bind(up_to)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)
        })
        .await?;

        Ok(result.rows_affected())
    }
}

/// 行程目录的Postgres适配器
///
/// rides 表归行程发布子系统所有，这里只做存在性探测。
pub struct PgRideDirectory {
    pool: PgPool,
}

impl PgRideDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RideDirectory for PgRideDirectory {
    async fn ride_exists(&self, ride_id: RideId) -> Result<bool, RepositoryError> {
        sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM rides WHERE id = $1)"#)
            .bind(Uuid::from(ride_id))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)
    }
}
