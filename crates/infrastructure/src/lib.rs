//! 基础设施层：存储与行程目录的具体适配器。
//!
//! Postgres 适配器用于生产部署；内存适配器用于测试和本地开发。

pub mod memory;
pub mod repository;
pub mod retry;

pub use memory::{InMemoryMessageStore, StaticRideDirectory};
pub use repository::{create_pg_pool, PgMessageRepository, PgRideDirectory};
pub use retry::{retry_async, Backoff, RetryConfig};
