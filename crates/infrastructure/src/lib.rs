//! 基础设施层实现。
//!
//! 提供 PostgreSQL 消息存储、凭证校验、HTTP 推送通知等适配器，实现应用层定义的接口。

pub mod auth;
pub mod builder;
pub mod migrations;
pub mod notification;
pub mod repository;
pub mod retry;

pub use auth::{Claims, JwtCredentialVerifier, SharedSecretVerifier};
pub use builder::{Infrastructure, InfrastructureConfig, InfrastructureError};
pub use migrations::MIGRATOR;
pub use notification::HttpNotificationSink;
pub use repository::{create_pg_pool, PgMessageRepository};
pub use retry::{retry_async, Backoff, RetryConfig};
