use std::sync::Arc;
use std::time::Duration;

use application::{Clock, MessageRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Attachment, Message, MessageId, NewMessage, RepositoryError, UserId};
use sqlx::{pool::PoolConnection, postgres::PgPoolOptions, FromRow, PgPool, Postgres};

use crate::retry::{retry_async, RetryConfig};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        other => RepositoryError::storage_with_source(other.to_string(), other),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

/// 只重试获取连接阶段的瞬时错误
fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_)
    )
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: i64,
    sender_id: i64,
    receiver_id: i64,
    message: String,
    attachment_name: Option<String>,
    file_ext: Option<String>,
    mime_type: Option<String>,
    message_date_time: DateTime<Utc>,
    ip_address: Option<String>,
    sender_delete: bool,
    reciver_delete: bool,
    is_read: bool,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let attachment = Attachment::from_parts(value.attachment_name, value.file_ext, value.mime_type)
            .map_err(|err| invalid_data(format!("message {}: {err}", value.id)))?;

        Ok(Message {
            id: MessageId(value.id),
            sender_id: UserId(value.sender_id),
            receiver_id: UserId(value.receiver_id),
            body: value.message,
            attachment,
            created_at: value.message_date_time,
            ip_address: value.ip_address,
            sender_deleted: value.sender_delete,
            receiver_deleted: value.reciver_delete,
            is_read: value.is_read,
        })
    }
}

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, message, attachment_name, file_ext, \
     mime_type, message_date_time, ip_address, sender_delete, reciver_delete, is_read";

/// PostgreSQL 消息存储，表 `chat`
#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            clock,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn acquire(&self) -> Result<PoolConnection<Postgres>, RepositoryError> {
        retry_async(&self.retry, is_transient, || self.pool.acquire())
            .await
            .map_err(map_sqlx_err)
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn append(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let created_at = domain::truncate_to_seconds(self.clock.now());
        let attachment = message.attachment();
        let mut conn = self.acquire().await?;

        // 插入本身不重试，避免重复写入
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            INSERT INTO chat (sender_id, receiver_id, message, attachment_name, file_ext, mime_type,
                              message_date_time, ip_address)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(message.sender_id().0)
        .bind(message.receiver_id().0)
        .bind(message.body())
        .bind(attachment.map(|a| a.name.as_str()))
        .bind(attachment.map(|a| a.extension.as_str()))
        .bind(attachment.map(|a| a.mime_type.as_str()))
        .bind(created_at)
        .bind(message.ip_address())
        .fetch_one(&mut *conn)
        .await
        .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn mark_read(&self, id: MessageId, reader: UserId) -> Result<(), RepositoryError> {
        let mut conn = self.acquire().await?;
        let result = sqlx::query("UPDATE chat SET is_read = TRUE WHERE id = $1 AND receiver_id = $2")
            .bind(id.0)
            .bind(reader.0)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let mut conn = self.acquire().await?;
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
}
