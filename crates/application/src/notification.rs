use async_trait::async_trait;
use domain::UserId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 推送给外部通知服务的投递提示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryHint {
    pub sender_id: UserId,
    pub receiver_id: UserId,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl NotificationError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// 尽力而为的推送通知出口。失败只记录日志，从不反馈给发送方。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, hint: DeliveryHint) -> Result<(), NotificationError>;
}

/// 未配置推送服务时使用
#[derive(Debug, Default, Clone)]
pub struct NoopNotificationSink;

#[async_trait]
impl NotificationSink for NoopNotificationSink {
    async fn notify(&self, hint: DeliveryHint) -> Result<(), NotificationError> {
        tracing::debug!(
            sender_id = %hint.sender_id,
            receiver_id = %hint.receiver_id,
            "notification sink not configured, skipping push"
        );
        Ok(())
    }
}

/// 何时触发推送
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPolicy {
    /// 只有接收方没有任何在线会话时推送
    #[default]
    OfflineOnly,
    /// 每条消息都推送
    Always,
}

impl NotificationPolicy {
    pub fn should_notify(&self, online_sessions: usize) -> bool {
        match self {
            Self::OfflineOnly => online_sessions == 0,
            Self::Always => true,
        }
    }
}
