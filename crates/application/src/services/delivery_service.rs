use std::net::IpAddr;
use std::sync::Arc;

use domain::{Attachment, DomainError, Message, MessageId, NewMessage, RepositoryError, UserId};
use serde::Deserialize;

use crate::{
    auth::{AuthError, AuthPolicy, CredentialVerifier},
    clock::Clock,
    dto::{DeliveryStatus, MessageDto, ReadReceiptDto},
    error::ApplicationError,
    events::ServerEvent,
    notification::{DeliveryHint, NotificationPolicy, NotificationSink},
    registry::{SessionHandle, SessionRegistry},
    repository::MessageRepository,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinRequest {
    pub user_id: Option<UserId>,
}

/// 旧版客户端使用的嵌套附件格式 `attachment: {name, extension, type}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NestedAttachment {
    pub name: Option<String>,
    pub extension: Option<String>,
    #[serde(rename = "type")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendMessageRequest {
    pub sender_id: Option<UserId>,
    pub receiver_id: Option<UserId>,
    pub content: Option<String>,
    pub attachment_name: Option<String>,
    pub file_ext: Option<String>,
    pub mime_type: Option<String>,
    pub attachment: Option<NestedAttachment>,
}

impl SendMessageRequest {
    fn attachment(&self) -> Result<Option<Attachment>, DomainError> {
        let nested = self.attachment.clone().unwrap_or_default();
        Attachment::from_parts(
            self.attachment_name.clone().or(nested.name),
            self.file_ext.clone().or(nested.extension),
            self.mime_type.clone().or(nested.mime_type),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarkReadRequest {
    pub message_id: Option<MessageId>,
}

/// 一个已认证连接的上下文
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub handle: SessionHandle,
    /// 建立连接时校验得到的身份
    pub identity: UserId,
    /// 建立连接时使用的凭证，按需重新校验
    pub credential: String,
    pub remote_addr: Option<IpAddr>,
}

pub struct DeliveryServiceDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub session_registry: Arc<dyn SessionRegistry>,
    pub credential_verifier: Arc<dyn CredentialVerifier>,
    pub notification_sink: Arc<dyn NotificationSink>,
    pub clock: Arc<dyn Clock>,
    pub auth_policy: AuthPolicy,
    pub notification_policy: NotificationPolicy,
}

/// 投递路由：认证、校验、持久化、扇出、回执。
///
/// 每个失败都以 `error` 事件回复给发起请求的会话，同时返回给调用方用于记录日志；
/// 任何失败都不会关闭连接。
pub struct DeliveryService {
    deps: DeliveryServiceDependencies,
}

impl DeliveryService {
    pub fn new(deps: DeliveryServiceDependencies) -> Self {
        Self { deps }
    }

    /// 建立连接时的凭证校验，失败时不建立会话
    pub fn authenticate_connection(&self, token: Option<&str>) -> Result<UserId, ApplicationError> {
        let token = token
            .filter(|t| !t.trim().is_empty())
            .ok_or(AuthError::MissingCredential)?;
        Ok(self.deps.credential_verifier.verify(token)?)
    }

    pub fn connected(&self, ctx: &SessionContext) {
        tracing::info!(
            session_id = %ctx.handle.id(),
            user_id = %ctx.identity,
            remote_addr = ?ctx.remote_addr,
            "connection authenticated"
        );
        ctx.handle.emit(ServerEvent::ConnectionSuccess {
            user_id: ctx.identity,
        });
    }

    /// 把会话绑定到身份。`user_id` 必须与连接认证得到的身份一致。
    pub async fn join(
        &self,
        ctx: &SessionContext,
        request: JoinRequest,
    ) -> Result<(), ApplicationError> {
        let identity = self.resolve_identity(ctx).map_err(|e| self.reject(ctx, e))?;

        let claimed = request
            .user_id
            .ok_or_else(|| DomainError::missing_field("user_id"))
            .map_err(|e| self.reject(ctx, e.into()))?;

        if claimed != identity {
            return Err(self.reject(
                ctx,
                ApplicationError::IdentityMismatch {
                    claimed,
                    authenticated: identity,
                },
            ));
        }

        self.deps
            .session_registry
            .bind(ctx.handle.clone(), identity)
            .await
            .map_err(|e| self.reject(ctx, e.into()))?;

        tracing::info!(session_id = %ctx.handle.id(), user_id = %identity, "user joined delivery channel");
        Ok(())
    }

    /// 发送消息：认证 -> 校验 -> 持久化 -> 扇出给接收方所有会话 -> 回执给发送方当前会话。
    ///
    /// 持久化失败时不做任何扇出。
    pub async fn send_message(
        &self,
        ctx: &SessionContext,
        request: SendMessageRequest,
    ) -> Result<Message, ApplicationError> {
        let sender_id = self.resolve_identity(ctx).map_err(|e| self.reject(ctx, e))?;
        let new_message = self
            .validate_send(ctx, sender_id, &request)
            .map_err(|e| self.reject(ctx, e.into()))?;

        let message = self
            .deps
            .message_repository
            .append(new_message)
            .await
            .map_err(|e| self.reject(ctx, e.into()))?;

        let dto = MessageDto::delivered(&message);
        let sessions = self
            .deps
            .session_registry
            .sessions_for(message.receiver_id)
            .await;

        let delivered = sessions
            .iter()
            .filter(|session| session.emit(ServerEvent::ReceiveMessage(dto.clone())))
            .count();

        tracing::info!(
            message_id = %message.id,
            sender_id = %message.sender_id,
            receiver_id = %message.receiver_id,
            sessions = sessions.len(),
            delivered,
            "message persisted and fanned out"
        );

        if self.deps.notification_policy.should_notify(delivered) {
            self.dispatch_notification(DeliveryHint {
                sender_id: message.sender_id,
                receiver_id: message.receiver_id,
            });
        }

        ctx.handle.emit(ServerEvent::MessageSent(dto));
        Ok(message)
    }

    /// 标记已读，成功后向请求会话发送 `read_receipt`
    pub async fn mark_as_read(
        &self,
        ctx: &SessionContext,
        request: MarkReadRequest,
    ) -> Result<ReadReceiptDto, ApplicationError> {
        let reader = self.resolve_identity(ctx).map_err(|e| self.reject(ctx, e))?;

        let message_id = request
            .message_id
            .ok_or_else(|| DomainError::missing_field("message_id"))
            .map_err(|e| self.reject(ctx, e.into()))?;

        self.deps
            .message_repository
            .mark_read(message_id, reader)
            .await
            .map_err(|err| match err {
                RepositoryError::NotFound => ApplicationError::NotFound { message_id },
                other => ApplicationError::from(other),
            })
            .map_err(|e| self.reject(ctx, e))?;

        let receipt = ReadReceiptDto {
            message_id,
            status: DeliveryStatus::Read,
            timestamp: self.deps.clock.now(),
        };
        tracing::debug!(message_id = %message_id, user_id = %reader, "message marked as read");
        ctx.handle.emit(ServerEvent::ReadReceipt(receipt.clone()));
        Ok(receipt)
    }

    /// 连接断开时同步解绑
    pub async fn disconnect(&self, ctx: &SessionContext) {
        self.deps.session_registry.unbind(ctx.handle.id()).await;
    }

    /// 把无法解析的上行请求报告给会话
    pub fn report_malformed(&self, ctx: &SessionContext, detail: impl Into<String>) -> ApplicationError {
        self.reject(ctx, ApplicationError::malformed(detail))
    }

    fn resolve_identity(&self, ctx: &SessionContext) -> Result<UserId, ApplicationError> {
        match self.deps.auth_policy {
            AuthPolicy::SessionBound => Ok(ctx.identity),
            AuthPolicy::PerOperation => {
                let identity = self.deps.credential_verifier.verify(&ctx.credential)?;
                if identity != ctx.identity {
                    return Err(AuthError::IdentityChanged.into());
                }
                Ok(identity)
            }
        }
    }

    fn validate_send(
        &self,
        ctx: &SessionContext,
        sender_id: UserId,
        request: &SendMessageRequest,
    ) -> Result<NewMessage, DomainError> {
        let receiver_id = request
            .receiver_id
            .ok_or_else(|| DomainError::missing_field("receiver_id"))?;
        let content = request
            .content
            .clone()
            .ok_or_else(|| DomainError::missing_field("content"))?;

        if let Some(claimed) = request.sender_id {
            if claimed != sender_id {
                return Err(DomainError::invalid_argument(
                    "sender_id",
                    "does not match the authenticated identity",
                ));
            }
        }

        let attachment = request.attachment()?;
        NewMessage::new(
            sender_id,
            receiver_id,
            content,
            attachment,
            ctx.remote_addr.map(|addr| addr.to_string()),
        )
    }

    fn dispatch_notification(&self, hint: DeliveryHint) {
        let sink = self.deps.notification_sink.clone();
        tokio::spawn(async move {
            match sink.notify(hint).await {
                Ok(()) => tracing::debug!(
                    sender_id = %hint.sender_id,
                    receiver_id = %hint.receiver_id,
                    "push notification dispatched"
                ),
                Err(err) => tracing::warn!(
                    error = %err,
                    sender_id = %hint.sender_id,
                    receiver_id = %hint.receiver_id,
                    "push notification failed"
                ),
            }
        });
    }

    fn reject(&self, ctx: &SessionContext, error: ApplicationError) -> ApplicationError {
        tracing::warn!(session_id = %ctx.handle.id(), user_id = %ctx.identity, error = %error, "request rejected");
        ctx.handle.emit(ServerEvent::error(error.to_string()));
        error
    }
}
