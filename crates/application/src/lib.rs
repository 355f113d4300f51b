//! 应用层实现。
//!
//! 这里提供消息投递的用例服务，处理输入校验、先持久化后扇出的顺序保证，
//! 以及对外部协作者（凭证校验、消息存储、会话注册表、推送通知）的抽象。

pub mod auth;
pub mod clock;
pub mod dto;
pub mod error;
pub mod events;
pub mod notification;
pub mod registry;
pub mod repository;
pub mod services;

pub use auth::{AuthError, AuthPolicy, CredentialVerifier};
pub use clock::{Clock, SystemClock};
pub use dto::{DeliveryStatus, MessageDto, ReadReceiptDto};
pub use error::ApplicationError;
pub use events::ServerEvent;
pub use notification::{
    DeliveryHint, NoopNotificationSink, NotificationError, NotificationPolicy, NotificationSink,
};
pub use registry::{RegistryError, SessionHandle, SessionRegistry};
pub use repository::MessageRepository;
pub use services::{
    DeliveryService, DeliveryServiceDependencies, JoinRequest, MarkReadRequest,
    SendMessageRequest, SessionContext,
};
