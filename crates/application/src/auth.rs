//! 凭证校验抽象
//!
//! 核心只消费校验结果（身份或失败），不关心具体实现是常量比较还是签名校验。

use domain::UserId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    #[error("credential expired")]
    Expired,
    #[error("credential no longer matches the session identity")]
    IdentityChanged,
}

impl AuthError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidCredential(reason.into())
    }
}

/// 把不透明的 bearer 凭证解析为身份。实现必须是纯函数，不产生其他组件可见的副作用。
#[cfg_attr(test, mockall::automock)]
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<UserId, AuthError>;
}

/// 身份校验时机
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPolicy {
    /// 只在建立连接时校验一次，身份在会话生命周期内不变
    #[default]
    SessionBound,
    /// 每次 send_message / mark_as_read 都重新校验连接凭证（用于强制过期）
    PerOperation,
}
