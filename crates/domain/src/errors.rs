//! 领域模型错误定义
//!
//! 定义了消息校验与持久化过程中可能出现的错误类型。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 缺少必填字段
    #[error("missing required field: {field}")]
    MissingField { field: String },

    /// 字段取值不合法
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 附件元数据不完整（名称、扩展名、MIME 类型必须同时出现）
    #[error("incomplete attachment metadata: missing {missing}")]
    PartialAttachment { missing: String },
}

impl DomainError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn partial_attachment(missing: &[&str]) -> Self {
        Self::PartialAttachment {
            missing: missing.join(", "),
        }
    }
}

/// 仓储层错误
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
