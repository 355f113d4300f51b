use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{MessageId, Timestamp, UserId};

/// 附件元数据：名称、扩展名、MIME 类型三者要么全有，要么全无。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub extension: String,
    pub mime_type: String,
}

impl Attachment {
    /// 由三个可选字段组装附件，空字符串视为缺失。
    ///
    /// 全部缺失返回 `Ok(None)`；部分缺失返回 `PartialAttachment`。
    pub fn from_parts(
        name: Option<String>,
        extension: Option<String>,
        mime_type: Option<String>,
    ) -> Result<Option<Self>, DomainError> {
        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let (name, extension, mime_type) = (present(name), present(extension), present(mime_type));

        match (name, extension, mime_type) {
            (None, None, None) => Ok(None),
            (Some(name), Some(extension), Some(mime_type)) => Ok(Some(Self {
                name,
                extension,
                mime_type,
            })),
            (name, extension, mime_type) => {
                let mut missing = Vec::new();
                if name.is_none() {
                    missing.push("attachment_name");
                }
                if extension.is_none() {
                    missing.push("file_ext");
                }
                if mime_type.is_none() {
                    missing.push("mime_type");
                }
                Err(DomainError::partial_attachment(&missing))
            }
        }
    }
}

/// 待持久化的消息，构造即完成校验。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    sender_id: UserId,
    receiver_id: UserId,
    body: String,
    attachment: Option<Attachment>,
    ip_address: Option<String>,
}

impl NewMessage {
    /// 正文可以为空白，前提是携带附件（纯媒体消息）。
    pub fn new(
        sender_id: UserId,
        receiver_id: UserId,
        body: impl Into<String>,
        attachment: Option<Attachment>,
        ip_address: Option<String>,
    ) -> Result<Self, DomainError> {
        let body = body.into();
        if body.trim().is_empty() && attachment.is_none() {
            return Err(DomainError::invalid_argument(
                "content",
                "cannot be empty without an attachment",
            ));
        }
        Ok(Self {
            sender_id,
            receiver_id,
            body,
            attachment,
            ip_address,
        })
    }

    pub fn sender_id(&self) -> UserId {
        self.sender_id
    }

    pub fn receiver_id(&self) -> UserId {
        self.receiver_id
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    /// 由存储层分配 ID 与时间戳后得到持久化消息。
    pub fn into_message(self, id: MessageId, created_at: Timestamp) -> Message {
        Message {
            id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            body: self.body,
            attachment: self.attachment,
            created_at,
            ip_address: self.ip_address,
            sender_deleted: false,
            receiver_deleted: false,
            is_read: false,
        }
    }
}

/// 已持久化的消息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub body: String,
    pub attachment: Option<Attachment>,
    pub created_at: Timestamp,
    pub ip_address: Option<String>,
    pub sender_deleted: bool,
    pub receiver_deleted: bool,
    pub is_read: bool,
}

impl Message {
    /// 已读标记只能由接收方触发，只会从 false 变为 true，重复标记不报错。
    ///
    /// 返回 `false` 表示调用者不是该消息的接收方。
    pub fn mark_read_by(&mut self, reader: UserId) -> bool {
        if self.receiver_id != reader {
            return false;
        }
        self.is_read = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn some(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn attachment_all_or_nothing() {
        assert_eq!(Attachment::from_parts(None, None, None).unwrap(), None);

        let full = Attachment::from_parts(some("cat.png"), some("png"), some("image/png"))
            .unwrap()
            .unwrap();
        assert_eq!(full.extension, "png");

        let err = Attachment::from_parts(some("cat.png"), None, None).unwrap_err();
        assert_eq!(
            err,
            DomainError::PartialAttachment {
                missing: "file_ext, mime_type".into()
            }
        );
    }

    #[test]
    fn blank_attachment_fields_count_as_missing() {
        assert_eq!(
            Attachment::from_parts(some(""), some(" "), None).unwrap(),
            None
        );
        assert!(Attachment::from_parts(some("a.pdf"), some(""), some("application/pdf")).is_err());
    }

    #[test]
    fn blank_body_requires_attachment() {
        assert!(NewMessage::new(UserId(1), UserId(2), "  ", None, None).is_err());

        let attachment = Attachment {
            name: "clip.mp4".into(),
            extension: "mp4".into(),
            mime_type: "video/mp4".into(),
        };
        assert!(NewMessage::new(UserId(1), UserId(2), "", Some(attachment), None).is_ok());
    }

    #[test]
    fn only_receiver_marks_read() {
        let mut message = NewMessage::new(UserId(1), UserId(2), "hi", None, None)
            .unwrap()
            .into_message(MessageId(1), Utc::now());

        assert!(!message.mark_read_by(UserId(1)));
        assert!(!message.is_read);

        assert!(message.mark_read_by(UserId(2)));
        assert!(message.mark_read_by(UserId(2)));
        assert!(message.is_read);
    }
}
