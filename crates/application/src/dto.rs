use domain::{Message, MessageId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Delivered,
    Read,
}

/// 推送给客户端的消息记录，字段名与持久化表结构一致。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub message: String,
    pub attachment_name: Option<String>,
    pub file_ext: Option<String>,
    pub mime_type: Option<String>,
    #[serde(with = "message_date_time")]
    pub message_date_time: Timestamp,
    pub ip_address: Option<String>,
    pub sender_delete: bool,
    pub reciver_delete: bool,
    pub is_read: bool,
    pub status: DeliveryStatus,
}

impl MessageDto {
    pub fn delivered(message: &Message) -> Self {
        let (attachment_name, file_ext, mime_type) = match &message.attachment {
            Some(a) => (
                Some(a.name.clone()),
                Some(a.extension.clone()),
                Some(a.mime_type.clone()),
            ),
            None => (None, None, None),
        };

        Self {
            id: message.id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            message: message.body.clone(),
            attachment_name,
            file_ext,
            mime_type,
            message_date_time: message.created_at,
            ip_address: message.ip_address.clone(),
            sender_delete: message.sender_deleted,
            reciver_delete: message.receiver_deleted,
            is_read: message.is_read,
            status: DeliveryStatus::Delivered,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceiptDto {
    pub message_id: MessageId,
    pub status: DeliveryStatus,
    pub timestamp: Timestamp,
}

/// `YYYY-MM-DD HH:MM:SS`（UTC，秒精度）
mod message_date_time {
    use chrono::NaiveDateTime;
    use domain::Timestamp;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use domain::{Attachment, NewMessage};

    #[test]
    fn dto_uses_table_field_names() {
        let created_at = Utc.with_ymd_and_hms(2024, 3, 9, 8, 7, 6).unwrap();
        let attachment = Attachment {
            name: "a.png".into(),
            extension: "png".into(),
            mime_type: "image/png".into(),
        };
        let message = NewMessage::new(UserId(1), UserId(2), "hi", Some(attachment), None)
            .unwrap()
            .into_message(MessageId(10), created_at);

        let json = serde_json::to_value(MessageDto::delivered(&message)).unwrap();
        assert_eq!(json["id"], 10);
        assert_eq!(json["sender_id"], 1);
        assert_eq!(json["receiver_id"], 2);
        assert_eq!(json["message"], "hi");
        assert_eq!(json["file_ext"], "png");
        assert_eq!(json["message_date_time"], "2024-03-09 08:07:06");
        assert_eq!(json["reciver_delete"], false);
        assert_eq!(json["is_read"], false);
        assert_eq!(json["status"], "delivered");
    }

    #[test]
    fn dto_without_attachment_has_null_metadata() {
        let message = NewMessage::new(UserId(1), UserId(2), "hi", None, Some("10.0.0.1".into()))
            .unwrap()
            .into_message(MessageId(1), Utc::now());
        let json = serde_json::to_value(MessageDto::delivered(&message)).unwrap();
        assert!(json["attachment_name"].is_null());
        assert!(json["file_ext"].is_null());
        assert!(json["mime_type"].is_null());
        assert_eq!(json["ip_address"], "10.0.0.1");
    }
}
