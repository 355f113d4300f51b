//! 服务端下行事件
//!
//! 线上格式为 `{"event": "<name>", "data": {...}}`。

use domain::UserId;
use serde::{Deserialize, Serialize};

use crate::dto::{MessageDto, ReadReceiptDto};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ConnectionSuccess { user_id: UserId },
    ReceiveMessage(MessageDto),
    MessageSent(MessageDto),
    ReadReceipt(ReadReceiptDto),
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionSuccess { .. } => "connection_success",
            Self::ReceiveMessage(_) => "receive_message",
            Self::MessageSent(_) => "message_sent",
            Self::ReadReceipt(_) => "read_receipt",
            Self::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_use_envelope_format() {
        let json = serde_json::to_value(ServerEvent::ConnectionSuccess {
            user_id: UserId(5),
        })
        .unwrap();
        assert_eq!(json["event"], "connection_success");
        assert_eq!(json["data"]["user_id"], 5);

        let json = serde_json::to_value(ServerEvent::error("Missing required fields")).unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["data"]["message"], "Missing required fields");
    }
}
