use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// Identifier of a message, unique within a session.
///
/// Ids are allocated by the [`MessageList`](crate::MessageList) that owns the
/// message and increase monotonically.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Wraps a raw id value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw id value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg_{}", self.0)
    }
}

/// Who authored a message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// Typed by the local user.
    User,

    /// Produced by the remote bot, possibly streamed.
    Bot,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Bot => write!(f, "bot"),
        }
    }
}

/// Whether a message may still change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// The message will not change again.
    Final,

    /// A bot message whose content is still being assigned from the channel.
    Streaming,
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageStatus::Final => write!(f, "final"),
            MessageStatus::Streaming => write!(f, "streaming"),
        }
    }
}

/// Error returned when parsing an invalid sender string.
#[derive(Debug)]
pub struct SenderParseError {
    /// The invalid string value that could not be parsed.
    pub invalid_value: String,
}

impl fmt::Display for SenderParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown sender: {}", self.invalid_value)
    }
}

impl std::error::Error for SenderParseError {}

impl FromStr for Sender {
    type Err = SenderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Sender::User),
            "bot" => Ok(Sender::Bot),
            _ => Err(SenderParseError {
                invalid_value: s.to_string(),
            }),
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique id within the owning list.
    pub id: MessageId,

    /// Author of the message.
    pub sender: Sender,

    /// UTF-8 text, rendered as markdown by default.
    pub content: String,

    /// Final or still streaming.
    pub status: MessageStatus,

    /// When the message was created locally.
    #[serde(with = "crate::utils::time")]
    pub created_at: OffsetDateTime,
}

impl Message {
    /// Creates a message stamped with the current time.
    pub fn new(
        id: MessageId,
        sender: Sender,
        content: impl Into<String>,
        status: MessageStatus,
    ) -> Self {
        Self {
            id,
            sender,
            content: content.into(),
            status,
            created_at: crate::utils::time::now(),
        }
    }

    /// Returns true if the message is still streaming.
    pub fn is_streaming(&self) -> bool {
        self.status == MessageStatus::Streaming
    }

    /// Returns true if the message was authored by the bot.
    pub fn is_bot(&self) -> bool {
        self.sender == Sender::Bot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_display() {
        assert_eq!(MessageId::new(7).to_string(), "msg_7");
    }

    #[test]
    fn sender_and_status_serialization() {
        assert_eq!(serde_json::to_string(&Sender::Bot).unwrap(), r#""bot""#);
        assert_eq!(
            serde_json::to_string(&MessageStatus::Streaming).unwrap(),
            r#""streaming""#
        );
        let sender: Sender = serde_json::from_str(r#""user""#).unwrap();
        assert_eq!(sender, Sender::User);
    }

    #[test]
    fn sender_from_str() {
        assert_eq!("bot".parse::<Sender>().unwrap(), Sender::Bot);
        assert!("robot".parse::<Sender>().is_err());
    }

    #[test]
    fn bot_messages() {
        let reply = Message::new(MessageId::new(1), Sender::Bot, "", MessageStatus::Streaming);
        assert!(reply.is_bot());
        assert!(reply.is_streaming());
        let sent = Message::new(MessageId::new(2), Sender::User, "hi", MessageStatus::Final);
        assert!(!sent.is_bot());
    }

    #[test]
    fn message_json_shape() {
        let message = Message::new(MessageId::new(3), Sender::User, "hi", MessageStatus::Final);
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(value["sender"], "user");
        assert_eq!(value["content"], "hi");
        assert_eq!(value["status"], "final");
        assert!(value["created_at"].is_string());
    }
}
