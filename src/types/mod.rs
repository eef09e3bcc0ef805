mod conversation;
mod message;
mod message_list;

pub use conversation::{Conversation, ConversationList};
pub use message::{Message, MessageId, MessageStatus, Sender, SenderParseError};
pub use message_list::{ListChange, ListObserver, MessageList};
