use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Message, MessageId, MessageStatus, Sender};

/// A single mutation of a [`MessageList`].
///
/// Every mutation made by the assembler or by submission is reported as one of
/// these so a UI can re-render exactly what changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ListChange {
    /// A message was prepended.
    Inserted(MessageId),

    /// The content of a streaming message was updated.
    ContentUpdated(MessageId),

    /// A streaming message became final.
    Finalized(MessageId),

    /// All messages were removed.
    Cleared,

    /// The whole list was replaced, e.g. by loading a transcript.
    Replaced,
}

impl ListChange {
    /// The message this change touched, if it touched exactly one.
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            ListChange::Inserted(id) | ListChange::ContentUpdated(id) | ListChange::Finalized(id) => {
                Some(*id)
            }
            ListChange::Cleared | ListChange::Replaced => None,
        }
    }
}

/// Receives a notification after every list mutation.
pub trait ListObserver: Send {
    /// Called synchronously after `change` has been applied to `list`.
    fn list_changed(&mut self, list: &MessageList, change: &ListChange);
}

impl<F> ListObserver for F
where
    F: FnMut(&MessageList, &ListChange) + Send,
{
    fn list_changed(&mut self, list: &MessageList, change: &ListChange) {
        self(list, change)
    }
}

/// Ordered chat history, newest message first.
///
/// The list allocates message ids, so ids are unique within it.  At most one
/// message is [`MessageStatus::Streaming`] at a time; the assembler upholds
/// that, and [`MessageList::prepend`] refuses to create a second one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageList {
    messages: Vec<Message>,
    next_id: u64,
}

impl MessageList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a list from existing history, given newest first.
    ///
    /// Any streaming entries are finalized, and id allocation resumes after the
    /// largest id present.
    ///
    /// # Errors
    ///
    /// Fails if two messages share an id, or if an id leaves no room to
    /// allocate another.
    pub fn with_history(mut messages: Vec<Message>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(messages.len());
        let mut next_id = 0;
        for message in messages.iter_mut() {
            if !seen.insert(message.id) {
                return Err(Error::validation(
                    format!("duplicate message id {}", message.id),
                    Some("messages".to_string()),
                ));
            }
            let after = message.id.get().checked_add(1).ok_or_else(|| {
                Error::validation(
                    format!("message id {} is out of range", message.id),
                    Some("messages".to_string()),
                )
            })?;
            next_id = next_id.max(after);
            message.status = MessageStatus::Final;
        }
        Ok(Self { messages, next_id })
    }

    /// Returns the messages, newest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Iterates over the messages, newest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    /// Returns the number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if there are no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the most recently prepended message.
    pub fn newest(&self) -> Option<&Message> {
        self.messages.first()
    }

    /// Looks up a message by id.
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Returns the message that is currently streaming, if any.
    pub fn streaming(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_streaming())
    }

    /// Returns an owned copy of the current messages, newest first.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Prepends a new message and returns its id.
    ///
    /// A streaming message is only created when no other message is streaming;
    /// otherwise the new message is created final.
    pub fn prepend(
        &mut self,
        sender: Sender,
        content: impl Into<String>,
        status: MessageStatus,
    ) -> MessageId {
        let status = if status == MessageStatus::Streaming && self.streaming().is_some() {
            tracing::warn!("refusing to create a second streaming message");
            MessageStatus::Final
        } else {
            status
        };
        let id = MessageId::new(self.next_id);
        self.next_id += 1;
        self.messages
            .insert(0, Message::new(id, sender, content, status));
        id
    }

    /// Removes every message.  Id allocation continues where it left off.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Counts messages from `sender`.
    pub fn count_from(&self, sender: Sender) -> usize {
        self.messages.iter().filter(|m| m.sender == sender).count()
    }
}

impl<'a> IntoIterator for &'a MessageList {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
