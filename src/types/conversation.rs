use serde::{Deserialize, Serialize};

/// A past conversation as shown in the conversation list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    /// Backend-assigned conversation id.
    pub id: String,

    /// Display title.
    pub title: String,
}

impl Conversation {
    /// Creates a new conversation entry.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Read-only display data for past conversations.
///
/// The backend owns the real list; the client only displays it and may hide
/// entries locally.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationList {
    conversations: Vec<Conversation>,
}

impl ConversationList {
    /// Creates a list from backend-supplied entries.
    pub fn new(conversations: Vec<Conversation>) -> Self {
        Self { conversations }
    }

    /// Placeholder entries shown until a backend supplies real ones.
    pub fn placeholder() -> Self {
        Self::new(vec![
            Conversation::new("1", "React Hooks"),
            Conversation::new("2", "TypeScript Basics"),
            Conversation::new("3", "CSS Modules"),
        ])
    }

    /// Returns the entries in display order.
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Looks up an entry by id.
    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Removes an entry, returning true if it was present.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        self.conversations.len() != before
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}
