//! Append-only conversation log owned by a single workflow run.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Which participant of the loop produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Requester,
    GroceryListGenerator,
    BudgetRouter,
    RecipeGenerator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub speaker: Speaker,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, speaker: Speaker, content: impl Into<String>) -> Self {
        Self {
            role,
            speaker,
            content: content.into(),
        }
    }
}

/// Messages can only be appended, and only from inside the crate; the
/// version is the number of messages recorded so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new(opening: Message) -> Self {
        Self {
            messages: vec![opening],
        }
    }

    pub(crate) fn push(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn version(&self) -> usize {
        self.messages.len()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn by_speaker(&self, speaker: Speaker) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.speaker == speaker)
    }
}
