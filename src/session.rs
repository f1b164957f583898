use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "New Chat";
pub const WELCOME_ID: &str = "welcome-msg";
pub const WELCOME_TEXT: &str = "Hi! I'm the portfolio AI assistant. I can help you learn about the **projects**, **technical skills**, and **professional experience** shown here. What would you like to know?";
pub const TITLE_MAX_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4().to_string(), role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4().to_string(), role: Role::Assistant, content: content.into() }
    }

    fn welcome() -> Self {
        Self { id: WELCOME_ID.into(), role: Role::Assistant, content: WELCOME_TEXT.into() }
    }
}

/// A titled thread of messages. Messages are append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.into(),
            messages: vec![Message::welcome()],
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn has_user_messages(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::User)
    }

    pub fn retitle_from(&mut self, text: &str) {
        self.title = text.chars().take(TITLE_MAX_CHARS).collect();
    }
}

impl Default for ChatSession {
    fn default() -> Self { Self::new() }
}
