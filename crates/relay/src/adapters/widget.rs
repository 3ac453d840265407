use serde::{Deserialize, Serialize};

use crate::models::message::{Conversation, Message};
use crate::models::role::Role;

/// A chat widget entry: `{"role": "user", "content": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetMessage {
    pub role: Role,
    pub content: String,
}

impl WidgetMessage {
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

pub fn to_conversation(messages: &[WidgetMessage]) -> Conversation {
    messages
        .iter()
        .filter_map(|entry| {
            let message = match entry.role {
                Role::User => Message::user(),
                Role::Assistant => Message::assistant(),
                Role::System => Message::system(),
                Role::Tool => return None,
            };
            Some(message.with_text(entry.content.as_str()))
        })
        .collect()
}

/// Only user and assistant text is shown; tool round trips stay internal
pub fn from_conversation(conversation: &[Message]) -> Vec<WidgetMessage> {
    conversation
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant))
        .filter(|m| !m.has_tool_request())
        .map(|m| WidgetMessage::new(m.role, m.text()))
        .collect()
}
