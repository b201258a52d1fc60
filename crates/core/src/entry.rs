//! A single conversation turn.

use serde::{Deserialize, Serialize};

use crate::message::{ChatMessage, Role};
use crate::response::Response;

/// One immutable turn in a conversation.
///
/// `content`, when present, is the raw structured payload that goes on the
/// wire instead of `body`. Role and content are fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    author: String,
    body: String,
    #[serde(default)]
    role: Role,
    #[serde(default)]
    content: Option<String>,
}

impl Entry {
    /// A plain operator entry: role `user`, no structured content.
    pub fn new(author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            body: body.into(),
            role: Role::User,
            content: None,
        }
    }

    /// An entry carrying an interpreted backend response.
    pub fn from_response(author: impl Into<String>, response: &Response) -> Self {
        Self {
            author: author.into(),
            body: response.body.clone(),
            role: response.role,
            content: response.content.clone(),
        }
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Wire projection: structured content wins over the rendered body.
    pub fn message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone().unwrap_or_else(|| self.body.clone()),
        }
    }
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.author, self.body)
    }
}
