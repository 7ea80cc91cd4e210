//! Conversation store: an ordered, append-only log of user and assistant turns.
//!
//! The only in-place mutation is [`Conversation::replace_last`], which turns
//! the trailing pending placeholder into its resolved or failed form. Once an
//! entry has left `Pending` it is never touched again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messages::{HistoryTurn, Reference};

/// Content shown while an answer is outstanding.
pub const PENDING_SENTINEL: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Resolved,
    Failed,
}

/// One turn in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,
    #[serde(default)]
    pub sources: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text.into(), MessageStatus::Resolved)
    }

    pub fn pending() -> Self {
        Self::new(Role::Assistant, PENDING_SENTINEL.into(), MessageStatus::Pending)
    }

    pub fn resolved(
        answer: impl Into<String>,
        sources: Vec<Reference>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        let mut m = Self::new(Role::Assistant, answer.into(), MessageStatus::Resolved);
        m.sources = sources;
        m.metadata = metadata;
        m
    }

    pub fn failed(explanation: impl Into<String>) -> Self {
        Self::new(Role::Assistant, explanation.into(), MessageStatus::Failed)
    }

    fn new(role: Role, content: String, status: MessageStatus) -> Self {
        Message {
            role,
            content,
            status,
            sources: Vec::new(),
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == MessageStatus::Pending
    }
}

/// Rejected store transition. Indicates a caller bug, never a network condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantError {
    #[error("conversation is empty")]
    EmptyLog,
    #[error("last entry is not pending")]
    NotPending,
    #[error("an answer is still pending")]
    PendingOutstanding,
    #[error("replacement entry must be resolved or failed")]
    ReplacementPending,
}

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    entries: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `message` to the end of the log. Nothing may follow a pending entry.
    pub fn append(&mut self, message: Message) -> Result<(), InvariantError> {
        if self.has_pending() {
            return Err(InvariantError::PendingOutstanding);
        }
        self.entries.push(message);
        Ok(())
    }

    /// Replace the trailing pending entry with its terminal form.
    pub fn replace_last(&mut self, message: Message) -> Result<(), InvariantError> {
        if message.is_pending() {
            return Err(InvariantError::ReplacementPending);
        }
        let last = self.entries.last_mut().ok_or(InvariantError::EmptyLog)?;
        if !last.is_pending() {
            return Err(InvariantError::NotPending);
        }
        *last = message;
        Ok(())
    }

    /// The log with pending entries removed, in original order.
    pub fn snapshot_excluding_pending(&self) -> Vec<Message> {
        self.entries
            .iter()
            .filter(|m| !m.is_pending())
            .cloned()
            .collect()
    }

    /// Prior exchanges as `{user, bot}` pairs for request context.
    /// A failed answer contributes an empty `bot` text.
    pub fn history(&self) -> Vec<HistoryTurn> {
        let mut turns = Vec::new();
        let mut question: Option<String> = None;
        for m in self.snapshot_excluding_pending() {
            match m.role {
                Role::User => {
                    if let Some(user) = question.replace(m.content) {
                        turns.push(HistoryTurn {
                            user,
                            bot: String::new(),
                        });
                    }
                }
                Role::Assistant => {
                    let bot = match m.status {
                        MessageStatus::Resolved => m.content,
                        _ => String::new(),
                    };
                    turns.push(HistoryTurn {
                        user: question.take().unwrap_or_default(),
                        bot,
                    });
                }
            }
        }
        turns
    }

    pub fn has_pending(&self) -> bool {
        self.entries.last().is_some_and(Message::is_pending)
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
