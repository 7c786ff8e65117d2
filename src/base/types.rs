use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

/// Normalized trigger text mapped to the ids of the users who registered it.
///
/// Both levels are ordered so that iteration (and therefore match emission) is
/// deterministic for a fixed input.
pub type TriggerSet = BTreeMap<String, BTreeSet<String>>;

/// A user on the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatUser {
    pub id: String,
    pub name: String,
}

/// A guild-like grouping of channels (a Slack workspace).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatGuild {
    pub id: String,
    pub name: String,
}

/// A channel that a message was posted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatChannel {
    pub id: String,
    /// The owning guild; `None` for direct / group conversations, which are never scanned.
    pub guild: Option<ChatGuild>,
    /// The channel category, on platforms that have them.
    pub category_id: Option<String>,
}

impl ChatChannel {
    /// The ids a user may block to silence this channel.
    pub fn block_entities(&self) -> Vec<&str> {
        std::iter::once(self.id.as_str()).chain(self.category_id.as_deref()).collect()
    }
}

/// A message posted to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub channel: ChatChannel,
    pub author: ChatUser,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A "user started typing" notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingEvent {
    pub channel_id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
}

/// A user to notify, and the trigger text that fired for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub user: ChatUser,
    pub trigger: String,
}

/// A pending notification, consumed by the dispatcher.
#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub user: ChatUser,
    pub trigger: String,
    pub message: ChatMessage,
    pub enqueued_at: DateTime<Utc>,
}

/// User-input errors raised by trigger store mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    #[error("Highlight words or phrases cannot be empty.")]
    Empty,
    #[error("Highlight words or phrases can be at most {max} characters long.")]
    TooLong { max: usize },
    #[error("You already have `{0}` as a highlight.")]
    Duplicate(String),
    #[error("You may only have up to {limit} highlight words or phrases.")]
    OverQuota { limit: usize },
    #[error("You do not have any highlights in `{0}` to import.")]
    UnknownImportSource(String),
}
