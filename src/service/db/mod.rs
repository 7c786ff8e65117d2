pub mod surreal;

use std::{collections::BTreeSet, ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{ChatChannel, Res, TriggerError, TriggerSet, Void};

// Traits.

/// Generic trigger store trait that clients must implement.
///
/// This trait defines the storage of registered highlight words and block
/// lists. Highlight text is stored normalized (trimmed, lowercased) and is
/// scoped to a guild; blocks are global to the user.
///
/// Mutations fail with a [`TriggerError`] (wrapped in `anyhow`) for bad user input.
#[async_trait]
pub trait GenericDbClient: Send + Sync + 'static {
    /// Gets the user's highlights in a guild, in the order they were added.
    async fn user_highlights(&self, guild_id: &str, user_id: &str) -> Res<Vec<String>>;

    /// Gets every highlight visible in a channel, mapped to the users who registered it.
    ///
    /// Users who have blocked the channel, or its category, are already excluded.
    async fn channel_highlights(&self, channel: &ChatChannel) -> Res<TriggerSet>;

    /// Gets the set of entity ids (users, channels, categories) the user has blocked.
    async fn blocks(&self, user_id: &str) -> Res<BTreeSet<String>>;

    /// Registers a highlight for the user in a guild.
    async fn add(&self, guild_id: &str, user_id: &str, highlight: &str) -> Void;

    /// Removes a highlight, if the user has it.
    async fn remove(&self, guild_id: &str, user_id: &str, highlight: &str) -> Void;

    /// Removes all of the user's highlights in a guild.
    async fn clear(&self, guild_id: &str, user_id: &str) -> Void;

    /// Blocks an entity from highlighting the user.
    async fn block(&self, user_id: &str, entity_id: &str) -> Void;

    /// Reverts a previous block.
    async fn unblock(&self, user_id: &str, entity_id: &str) -> Void;

    /// Copies the user's highlights from one guild into another.
    async fn import(&self, source_guild_id: &str, target_guild_id: &str, user_id: &str) -> Void;

    /// Deletes every highlight and block the user has.
    async fn delete_account(&self, user_id: &str) -> Void;
}

// Structs.

/// Trigger store client for highlight-bot.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct DbClient {
    /// The database client instance.
    pub inner: Arc<dyn GenericDbClient>,
}

impl Deref for DbClient {
    type Target = dyn GenericDbClient;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DbClient {
    pub fn new(inner: Arc<dyn GenericDbClient>) -> Self {
        Self { inner }
    }
}

// Helpers.

/// Limits applied to highlight mutations.
#[derive(Debug, Clone, Copy)]
pub struct HighlightLimits {
    /// Highlights a user may have per guild.
    pub max_highlights: usize,
    /// Maximum characters in one highlight.
    pub max_length: usize,
}

/// Normalize a highlight for storage and comparison.
pub fn normalize_highlight(highlight: &str, limits: &HighlightLimits) -> Res<String> {
    let normalized = highlight.trim().to_lowercase();

    if normalized.is_empty() {
        return Err(TriggerError::Empty.into());
    }

    if normalized.chars().count() > limits.max_length {
        return Err(TriggerError::TooLong { max: limits.max_length }.into());
    }

    Ok(normalized)
}
