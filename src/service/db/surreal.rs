//! SurrealDB implementation of the trigger store.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use surrealdb::{
    Surreal,
    engine::any::{self, Any},
    opt::auth::Root,
};
use tracing::{debug, info, instrument};

use crate::base::{
    config::Config,
    types::{ChatChannel, Res, TriggerError, TriggerSet, Void},
};

use super::{DbClient, GenericDbClient, HighlightLimits, normalize_highlight};

// Extra methods on `DbClient` applied by the surreal implementation.

impl DbClient {
    /// Creates a new SurrealDB trigger store from the configuration.
    pub async fn surreal(config: &Config) -> Res<Self> {
        let client = SurrealDbClient::new(config).await?;
        Ok(Self::new(std::sync::Arc::new(client)))
    }

    /// Creates a new in-memory SurrealDB trigger store.
    pub async fn surreal_memory(limits: HighlightLimits) -> Res<Self> {
        let client = SurrealDbClient::memory(limits).await?;
        Ok(Self::new(std::sync::Arc::new(client)))
    }
}

// Records.

/// A highlight record in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HighlightRecord {
    guild_id: String,
    user_id: String,
    highlight: String,
    /// Microseconds since the epoch; used to keep insertion order.
    added_at: i64,
}

/// A block record in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlockRecord {
    user_id: String,
    entity_id: String,
}

// Specific implementations.

/// SurrealDB trigger store.
#[derive(Clone)]
pub struct SurrealDbClient {
    db: Surreal<Any>,
    limits: HighlightLimits,
}

impl SurrealDbClient {
    /// Connect to the configured endpoint.
    #[instrument(name = "SurrealDbClient::new", skip_all)]
    pub async fn new(config: &Config) -> Res<Self> {
        let db = any::connect(config.db_endpoint.as_str()).await?;

        // The embedded engine has no users to sign in as.
        if !config.db_endpoint.starts_with("mem:") {
            db.signin(Root {
                username: &config.db_username,
                password: &config.db_password,
            })
            .await?;
        }

        db.use_ns(config.db_namespace.as_str()).use_db(config.db_database.as_str()).await?;

        let limits = HighlightLimits {
            max_highlights: config.max_highlights,
            max_length: config.max_highlight_length,
        };

        Self::initialize(db, limits).await
    }

    /// Create an in-memory store.
    #[instrument(name = "SurrealDbClient::memory", skip_all)]
    pub async fn memory(limits: HighlightLimits) -> Res<Self> {
        let db = any::connect("mem://").await?;
        db.use_ns("highlight").use_db("bot").await?;

        Self::initialize(db, limits).await
    }

    async fn initialize(db: Surreal<Any>, limits: HighlightLimits) -> Res<Self> {
        // Define schemas.

        db.query("DEFINE TABLE IF NOT EXISTS highlight SCHEMALESS").await?.check()?;
        db.query("DEFINE INDEX IF NOT EXISTS highlight_guild ON highlight FIELDS guild_id").await?.check()?;
        db.query("DEFINE TABLE IF NOT EXISTS block SCHEMALESS").await?.check()?;
        db.query("DEFINE INDEX IF NOT EXISTS block_user ON block FIELDS user_id").await?.check()?;

        info!("Database initialized successfully.");

        Ok(Self { db, limits })
    }

    async fn highlight_records(&self, guild_id: &str, user_id: &str) -> Res<Vec<HighlightRecord>> {
        let mut response = self
            .db
            .query("SELECT guild_id, user_id, highlight, added_at FROM highlight WHERE guild_id = $guild AND user_id = $user ORDER BY added_at ASC")
            .bind(("guild", guild_id.to_string()))
            .bind(("user", user_id.to_string()))
            .await?;

        Ok(response.take(0)?)
    }

    async fn insert_highlight(&self, guild_id: &str, user_id: &str, highlight: String) -> Void {
        let record = HighlightRecord {
            guild_id: guild_id.to_string(),
            user_id: user_id.to_string(),
            highlight,
            added_at: chrono::Utc::now().timestamp_micros(),
        };

        self.db.query("CREATE highlight CONTENT $record").bind(("record", record)).await?.check()?;

        Ok(())
    }
}

#[async_trait]
impl GenericDbClient for SurrealDbClient {
    #[instrument(skip(self))]
    async fn user_highlights(&self, guild_id: &str, user_id: &str) -> Res<Vec<String>> {
        let records = self.highlight_records(guild_id, user_id).await?;

        Ok(records.into_iter().map(|r| r.highlight).collect())
    }

    #[instrument(skip_all)]
    async fn channel_highlights(&self, channel: &ChatChannel) -> Res<TriggerSet> {
        let Some(guild) = &channel.guild else {
            return Ok(TriggerSet::new());
        };

        let mut response = self
            .db
            .query("SELECT guild_id, user_id, highlight, added_at FROM highlight WHERE guild_id = $guild")
            .bind(("guild", guild.id.clone()))
            .query("SELECT user_id, entity_id FROM block WHERE entity_id IN $entities")
            .bind(("entities", channel.block_entities().into_iter().map(str::to_string).collect::<Vec<_>>()))
            .await?;

        let highlights: Vec<HighlightRecord> = response.take(0)?;
        let blocks: Vec<BlockRecord> = response.take(1)?;

        let blocked_users = blocks.into_iter().map(|b| b.user_id).collect::<BTreeSet<_>>();

        let mut result = TriggerSet::new();
        for record in highlights.into_iter().filter(|r| !blocked_users.contains(&r.user_id)) {
            result.entry(record.highlight).or_default().insert(record.user_id);
        }

        debug!("Channel `{}` has {} visible highlights.", channel.id, result.len());

        Ok(result)
    }

    #[instrument(skip(self))]
    async fn blocks(&self, user_id: &str) -> Res<BTreeSet<String>> {
        let mut response = self.db.query("SELECT user_id, entity_id FROM block WHERE user_id = $user").bind(("user", user_id.to_string())).await?;

        let blocks: Vec<BlockRecord> = response.take(0)?;

        Ok(blocks.into_iter().map(|b| b.entity_id).collect())
    }

    #[instrument(skip(self))]
    async fn add(&self, guild_id: &str, user_id: &str, highlight: &str) -> Void {
        let highlight = normalize_highlight(highlight, &self.limits)?;
        let existing = self.highlight_records(guild_id, user_id).await?;

        if existing.iter().any(|r| r.highlight == highlight) {
            return Err(TriggerError::Duplicate(highlight).into());
        }

        if existing.len() >= self.limits.max_highlights {
            return Err(TriggerError::OverQuota { limit: self.limits.max_highlights }.into());
        }

        self.insert_highlight(guild_id, user_id, highlight).await
    }

    #[instrument(skip(self))]
    async fn remove(&self, guild_id: &str, user_id: &str, highlight: &str) -> Void {
        let highlight = highlight.trim().to_lowercase();

        self.db
            .query("DELETE highlight WHERE guild_id = $guild AND user_id = $user AND highlight = $highlight")
            .bind(("guild", guild_id.to_string()))
            .bind(("user", user_id.to_string()))
            .bind(("highlight", highlight))
            .await?
            .check()?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear(&self, guild_id: &str, user_id: &str) -> Void {
        self.db
            .query("DELETE highlight WHERE guild_id = $guild AND user_id = $user")
            .bind(("guild", guild_id.to_string()))
            .bind(("user", user_id.to_string()))
            .await?
            .check()?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn block(&self, user_id: &str, entity_id: &str) -> Void {
        if self.blocks(user_id).await?.contains(entity_id) {
            return Ok(());
        }

        let record = BlockRecord {
            user_id: user_id.to_string(),
            entity_id: entity_id.to_string(),
        };

        self.db.query("CREATE block CONTENT $record").bind(("record", record)).await?.check()?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn unblock(&self, user_id: &str, entity_id: &str) -> Void {
        self.db
            .query("DELETE block WHERE user_id = $user AND entity_id = $entity")
            .bind(("user", user_id.to_string()))
            .bind(("entity", entity_id.to_string()))
            .await?
            .check()?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn import(&self, source_guild_id: &str, target_guild_id: &str, user_id: &str) -> Void {
        let source = self.highlight_records(source_guild_id, user_id).await?;

        if source.is_empty() {
            return Err(TriggerError::UnknownImportSource(source_guild_id.to_string()).into());
        }

        let target = self.highlight_records(target_guild_id, user_id).await?;
        let missing = source
            .into_iter()
            .map(|r| r.highlight)
            .filter(|h| !target.iter().any(|t| &t.highlight == h))
            .collect::<Vec<_>>();

        if target.len() + missing.len() > self.limits.max_highlights {
            return Err(TriggerError::OverQuota { limit: self.limits.max_highlights }.into());
        }

        for highlight in missing {
            self.insert_highlight(target_guild_id, user_id, highlight).await?;
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_account(&self, user_id: &str) -> Void {
        self.db
            .query("DELETE highlight WHERE user_id = $user")
            .query("DELETE block WHERE user_id = $user")
            .bind(("user", user_id.to_string()))
            .await?
            .check()?;

        info!("Deleted account data for `{}`.", user_id);

        Ok(())
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use crate::base::types::ChatGuild;

    use super::*;

    const LIMITS: HighlightLimits = HighlightLimits { max_highlights: 3, max_length: 100 };

    async fn store() -> SurrealDbClient {
        SurrealDbClient::memory(LIMITS).await.unwrap()
    }

    fn channel(id: &str, category_id: Option<&str>) -> ChatChannel {
        ChatChannel {
            id: id.to_string(),
            guild: Some(ChatGuild {
                id: "T1".to_string(),
                name: "Test".to_string(),
            }),
            category_id: category_id.map(str::to_string),
        }
    }

    fn kind(err: &anyhow::Error) -> Option<&TriggerError> {
        err.downcast_ref::<TriggerError>()
    }

    #[tokio::test]
    async fn test_add_normalizes_and_keeps_order() {
        let db = store().await;

        db.add("T1", "U1", "Coffee").await.unwrap();
        db.add("T1", "U1", " tea time ").await.unwrap();

        assert_eq!(db.user_highlights("T1", "U1").await.unwrap(), vec!["coffee", "tea time"]);
        assert!(db.user_highlights("T2", "U1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_and_over_quota() {
        let db = store().await;

        db.add("T1", "U1", "a").await.unwrap();
        let err = db.add("T1", "U1", "A").await.unwrap_err();
        assert_eq!(kind(&err), Some(&TriggerError::Duplicate("a".to_string())));

        db.add("T1", "U1", "b").await.unwrap();
        db.add("T1", "U1", "c").await.unwrap();
        let err = db.add("T1", "U1", "d").await.unwrap_err();
        assert_eq!(kind(&err), Some(&TriggerError::OverQuota { limit: 3 }));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let db = store().await;

        db.add("T1", "U1", "coffee").await.unwrap();
        db.add("T1", "U1", "tea").await.unwrap();

        db.remove("T1", "U1", "COFFEE").await.unwrap();
        assert_eq!(db.user_highlights("T1", "U1").await.unwrap(), vec!["tea"]);

        db.remove("T1", "U1", "missing").await.unwrap();
        db.clear("T1", "U1").await.unwrap();
        assert!(db.user_highlights("T1", "U1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_channel_highlights_groups_owners() {
        let db = store().await;

        db.add("T1", "U1", "coffee").await.unwrap();
        db.add("T1", "U2", "coffee").await.unwrap();
        db.add("T1", "U2", "tea").await.unwrap();
        db.add("T2", "U3", "tea").await.unwrap();

        let set = db.channel_highlights(&channel("C1", None)).await.unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set["coffee"].iter().collect::<Vec<_>>(), vec!["U1", "U2"]);
        assert_eq!(set["tea"].iter().collect::<Vec<_>>(), vec!["U2"]);
    }

    #[tokio::test]
    async fn test_channel_highlights_excludes_channel_and_category_blocks() {
        let db = store().await;

        db.add("T1", "U1", "coffee").await.unwrap();
        db.add("T1", "U2", "coffee").await.unwrap();
        db.add("T1", "U3", "coffee").await.unwrap();
        db.block("U1", "C1").await.unwrap();
        db.block("U2", "K1").await.unwrap();

        let set = db.channel_highlights(&channel("C1", Some("K1"))).await.unwrap();
        assert_eq!(set["coffee"].iter().collect::<Vec<_>>(), vec!["U3"]);

        let set = db.channel_highlights(&channel("C2", None)).await.unwrap();
        assert_eq!(set["coffee"].len(), 3);
    }

    #[tokio::test]
    async fn test_channel_highlights_without_guild_is_empty() {
        let db = store().await;
        db.add("T1", "U1", "coffee").await.unwrap();

        let dm = ChatChannel {
            id: "D1".to_string(),
            guild: None,
            category_id: None,
        };

        assert!(db.channel_highlights(&dm).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_block_is_idempotent_and_unblock_reverts() {
        let db = store().await;

        db.block("U1", "U9").await.unwrap();
        db.block("U1", "U9").await.unwrap();
        assert_eq!(db.blocks("U1").await.unwrap().len(), 1);

        db.unblock("U1", "U9").await.unwrap();
        assert!(db.blocks("U1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_copies_missing_highlights() {
        let db = store().await;

        db.add("T1", "U1", "coffee").await.unwrap();
        db.add("T1", "U1", "tea").await.unwrap();
        db.add("T2", "U1", "tea").await.unwrap();

        db.import("T1", "T2", "U1").await.unwrap();

        assert_eq!(db.user_highlights("T2", "U1").await.unwrap(), vec!["tea", "coffee"]);
    }

    #[tokio::test]
    async fn test_import_errors() {
        let db = store().await;

        let err = db.import("T9", "T2", "U1").await.unwrap_err();
        assert_eq!(kind(&err), Some(&TriggerError::UnknownImportSource("T9".to_string())));

        db.add("T1", "U1", "a").await.unwrap();
        db.add("T1", "U1", "b").await.unwrap();
        db.add("T2", "U1", "c").await.unwrap();
        db.add("T2", "U1", "d").await.unwrap();

        let err = db.import("T1", "T2", "U1").await.unwrap_err();
        assert_eq!(kind(&err), Some(&TriggerError::OverQuota { limit: 3 }));
        assert_eq!(db.user_highlights("T2", "U1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_account_removes_everything() {
        let db = store().await;

        db.add("T1", "U1", "coffee").await.unwrap();
        db.add("T2", "U1", "tea").await.unwrap();
        db.add("T1", "U2", "tea").await.unwrap();
        db.block("U1", "C1").await.unwrap();

        db.delete_account("U1").await.unwrap();

        assert!(db.user_highlights("T1", "U1").await.unwrap().is_empty());
        assert!(db.user_highlights("T2", "U1").await.unwrap().is_empty());
        assert!(db.blocks("U1").await.unwrap().is_empty());
        assert_eq!(db.user_highlights("T1", "U2").await.unwrap(), vec!["tea"]);
    }
}
