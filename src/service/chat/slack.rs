//! Chat service integration for highlight-bot.
//!
//! This module provides the Slack implementation of `GenericChatClient`:
//! - Receiving message events and slash commands over socket mode
//! - Sending private notifications
//! - Retrieving the history surrounding a message

use crate::{
    base::{
        config::Config,
        types::{ChatChannel, ChatGuild, ChatMessage, ChatUser, Res, Void},
    },
    highlight::Highlighter,
    interaction,
    service::db::DbClient,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use slack_morphism::prelude::*;
use tracing::{debug, info, instrument, warn};

use std::sync::Arc;

use super::{ChatClient, GenericChatClient};

// Type aliases.

type FullClient = slack_morphism::SlackClient<SlackClientHyperConnector<HttpsConnector<HttpConnector>>>;

/// Page size when walking forward from a message.
const LATER_PAGE_LIMIT: u16 = 100;

/// The most pages read when walking forward from a message.
const LATER_MAX_PAGES: usize = 10;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub async fn slack(config: &Config, db: DbClient) -> Res<Self> {
        let client = SlackChatClient::new(config, db).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

impl From<SlackChatClient> for ChatClient {
    fn from(client: SlackChatClient) -> Self {
        Self { inner: Arc::new(client) }
    }
}

// Structs.

/// User state for the slack socket client.
struct SlackUserState {
    highlighter: Highlighter,
    guild: ChatGuild,
}

/// Slack client implementation.
#[derive(Clone)]
struct SlackChatClient {
    app_token: SlackApiToken,
    bot_token: SlackApiToken,
    bot_user_id: String,
    guild: ChatGuild,
    /// The workspace's web address, used for permalinks.
    workspace_url: String,
    client: Arc<FullClient>,
    config: Config,
    db: DbClient,
    /// Users already resolved through `users.info`.
    users: Arc<DashMap<String, ChatUser>>,
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub async fn new(config: &Config, db: DbClient) -> Res<Self> {
        // Initialize tokens.

        let app_token = SlackApiToken::new(SlackApiTokenValue(config.slack_app_token.clone()));
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.slack_bot_token.clone()));

        // Initialize the Slack client.

        let https_connector = HttpsConnector::<HttpConnector>::builder().with_native_roots()?.https_only().enable_all_versions().build();
        let connector = SlackClientHyperConnector::with_connector(https_connector);
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        // Get the bot's user ID, and the workspace it is installed in.

        let session = client.open_session(&bot_token);
        let auth = session.auth_test().await?;
        let bot_user_id = auth.user_id.0;
        let guild = ChatGuild { id: auth.team_id.0, name: auth.team };
        let workspace_url = auth.url.0.to_string();

        info!("Slack bot user ID: {} (workspace `{}`)", bot_user_id, guild.id);

        Ok(Self {
            app_token,
            bot_token,
            bot_user_id,
            guild,
            workspace_url,
            client,
            config: config.clone(),
            db,
            users: Arc::new(DashMap::new()),
        })
    }

    async fn history(&self, request: &SlackApiConversationsHistoryRequest) -> Res<SlackApiConversationsHistoryResponse> {
        let session = self.client.open_session(&self.bot_token);
        let response = session.conversations_history(request).await.map_err(|e| anyhow::anyhow!("Failed to fetch history: {}", e))?;

        Ok(response)
    }

    /// The `count` messages immediately following `anchor`, newest first.
    ///
    /// Slack pages newest first, so the walk continues until the page nearest the
    /// anchor. Past `LATER_MAX_PAGES` pages, the oldest messages seen are used.
    async fn history_after(&self, channel: &SlackChannelId, anchor: &SlackTs, count: usize) -> Res<Vec<SlackHistoryMessage>> {
        let mut nearest = Vec::new();
        let mut cursor: Option<SlackCursorId> = None;

        if count == 0 {
            return Ok(nearest);
        }

        for _ in 0..LATER_MAX_PAGES {
            let mut request = SlackApiConversationsHistoryRequest::new()
                .with_channel(channel.clone())
                .with_oldest(anchor.clone())
                .with_inclusive(false)
                .with_limit(LATER_PAGE_LIMIT);

            if let Some(cursor) = cursor.take() {
                request = request.with_cursor(cursor);
            }

            let response = self.history(&request).await?;

            // Every page is older than the one before it.
            nearest.extend(response.messages);
            let excess = nearest.len().saturating_sub(count);
            nearest.drain(..excess);

            cursor = response.response_metadata.and_then(|m| m.next_cursor).filter(|c| !c.0.is_empty());

            if cursor.is_none() {
                break;
            }
        }

        Ok(nearest)
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn start(&self) -> Void {
        // Initialize the socket mode listener.

        let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new().with_command_events(handle_command_event).with_push_events(handle_push_event);

        // Initialize the socket mode listener environment.

        let highlighter = Highlighter::new(self.config.clone(), self.db.clone(), ChatClient::from(self.clone()));

        let listener_environment = Arc::new(SlackClientEventsListenerEnvironment::new(self.client.clone()).with_user_state(SlackUserState {
            highlighter,
            guild: self.guild.clone(),
        }));

        let socket_mode_listener = Arc::new(SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            listener_environment.clone(),
            socket_mode_callbacks,
        ));

        // Register an app token to listen for events,
        socket_mode_listener.listen_for(&self.app_token).await?;

        // Start WS connections calling Slack API to get WS url for the token,
        // and wait for Ctrl-C to shutdown.
        socket_mode_listener.serve().await;

        Ok(())
    }

    fn should_reply(&self, message: &ChatMessage) -> bool {
        message.author.id != self.bot_user_id && !message.content.trim().is_empty()
    }

    #[instrument(skip(self))]
    async fn get_user(&self, user_id: &str) -> Res<ChatUser> {
        if let Some(user) = self.users.get(user_id) {
            return Ok(user.clone());
        }

        let request = SlackApiUsersInfoRequest::new(SlackUserId(user_id.to_string()));
        let session = self.client.open_session(&self.bot_token);

        let response = session.users_info(&request).await.map_err(|e| anyhow::anyhow!("Failed to fetch user: {}", e))?;

        let user = ChatUser {
            id: user_id.to_string(),
            name: response.user.name.unwrap_or_else(|| user_id.to_string()),
        };

        self.users.insert(user_id.to_string(), user.clone());

        Ok(user)
    }

    #[instrument(skip(self, text))]
    async fn send_direct_message(&self, user_id: &str, text: &str) -> Void {
        let message = SlackMessageContent::new().with_text(text.to_string());

        // Posting to a user ID delivers to the bot's direct conversation with them.
        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(user_id.to_string()), message).with_unfurl_links(false);

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(())
    }

    #[instrument(skip_all, fields(channel = %message.channel.id, message_id = %message.id))]
    async fn get_history_around(&self, message: &ChatMessage, before: usize, after: usize) -> Res<Vec<ChatMessage>> {
        let channel = SlackChannelId(message.channel.id.clone());
        let anchor = SlackTs(message.id.clone());

        // Newest first, ending at (and including) the anchor.
        let earlier = SlackApiConversationsHistoryRequest::new()
            .with_channel(channel.clone())
            .with_latest(anchor.clone())
            .with_inclusive(true)
            .with_limit(u16::try_from(before + 1).unwrap_or(u16::MAX));

        let earlier = self.history(&earlier).await?.messages;
        let later = self.history_after(&channel, &anchor, after).await?;

        let fetched = earlier.iter().chain(later.iter()).filter_map(|m| message_from_history(m, &message.channel)).collect();
        let messages = merge_around(fetched, message);

        debug!("Fetched {} messages of context.", messages.len());

        Ok(messages)
    }

    fn message_link(&self, message: &ChatMessage) -> String {
        permalink(&self.workspace_url, &message.channel.id, &message.id)
    }
}

// Conversions.

/// Parse a Slack timestamp (`"1712345678.123456"`).
fn ts_to_datetime(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, fraction) = ts.split_once('.').unwrap_or((ts, "0"));
    let secs = secs.parse::<i64>().ok()?;
    let micros = format!("{fraction:0<6}").get(..6)?.parse::<u32>().ok()?;

    DateTime::from_timestamp(secs, micros * 1000)
}

/// A message's archive address within its workspace.
fn permalink(workspace_url: &str, channel_id: &str, ts: &str) -> String {
    format!("{}/archives/{}/p{}", workspace_url.trim_end_matches('/'), channel_id, ts.replace('.', ""))
}

/// Order fetched context chronologically, drop duplicates, and make sure `anchor` is included.
fn merge_around(mut messages: Vec<ChatMessage>, anchor: &ChatMessage) -> Vec<ChatMessage> {
    if !messages.iter().any(|m| m.id == anchor.id) {
        messages.push(anchor.clone());
    }

    // Slack timestamps double as ids, so equal ids sort next to each other.
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    messages.dedup_by(|a, b| a.id == b.id);

    messages
}

/// Users are rendered as mentions, which Slack displays with their current name.
fn mention(user_id: &str) -> ChatUser {
    ChatUser {
        id: user_id.to_string(),
        name: format!("<@{user_id}>"),
    }
}

/// Convert a socket mode message event; `None` for anything other than a plain user message.
fn message_from_event(event: &SlackMessageEvent, guild: &ChatGuild) -> Option<ChatMessage> {
    if event.subtype.is_some() || event.sender.bot_id.is_some() {
        return None;
    }

    let channel_id = event.origin.channel.as_ref()?.0.clone();
    let author = event.sender.user.as_ref()?;
    let content = event.content.as_ref().and_then(|c| c.text.clone()).unwrap_or_default();
    let created_at = ts_to_datetime(&event.origin.ts.0)?;

    // Direct and group conversations are not tracked.
    let is_conversation = matches!(event.origin.channel_type.as_ref().map(|t| t.0.as_str()), Some("im" | "mpim"));

    Some(ChatMessage {
        id: event.origin.ts.0.clone(),
        channel: ChatChannel {
            id: channel_id,
            guild: (!is_conversation).then(|| guild.clone()),
            category_id: None,
        },
        author: mention(&author.0),
        content,
        created_at,
    })
}

/// Convert a history entry belonging to `channel`.
fn message_from_history(message: &SlackHistoryMessage, channel: &ChatChannel) -> Option<ChatMessage> {
    let created_at = ts_to_datetime(&message.origin.ts.0)?;

    let author = match (&message.sender.user, &message.sender.username) {
        (Some(user), _) => mention(&user.0),
        (None, Some(name)) => ChatUser {
            id: name.clone(),
            name: name.clone(),
        },
        (None, None) => ChatUser {
            id: String::new(),
            name: "unknown".to_string(),
        },
    };

    Some(ChatMessage {
        id: message.origin.ts.0.clone(),
        channel: channel.clone(),
        author,
        content: message.content.text.clone().unwrap_or_default(),
        created_at,
    })
}

// Socket mode listener callbacks for Slack.

/// Handles `/highlight` command events from Slack.
#[instrument(skip_all)]
async fn handle_command_event(
    event: SlackCommandEvent,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) -> Result<SlackCommandEventResponse, Box<dyn std::error::Error + Send + Sync>> {
    let db = {
        let states = states.read().await;
        let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;
        user_state.highlighter.db.clone()
    };

    let text = event.text.as_deref().unwrap_or_default();
    let reply = interaction::command::handle_command(text, &event.team_id.0, &event.user_id.0, &db).await;

    Ok(SlackCommandEventResponse::new(SlackMessageContent::new().with_text(reply)))
}

/// Handles push events from Slack.
#[instrument(skip_all)]
async fn handle_push_event(event_callback: SlackPushEventCallback, _client: Arc<SlackHyperClient>, states: SlackClientEventsUserState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let event = event_callback.event;
    let states = states.read().await;
    let user_state = states.get_user_state::<SlackUserState>().ok_or(anyhow::anyhow!("Failed to get user state"))?;

    match event {
        SlackEventCallbackBody::Message(slack_message_event) => {
            let Some(message) = message_from_event(&slack_message_event, &user_state.guild) else {
                debug!("Skipping message event that is not a plain user message.");
                return Ok(());
            };

            interaction::message::handle_message(message, user_state.highlighter.clone());
        }
        _ => {
            warn!("Received unhandled push event.")
        }
    }

    Ok(())
}

// Tests.

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_ts_to_datetime() {
        let expected = Utc.timestamp_opt(1_712_345_678, 123_456_000).unwrap();

        assert_eq!(ts_to_datetime("1712345678.123456"), Some(expected));
        assert_eq!(ts_to_datetime("1712345678.1"), Some(Utc.timestamp_opt(1_712_345_678, 100_000_000).unwrap()));
        assert_eq!(ts_to_datetime("1712345678"), Some(Utc.timestamp_opt(1_712_345_678, 0).unwrap()));
        assert_eq!(ts_to_datetime("not a ts"), None);
    }

    #[test]
    fn test_permalink() {
        assert_eq!(permalink("https://acme.slack.com/", "C1", "1712345678.000100"), "https://acme.slack.com/archives/C1/p1712345678000100");
        assert_eq!(permalink("https://acme.slack.com", "C1", "1712345678.000100"), "https://acme.slack.com/archives/C1/p1712345678000100");
    }

    #[test]
    fn test_merge_around_orders_and_dedups() {
        let channel = ChatChannel {
            id: "C1".to_string(),
            guild: None,
            category_id: None,
        };
        let at = |ts: &str| ChatMessage {
            id: ts.to_string(),
            channel: channel.clone(),
            author: mention("U1"),
            content: ts.to_string(),
            created_at: ts_to_datetime(ts).unwrap(),
        };

        let anchor = at("1712345678.000200");
        let fetched = vec![at("1712345678.000300"), at("1712345678.000100"), at("1712345678.000300"), at("1712345678.000101")];

        let ids = merge_around(fetched, &anchor).into_iter().map(|m| m.id).collect::<Vec<_>>();

        assert_eq!(ids, vec!["1712345678.000100", "1712345678.000101", "1712345678.000200", "1712345678.000300"]);
    }

    #[test]
    fn test_mention() {
        assert_eq!(mention("U1").name, "<@U1>");
    }
}
