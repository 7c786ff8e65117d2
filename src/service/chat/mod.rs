pub mod slack;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{ChatMessage, ChatUser, Res, Void};

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This trait defines the core functionality for interacting with chat platforms
/// like Slack. Implementing this trait allows different chat services to be used
/// with the highlight-bot.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Get the bot user ID.
    fn bot_user_id(&self) -> &str;

    /// Start the chat client listener.
    ///
    /// This sets up event listeners for the chat platform and begins processing
    /// incoming messages and events.
    async fn start(&self) -> Void;

    /// Whether a message is eligible to be scanned for highlights at all.
    ///
    /// This excludes the bot's own messages, other bots, and system messages.
    fn should_reply(&self, message: &ChatMessage) -> bool;

    /// Resolve a user by ID, from the local cache when possible.
    async fn get_user(&self, user_id: &str) -> Res<ChatUser>;

    /// Send a private message to a user.
    async fn send_direct_message(&self, user_id: &str, text: &str) -> Void;

    /// Get the messages surrounding `message` in its channel, in chronological order.
    ///
    /// At most `before` earlier and `after` later messages are returned, and the
    /// anchor message itself is always included.
    async fn get_history_around(&self, message: &ChatMessage, before: usize, after: usize) -> Res<Vec<ChatMessage>>;

    /// A direct link to a message.
    fn message_link(&self, message: &ChatMessage) -> String;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}
