//! The notification-triggering engine.
//!
//! - [`activity`] tracks who is currently watching a channel.
//! - [`matcher`] resolves which users a message should notify.
//! - [`notify`] waits for context and delivers the private notification.

pub mod activity;
pub mod matcher;
pub mod notify;

use activity::ActivityTracker;

use crate::{
    base::{clock::ClockHandle, config::Config},
    service::{chat::ChatClient, db::DbClient},
};

/// Shared engine context.
///
/// This struct holds the configuration, trigger store, chat client, presence
/// tracker, and wall clock. It is designed to be trivially cloneable, allowing
/// it to be handed to spawned tasks without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Highlighter {
    /// The configuration for the application.
    pub config: Config,
    /// The trigger store.
    pub db: DbClient,
    /// The chat client.
    pub chat: ChatClient,
    /// Presence leases, shared by every clone.
    pub activity: ActivityTracker,
    /// The wall clock.
    pub clock: ClockHandle,
}

impl Highlighter {
    /// Create a new engine context using the system clock.
    pub fn new(config: Config, db: DbClient, chat: ChatClient) -> Self {
        Self {
            config,
            db,
            chat,
            activity: ActivityTracker::new(),
            clock: ClockHandle::system(),
        }
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: ClockHandle) -> Self {
        self.clock = clock;
        self
    }
}
