//! Library root for `highlight-bot`.
//!
//! Highlight-bot watches the messages posted in a Slack workspace and privately
//! notifies users when someone mentions one of their registered highlight words
//! or phrases:
//! - Users who recently spoke (or are typing) in a channel are not interrupted
//! - Each user is notified at most once per message, never about their own messages
//! - Notifications wait briefly so they can include the replies that followed
//!
//! The bot integrates with Slack for chat and SurrealDB for storage. The
//! architecture is built around extensible traits that allow for different
//! implementations of each service.

pub mod base;
pub mod highlight;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::{info, warn};

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the highlight-bot runtime:
/// - Initializes the crypto provider
/// - Creates the runtime context with the trigger store and chat client
/// - Starts the main event loop for processing messages
pub async fn start(config: Config) -> Void {
    info!("Starting highlight-bot ...");

    // Start the crypto provider.
    if crypto::ring::default_provider().install_default().is_err() {
        warn!("A crypto provider was already installed.");
    }

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
