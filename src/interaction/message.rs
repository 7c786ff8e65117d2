//! Intake for "message created" events.

use tracing::{Instrument, debug, error, instrument};

use crate::{
    base::types::{ChatMessage, NotificationJob, Void},
    highlight::{Highlighter, activity::ActivityKey, matcher, notify},
};

/// Handles a newly posted message.
///
/// The author is marked present in the channel right away; matching and
/// notification happen on a spawned task so the event source is never blocked.
#[instrument(skip_all, fields(channel = %message.channel.id, message_id = %message.id))]
pub fn handle_message(message: ChatMessage, highlighter: Highlighter) {
    if message.channel.guild.is_none() || !highlighter.chat.should_reply(&message) {
        debug!("Skipping ineligible message.");
        return;
    }

    let key = ActivityKey::new(&message.channel.id, &message.author.id);
    highlighter.activity.lease(key, highlighter.config.last_spoken_cutoff());

    tokio::spawn(
        async move {
            // Process the message.
            let result = handle_message_internal(message, &highlighter).await;

            // Log any errors.
            if let Err(err) = &result {
                error!("Error while handling: {}", err);
            }
        }
        .in_current_span(),
    );
}

async fn handle_message_internal(message: ChatMessage, highlighter: &Highlighter) -> Void {
    let matches = matcher::find_triggers(highlighter, &message).await?;

    debug!("Message fired {} highlights.", matches.len());

    for result in matches {
        let job = NotificationJob {
            user: result.user,
            trigger: result.trigger,
            message: message.clone(),
            enqueued_at: highlighter.clock.now(),
        };

        notify::dispatch(highlighter.clone(), job);
    }

    Ok(())
}
